//! Core domain model for aviation reference data: entity kinds, strict records,
//! column schemas, the sync error taxonomy and the delta calculation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "avisync-core";

/// Upstream-assigned identifier of a reference record.
pub type NaturalKey = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Airline,
    Aircraft,
    Airport,
    Country,
    City,
    Tax,
    Airplane,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Airline,
        EntityKind::Aircraft,
        EntityKind::Airport,
        EntityKind::Country,
        EntityKind::City,
        EntityKind::Tax,
        EntityKind::Airplane,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Airline => "airline",
            EntityKind::Aircraft => "aircraft",
            EntityKind::Airport => "airport",
            EntityKind::Country => "country",
            EntityKind::City => "city",
            EntityKind::Tax => "tax",
            EntityKind::Airplane => "airplane",
        }
    }

    /// Resource path appended to the upstream base URL.
    pub fn resource_path(self) -> &'static str {
        match self {
            EntityKind::Airline => "airlines",
            EntityKind::Aircraft => "aircraft_types",
            EntityKind::Airport => "airports",
            EntityKind::Country => "countries",
            EntityKind::City => "cities",
            EntityKind::Tax => "taxes",
            EntityKind::Airplane => "airplanes",
        }
    }

    pub fn table(self) -> &'static str {
        self.as_str()
    }

    pub fn key_column(self) -> &'static str {
        match self {
            EntityKind::Airline => "airline_id",
            EntityKind::Aircraft => "plane_type_id",
            EntityKind::Airport => "airport_id",
            EntityKind::Country => "country_iso_numeric",
            EntityKind::City => "city_id",
            EntityKind::Tax => "tax_id",
            EntityKind::Airplane => "airplane_id",
        }
    }

    /// File name of the pre-fetched payload used in offline mode.
    pub fn snapshot_file(self) -> &'static str {
        match self {
            EntityKind::Airline => "airline.json",
            EntityKind::Aircraft => "aircraft.json",
            EntityKind::Airport => "airports.json",
            EntityKind::Country => "countries.json",
            EntityKind::City => "cities.json",
            EntityKind::Tax => "tax.json",
            EntityKind::Airplane => "airplane.json",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle || kind.resource_path() == needle)
            .ok_or_else(|| format!("unknown entity type `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    Text,
    Date,
}

/// One persisted column of an entity table, excluding `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    BigInt(i64),
    Double(f64),
    Text(String),
    Date(Option<NaiveDate>),
}

impl ColumnValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValue::BigInt(_) => ColumnType::BigInt,
            ColumnValue::Double(_) => ColumnType::Double,
            ColumnValue::Text(_) => ColumnType::Text,
            ColumnValue::Date(_) => ColumnType::Date,
        }
    }
}

/// Schema descriptor shared by every strict reference record.
///
/// `row()` must yield one value per entry of `COLUMNS`, in the same order, and
/// the column named by `KIND.key_column()` must hold `natural_key()`.
pub trait ReferenceRecord: Clone + Send + Sync + 'static {
    const KIND: EntityKind;
    const COLUMNS: &'static [Column];

    fn natural_key(&self) -> NaturalKey;
    fn row(&self) -> Vec<ColumnValue>;
}

fn text(value: &str) -> ColumnValue {
    ColumnValue::Text(value.to_string())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Airline {
    pub fleet_average_age: f64,
    pub airline_id: NaturalKey,
    pub callsign: String,
    pub hub_code: String,
    pub iata_code: String,
    pub icao_code: String,
    pub country_iso2: String,
    pub date_founded: i64,
    pub iata_prefix_accounting: String,
    pub airline_name: String,
    pub country_name: String,
    pub fleet_size: i64,
    pub status: String,
    pub airline_type: String,
}

impl ReferenceRecord for Airline {
    const KIND: EntityKind = EntityKind::Airline;
    const COLUMNS: &'static [Column] = &[
        col("fleet_average_age", ColumnType::Double),
        col("airline_id", ColumnType::BigInt),
        col("callsign", ColumnType::Text),
        col("hub_code", ColumnType::Text),
        col("iata_code", ColumnType::Text),
        col("icao_code", ColumnType::Text),
        col("country_iso2", ColumnType::Text),
        col("date_founded", ColumnType::BigInt),
        col("iata_prefix_accounting", ColumnType::Text),
        col("airline_name", ColumnType::Text),
        col("country_name", ColumnType::Text),
        col("fleet_size", ColumnType::BigInt),
        col("status", ColumnType::Text),
        col("type", ColumnType::Text),
    ];

    fn natural_key(&self) -> NaturalKey {
        self.airline_id
    }

    fn row(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Double(self.fleet_average_age),
            ColumnValue::BigInt(self.airline_id),
            text(&self.callsign),
            text(&self.hub_code),
            text(&self.iata_code),
            text(&self.icao_code),
            text(&self.country_iso2),
            ColumnValue::BigInt(self.date_founded),
            text(&self.iata_prefix_accounting),
            text(&self.airline_name),
            text(&self.country_name),
            ColumnValue::BigInt(self.fleet_size),
            text(&self.status),
            text(&self.airline_type),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Aircraft {
    pub iata_code: String,
    pub aircraft_name: String,
    pub plane_type_id: NaturalKey,
}

impl ReferenceRecord for Aircraft {
    const KIND: EntityKind = EntityKind::Aircraft;
    const COLUMNS: &'static [Column] = &[
        col("iata_code", ColumnType::Text),
        col("aircraft_name", ColumnType::Text),
        col("plane_type_id", ColumnType::BigInt),
    ];

    fn natural_key(&self) -> NaturalKey {
        self.plane_type_id
    }

    fn row(&self) -> Vec<ColumnValue> {
        vec![
            text(&self.iata_code),
            text(&self.aircraft_name),
            ColumnValue::BigInt(self.plane_type_id),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Airport {
    pub gmt: f64,
    pub airport_id: NaturalKey,
    pub iata_code: String,
    pub city_iata_code: String,
    pub icao_code: String,
    pub country_iso2: String,
    pub geoname_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub airport_name: String,
    pub country_name: String,
    pub phone_number: String,
    pub timezone: String,
}

impl ReferenceRecord for Airport {
    const KIND: EntityKind = EntityKind::Airport;
    const COLUMNS: &'static [Column] = &[
        col("gmt", ColumnType::Double),
        col("airport_id", ColumnType::BigInt),
        col("iata_code", ColumnType::Text),
        col("city_iata_code", ColumnType::Text),
        col("icao_code", ColumnType::Text),
        col("country_iso2", ColumnType::Text),
        col("geoname_id", ColumnType::BigInt),
        col("latitude", ColumnType::Double),
        col("longitude", ColumnType::Double),
        col("airport_name", ColumnType::Text),
        col("country_name", ColumnType::Text),
        col("phone_number", ColumnType::Text),
        col("timezone", ColumnType::Text),
    ];

    fn natural_key(&self) -> NaturalKey {
        self.airport_id
    }

    fn row(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Double(self.gmt),
            ColumnValue::BigInt(self.airport_id),
            text(&self.iata_code),
            text(&self.city_iata_code),
            text(&self.icao_code),
            text(&self.country_iso2),
            ColumnValue::BigInt(self.geoname_id),
            ColumnValue::Double(self.latitude),
            ColumnValue::Double(self.longitude),
            text(&self.airport_name),
            text(&self.country_name),
            text(&self.phone_number),
            text(&self.timezone),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Country {
    pub country_name: String,
    pub country_iso2: String,
    pub country_iso3: String,
    pub country_iso_numeric: NaturalKey,
    pub population: i64,
    pub capital: String,
    pub continent: String,
    pub currency_name: String,
    pub currency_code: String,
    pub fips_code: String,
    pub phone_prefix: String,
}

impl ReferenceRecord for Country {
    const KIND: EntityKind = EntityKind::Country;
    const COLUMNS: &'static [Column] = &[
        col("country_name", ColumnType::Text),
        col("country_iso2", ColumnType::Text),
        col("country_iso3", ColumnType::Text),
        col("country_iso_numeric", ColumnType::BigInt),
        col("population", ColumnType::BigInt),
        col("capital", ColumnType::Text),
        col("continent", ColumnType::Text),
        col("currency_name", ColumnType::Text),
        col("currency_code", ColumnType::Text),
        col("fips_code", ColumnType::Text),
        col("phone_prefix", ColumnType::Text),
    ];

    fn natural_key(&self) -> NaturalKey {
        self.country_iso_numeric
    }

    fn row(&self) -> Vec<ColumnValue> {
        vec![
            text(&self.country_name),
            text(&self.country_iso2),
            text(&self.country_iso3),
            ColumnValue::BigInt(self.country_iso_numeric),
            ColumnValue::BigInt(self.population),
            text(&self.capital),
            text(&self.continent),
            text(&self.currency_name),
            text(&self.currency_code),
            text(&self.fips_code),
            text(&self.phone_prefix),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct City {
    pub gmt: String,
    pub city_id: NaturalKey,
    pub iata_code: String,
    pub country_iso2: String,
    pub geoname_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub city_name: String,
    pub timezone: String,
}

impl ReferenceRecord for City {
    const KIND: EntityKind = EntityKind::City;
    const COLUMNS: &'static [Column] = &[
        col("gmt", ColumnType::Text),
        col("city_id", ColumnType::BigInt),
        col("iata_code", ColumnType::Text),
        col("country_iso2", ColumnType::Text),
        col("geoname_id", ColumnType::BigInt),
        col("latitude", ColumnType::Double),
        col("longitude", ColumnType::Double),
        col("city_name", ColumnType::Text),
        col("timezone", ColumnType::Text),
    ];

    fn natural_key(&self) -> NaturalKey {
        self.city_id
    }

    fn row(&self) -> Vec<ColumnValue> {
        vec![
            text(&self.gmt),
            ColumnValue::BigInt(self.city_id),
            text(&self.iata_code),
            text(&self.country_iso2),
            ColumnValue::BigInt(self.geoname_id),
            ColumnValue::Double(self.latitude),
            ColumnValue::Double(self.longitude),
            text(&self.city_name),
            text(&self.timezone),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tax {
    pub tax_id: NaturalKey,
    pub tax_name: String,
    pub iata_code: String,
}

impl ReferenceRecord for Tax {
    const KIND: EntityKind = EntityKind::Tax;
    const COLUMNS: &'static [Column] = &[
        col("tax_id", ColumnType::BigInt),
        col("tax_name", ColumnType::Text),
        col("iata_code", ColumnType::Text),
    ];

    fn natural_key(&self) -> NaturalKey {
        self.tax_id
    }

    fn row(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::BigInt(self.tax_id),
            text(&self.tax_name),
            text(&self.iata_code),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Airplane {
    pub iata_type: String,
    pub airplane_id: NaturalKey,
    pub airline_iata_code: String,
    pub iata_code_long: String,
    pub iata_code_short: String,
    pub airline_icao_code: String,
    pub construction_number: String,
    pub delivery_date: Option<NaiveDate>,
    pub engines_count: i64,
    pub engines_type: String,
    pub first_flight_date: Option<NaiveDate>,
    pub icao_code_hex: String,
    pub line_number: String,
    pub model_code: String,
    pub registration_number: String,
    pub test_registration_number: String,
    pub plane_age: i64,
    pub plane_class: String,
    pub model_name: String,
    pub plane_owner: String,
    pub plane_series: String,
    pub plane_status: String,
    pub production_line: String,
    pub registration_date: Option<NaiveDate>,
    pub rollout_date: Option<NaiveDate>,
}

impl ReferenceRecord for Airplane {
    const KIND: EntityKind = EntityKind::Airplane;
    const COLUMNS: &'static [Column] = &[
        col("iata_type", ColumnType::Text),
        col("airplane_id", ColumnType::BigInt),
        col("airline_iata_code", ColumnType::Text),
        col("iata_code_long", ColumnType::Text),
        col("iata_code_short", ColumnType::Text),
        col("airline_icao_code", ColumnType::Text),
        col("construction_number", ColumnType::Text),
        col("delivery_date", ColumnType::Date),
        col("engines_count", ColumnType::BigInt),
        col("engines_type", ColumnType::Text),
        col("first_flight_date", ColumnType::Date),
        col("icao_code_hex", ColumnType::Text),
        col("line_number", ColumnType::Text),
        col("model_code", ColumnType::Text),
        col("registration_number", ColumnType::Text),
        col("test_registration_number", ColumnType::Text),
        col("plane_age", ColumnType::BigInt),
        col("plane_class", ColumnType::Text),
        col("model_name", ColumnType::Text),
        col("plane_owner", ColumnType::Text),
        col("plane_series", ColumnType::Text),
        col("plane_status", ColumnType::Text),
        col("production_line", ColumnType::Text),
        col("registration_date", ColumnType::Date),
        col("rollout_date", ColumnType::Date),
    ];

    fn natural_key(&self) -> NaturalKey {
        self.airplane_id
    }

    fn row(&self) -> Vec<ColumnValue> {
        vec![
            text(&self.iata_type),
            ColumnValue::BigInt(self.airplane_id),
            text(&self.airline_iata_code),
            text(&self.iata_code_long),
            text(&self.iata_code_short),
            text(&self.airline_icao_code),
            text(&self.construction_number),
            ColumnValue::Date(self.delivery_date),
            ColumnValue::BigInt(self.engines_count),
            text(&self.engines_type),
            ColumnValue::Date(self.first_flight_date),
            text(&self.icao_code_hex),
            text(&self.line_number),
            text(&self.model_code),
            text(&self.registration_number),
            text(&self.test_registration_number),
            ColumnValue::BigInt(self.plane_age),
            text(&self.plane_class),
            text(&self.model_name),
            text(&self.plane_owner),
            text(&self.plane_series),
            text(&self.plane_status),
            text(&self.production_line),
            ColumnValue::Date(self.registration_date),
            ColumnValue::Date(self.rollout_date),
        ]
    }
}

/// Column metadata for a kind, for code that only holds the tag.
pub fn columns_for(kind: EntityKind) -> &'static [Column] {
    match kind {
        EntityKind::Airline => Airline::COLUMNS,
        EntityKind::Aircraft => Aircraft::COLUMNS,
        EntityKind::Airport => Airport::COLUMNS,
        EntityKind::Country => Country::COLUMNS,
        EntityKind::City => City::COLUMNS,
        EntityKind::Tax => Tax::COLUMNS,
        EntityKind::Airplane => Airplane::COLUMNS,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode {entity} field `{field}`{}: {message}", index_suffix(.index))]
pub struct DecodeError {
    pub entity: EntityKind,
    pub field: String,
    pub index: Option<usize>,
    pub message: String,
}

fn index_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" (record {i})")).unwrap_or_default()
}

impl DecodeError {
    pub fn new(entity: EntityKind, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity,
            field: field.into(),
            index: None,
            message: message.into(),
        }
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can end a sync pass early.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("missing upstream access key (environment variable {variable} is unset or empty)")]
    MissingCredential { variable: String },
    #[error("upstream request for {entity} failed{}: {message}", status_suffix(.status))]
    Upstream {
        entity: EntityKind,
        status: Option<u16>,
        message: String,
    },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("reading existing {entity} keys failed: {source}")]
    StorageRead {
        entity: EntityKind,
        #[source]
        source: BoxError,
    },
    #[error("bulk insert into {entity} failed: {source}")]
    StorageWrite {
        entity: EntityKind,
        #[source]
        source: BoxError,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with http status {s}")).unwrap_or_default()
}

impl SyncError {
    pub fn upstream(entity: EntityKind, message: impl Into<String>) -> Self {
        SyncError::Upstream {
            entity,
            status: None,
            message: message.into(),
        }
    }

    pub fn storage_read(entity: EntityKind, source: impl Into<BoxError>) -> Self {
        SyncError::StorageRead {
            entity,
            source: source.into(),
        }
    }

    pub fn storage_write(entity: EntityKind, source: impl Into<BoxError>) -> Self {
        SyncError::StorageWrite {
            entity,
            source: source.into(),
        }
    }

    /// Stable label used as the `error_kind` log field.
    pub fn kind_label(&self) -> &'static str {
        match self {
            SyncError::MissingCredential { .. } => "missing_credential",
            SyncError::Upstream { .. } => "upstream",
            SyncError::Decode(_) => "decode",
            SyncError::StorageRead { .. } => "storage_read",
            SyncError::StorageWrite { .. } => "storage_write",
        }
    }
}

/// Records from `fetched` whose natural key is absent from `existing`, in fetch order.
///
/// Keys repeated inside `fetched` are not collapsed; see [`duplicate_keys`].
pub fn compute_new<R: ReferenceRecord>(fetched: Vec<R>, existing: &HashSet<NaturalKey>) -> Vec<R> {
    fetched
        .into_iter()
        .filter(|record| !existing.contains(&record.natural_key()))
        .collect()
}

/// Keys that occur more than once in a batch, in order of first repetition.
pub fn duplicate_keys<R: ReferenceRecord>(records: &[R]) -> Vec<NaturalKey> {
    let mut seen: HashMap<NaturalKey, usize> = HashMap::with_capacity(records.len());
    let mut dups = Vec::new();
    for record in records {
        let count = seen.entry(record.natural_key()).or_default();
        *count += 1;
        if *count == 2 {
            dups.push(record.natural_key());
        }
    }
    dups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn country(key: i64, name: &str) -> Country {
        Country {
            country_name: name.to_string(),
            country_iso_numeric: key,
            ..Default::default()
        }
    }

    fn keys(records: &[Country]) -> Vec<i64> {
        records.iter().map(|c| c.natural_key()).collect()
    }

    #[test]
    fn delta_keeps_only_unknown_keys_in_fetch_order() {
        let fetched = vec![
            country(30, "Gamma"),
            country(10, "Alpha"),
            country(40, "Delta"),
            country(20, "Beta"),
        ];
        let existing = HashSet::from([10, 40, 99]);
        let fresh = compute_new(fetched, &existing);
        assert_eq!(keys(&fresh), vec![30, 20]);
        assert_eq!(fresh[0].country_name, "Gamma");
    }

    #[test]
    fn delta_against_empty_index_returns_everything() {
        let fetched = vec![country(10, "A"), country(20, "B"), country(30, "C")];
        let fresh = compute_new(fetched.clone(), &HashSet::new());
        assert_eq!(fresh, fetched);
    }

    #[test]
    fn delta_is_empty_when_everything_is_known() {
        let fetched = vec![country(10, "A"), country(20, "B")];
        let existing = HashSet::from([10, 20]);
        assert!(compute_new(fetched, &existing).is_empty());
    }

    #[test]
    fn delta_passes_repeated_keys_through() {
        let fetched = vec![country(20, "B"), country(20, "B again"), country(10, "A")];
        let existing = HashSet::from([10]);
        let fresh = compute_new(fetched, &existing);
        assert_eq!(keys(&fresh), vec![20, 20]);
        assert_eq!(duplicate_keys(&fresh), vec![20]);
    }

    #[test]
    fn duplicate_keys_reports_each_repeated_key_once() {
        let batch = vec![
            country(1, "a"),
            country(2, "b"),
            country(1, "a"),
            country(1, "a"),
            country(2, "b"),
            country(3, "c"),
        ];
        assert_eq!(duplicate_keys(&batch), vec![1, 2]);
    }

    #[test]
    fn rows_line_up_with_column_schemas() {
        fn check<R: ReferenceRecord + Default>() {
            let row = R::default().row();
            assert_eq!(row.len(), R::COLUMNS.len(), "{} row width", R::KIND);
            for (value, column) in row.iter().zip(R::COLUMNS) {
                assert_eq!(value.column_type(), column.ty, "{}.{}", R::KIND, column.name);
            }
            assert!(
                R::COLUMNS.iter().any(|c| c.name == R::KIND.key_column()),
                "{} schema lacks its key column",
                R::KIND
            );
            assert_eq!(columns_for(R::KIND), R::COLUMNS);
        }
        check::<Airline>();
        check::<Aircraft>();
        check::<Airport>();
        check::<Country>();
        check::<City>();
        check::<Tax>();
        check::<Airplane>();
    }

    #[test]
    fn key_column_holds_the_natural_key() {
        let tax = Tax {
            tax_id: 77,
            tax_name: "Airport Tax".into(),
            iata_code: "AY".into(),
        };
        let idx = Tax::COLUMNS
            .iter()
            .position(|c| c.name == EntityKind::Tax.key_column())
            .unwrap();
        assert_eq!(tax.row()[idx], ColumnValue::BigInt(77));
    }

    #[test]
    fn entity_kind_parses_names_and_resource_paths() {
        assert_eq!("city".parse::<EntityKind>().unwrap(), EntityKind::City);
        assert_eq!("Aircraft_Types".parse::<EntityKind>().unwrap(), EntityKind::Aircraft);
        assert_eq!(" taxes ".parse::<EntityKind>().unwrap(), EntityKind::Tax);
        assert!("flights".parse::<EntityKind>().is_err());
        for kind in EntityKind::ALL {
            assert_eq!(kind.to_string().parse::<EntityKind>().unwrap(), kind);
        }
    }

    #[test]
    fn errors_carry_entity_context() {
        let err = SyncError::from(
            DecodeError::new(EntityKind::Country, "population", "not a number: \"lots\"").at_index(2),
        );
        assert_eq!(err.kind_label(), "decode");
        assert_eq!(
            err.to_string(),
            "failed to decode country field `population` (record 2): not a number: \"lots\""
        );

        let upstream = SyncError::Upstream {
            entity: EntityKind::City,
            status: Some(503),
            message: "service unavailable".into(),
        };
        assert_eq!(
            upstream.to_string(),
            "upstream request for city failed with http status 503: service unavailable"
        );
    }
}
