//! Upstream payload decoding: loose per-entity wire types and their fallible
//! conversion into the strict records of `avisync-core`.

use avisync_core::{
    Aircraft, Airline, Airplane, Airport, City, Country, DecodeError, EntityKind, NaturalKey,
    ReferenceRecord, SyncError, Tax,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "avisync-adapters";

/// A scalar as upstream actually sends it: numbers and booleans frequently
/// arrive as strings, and some fields carry arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Loose {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Other(JsonValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub total: u64,
}

impl Pagination {
    /// Upstream holds more records than this page returned.
    pub fn is_truncated(&self) -> bool {
        self.total > self.offset.saturating_add(self.count)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    pagination: Option<JsonValue>,
    #[serde(default)]
    data: Option<Vec<JsonValue>>,
}

/// Pagination as sent; counters may arrive as strings or nulls.
#[derive(Debug, Deserialize)]
struct PaginationWire {
    offset: Option<Loose>,
    limit: Option<Loose>,
    count: Option<Loose>,
    total: Option<Loose>,
}

fn counter(value: Option<Loose>) -> Option<u64> {
    match value {
        None => Some(0),
        Some(Loose::Number(n)) => n.as_u64(),
        Some(Loose::Text(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}

/// Informational only: a malformed block is dropped rather than failing the batch.
fn lenient_pagination(value: JsonValue) -> Option<Pagination> {
    let wire: PaginationWire = serde_json::from_value(value).ok()?;
    Some(Pagination {
        offset: counter(wire.offset)?,
        limit: counter(wire.limit)?,
        count: counter(wire.count)?,
        total: counter(wire.total)?,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBatch<R> {
    pub records: Vec<R>,
    pub pagination: Option<Pagination>,
}

/// A strict record that can be produced from its upstream wire shape.
pub trait Decodable: ReferenceRecord {
    type Wire: DeserializeOwned;

    fn from_wire(wire: Self::Wire) -> Result<Self, DecodeError>;
}

/// Decode a `{ "data": [...] }` payload. Any bad record fails the whole batch.
pub fn decode_batch<R: Decodable>(bytes: &[u8]) -> Result<DecodedBatch<R>, SyncError> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| DecodeError::new(R::KIND, "<payload>", format!("invalid JSON envelope: {e}")))?;
    let Some(data) = envelope.data else {
        return Err(DecodeError::new(R::KIND, "data", "payload has no `data` array").into());
    };

    let mut records = Vec::with_capacity(data.len());
    for (index, item) in data.into_iter().enumerate() {
        let wire: R::Wire = serde_json::from_value(item).map_err(|e| {
            DecodeError::new(R::KIND, "<record>", format!("unexpected record shape: {e}")).at_index(index)
        })?;
        let record = R::from_wire(wire).map_err(|e| e.at_index(index))?;
        records.push(record);
    }

    Ok(DecodedBatch {
        records,
        pagination: envelope.pagination.and_then(lenient_pagination),
    })
}

/// Field conversions for one entity kind.
#[derive(Debug, Clone, Copy)]
struct Fields(EntityKind);

impl Fields {
    fn fail(&self, field: &str, message: String) -> DecodeError {
        DecodeError::new(self.0, field, message)
    }

    fn key(&self, field: &str, value: Option<Loose>) -> Result<NaturalKey, DecodeError> {
        match value {
            None => Err(self.fail(field, "natural key is missing".to_string())),
            some => self.int(field, some),
        }
    }

    fn int(&self, field: &str, value: Option<Loose>) -> Result<i64, DecodeError> {
        match value {
            None => Ok(0),
            Some(Loose::Number(n)) => n
                .as_i64()
                .ok_or_else(|| self.fail(field, format!("not an integer: {n}"))),
            Some(Loose::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| self.fail(field, format!("not an integer: {s:?}"))),
            Some(other) => Err(self.fail(field, format!("not an integer: {}", render(&other)))),
        }
    }

    fn float(&self, field: &str, value: Option<Loose>) -> Result<f64, DecodeError> {
        let parsed = match &value {
            None => return Ok(0.0),
            Some(Loose::Number(n)) => n.as_f64(),
            Some(Loose::Text(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        match parsed {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(self.fail(
                field,
                format!("not a number: {}", value.as_ref().map(render).unwrap_or_default()),
            )),
        }
    }

    fn date(&self, field: &str, value: Option<Loose>) -> Result<Option<NaiveDate>, DecodeError> {
        let raw = match value {
            None => return Ok(None),
            Some(Loose::Text(s)) => s,
            Some(other) => return Err(self.fail(field, format!("not a date: {}", render(&other)))),
        };
        let trimmed = raw.trim();
        if trimmed.starts_with("0000-00-00") {
            return Ok(None);
        }
        parse_date(trimmed)
            .map(Some)
            .ok_or_else(|| self.fail(field, format!("not a date: {raw:?}")))
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

fn render(value: &Loose) -> String {
    match value {
        Loose::Bool(b) => b.to_string(),
        Loose::Number(n) => n.to_string(),
        Loose::Text(s) => format!("{s:?}"),
        Loose::Other(v) => v.to_string(),
    }
}

fn text(value: Option<Loose>) -> String {
    match value {
        None => String::new(),
        Some(Loose::Text(s)) => s,
        Some(Loose::Number(n)) => n.to_string(),
        Some(Loose::Bool(b)) => b.to_string(),
        Some(Loose::Other(v)) => v.to_string(),
    }
}

#[derive(Debug, Deserialize)]
pub struct AirlineWire {
    fleet_average_age: Option<Loose>,
    airline_id: Option<Loose>,
    callsign: Option<Loose>,
    hub_code: Option<Loose>,
    iata_code: Option<Loose>,
    icao_code: Option<Loose>,
    country_iso2: Option<Loose>,
    date_founded: Option<Loose>,
    iata_prefix_accounting: Option<Loose>,
    airline_name: Option<Loose>,
    country_name: Option<Loose>,
    fleet_size: Option<Loose>,
    status: Option<Loose>,
    #[serde(rename = "type")]
    airline_type: Option<Loose>,
}

impl Decodable for Airline {
    type Wire = AirlineWire;

    fn from_wire(w: AirlineWire) -> Result<Self, DecodeError> {
        let f = Fields(Self::KIND);
        Ok(Airline {
            airline_id: f.key("airline_id", w.airline_id)?,
            fleet_average_age: f.float("fleet_average_age", w.fleet_average_age)?,
            callsign: text(w.callsign),
            hub_code: text(w.hub_code),
            iata_code: text(w.iata_code),
            icao_code: text(w.icao_code),
            country_iso2: text(w.country_iso2),
            date_founded: f.int("date_founded", w.date_founded)?,
            iata_prefix_accounting: text(w.iata_prefix_accounting),
            airline_name: text(w.airline_name),
            country_name: text(w.country_name),
            fleet_size: f.int("fleet_size", w.fleet_size)?,
            status: text(w.status),
            airline_type: text(w.airline_type),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AircraftWire {
    iata_code: Option<Loose>,
    aircraft_name: Option<Loose>,
    plane_type_id: Option<Loose>,
}

impl Decodable for Aircraft {
    type Wire = AircraftWire;

    fn from_wire(w: AircraftWire) -> Result<Self, DecodeError> {
        let f = Fields(Self::KIND);
        Ok(Aircraft {
            plane_type_id: f.key("plane_type_id", w.plane_type_id)?,
            iata_code: text(w.iata_code),
            aircraft_name: text(w.aircraft_name),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AirportWire {
    gmt: Option<Loose>,
    airport_id: Option<Loose>,
    iata_code: Option<Loose>,
    city_iata_code: Option<Loose>,
    icao_code: Option<Loose>,
    country_iso2: Option<Loose>,
    geoname_id: Option<Loose>,
    latitude: Option<Loose>,
    longitude: Option<Loose>,
    airport_name: Option<Loose>,
    country_name: Option<Loose>,
    phone_number: Option<Loose>,
    timezone: Option<Loose>,
}

impl Decodable for Airport {
    type Wire = AirportWire;

    fn from_wire(w: AirportWire) -> Result<Self, DecodeError> {
        let f = Fields(Self::KIND);
        Ok(Airport {
            airport_id: f.key("airport_id", w.airport_id)?,
            gmt: f.float("gmt", w.gmt)?,
            iata_code: text(w.iata_code),
            city_iata_code: text(w.city_iata_code),
            icao_code: text(w.icao_code),
            country_iso2: text(w.country_iso2),
            geoname_id: f.int("geoname_id", w.geoname_id)?,
            latitude: f.float("latitude", w.latitude)?,
            longitude: f.float("longitude", w.longitude)?,
            airport_name: text(w.airport_name),
            country_name: text(w.country_name),
            phone_number: text(w.phone_number),
            timezone: text(w.timezone),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CountryWire {
    country_name: Option<Loose>,
    country_iso2: Option<Loose>,
    country_iso3: Option<Loose>,
    country_iso_numeric: Option<Loose>,
    population: Option<Loose>,
    capital: Option<Loose>,
    continent: Option<Loose>,
    currency_name: Option<Loose>,
    currency_code: Option<Loose>,
    fips_code: Option<Loose>,
    phone_prefix: Option<Loose>,
}

impl Decodable for Country {
    type Wire = CountryWire;

    fn from_wire(w: CountryWire) -> Result<Self, DecodeError> {
        let f = Fields(Self::KIND);
        Ok(Country {
            country_iso_numeric: f.key("country_iso_numeric", w.country_iso_numeric)?,
            country_name: text(w.country_name),
            country_iso2: text(w.country_iso2),
            country_iso3: text(w.country_iso3),
            population: f.int("population", w.population)?,
            capital: text(w.capital),
            continent: text(w.continent),
            currency_name: text(w.currency_name),
            currency_code: text(w.currency_code),
            fips_code: text(w.fips_code),
            phone_prefix: text(w.phone_prefix),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CityWire {
    gmt: Option<Loose>,
    city_id: Option<Loose>,
    iata_code: Option<Loose>,
    country_iso2: Option<Loose>,
    geoname_id: Option<Loose>,
    latitude: Option<Loose>,
    longitude: Option<Loose>,
    city_name: Option<Loose>,
    timezone: Option<Loose>,
}

impl Decodable for City {
    type Wire = CityWire;

    fn from_wire(w: CityWire) -> Result<Self, DecodeError> {
        let f = Fields(Self::KIND);
        Ok(City {
            city_id: f.key("city_id", w.city_id)?,
            gmt: text(w.gmt),
            iata_code: text(w.iata_code),
            country_iso2: text(w.country_iso2),
            geoname_id: f.int("geoname_id", w.geoname_id)?,
            latitude: f.float("latitude", w.latitude)?,
            longitude: f.float("longitude", w.longitude)?,
            city_name: text(w.city_name),
            timezone: text(w.timezone),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TaxWire {
    tax_id: Option<Loose>,
    tax_name: Option<Loose>,
    iata_code: Option<Loose>,
}

impl Decodable for Tax {
    type Wire = TaxWire;

    fn from_wire(w: TaxWire) -> Result<Self, DecodeError> {
        let f = Fields(Self::KIND);
        Ok(Tax {
            tax_id: f.key("tax_id", w.tax_id)?,
            tax_name: text(w.tax_name),
            iata_code: text(w.iata_code),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AirplaneWire {
    iata_type: Option<Loose>,
    airplane_id: Option<Loose>,
    airline_iata_code: Option<Loose>,
    iata_code_long: Option<Loose>,
    iata_code_short: Option<Loose>,
    airline_icao_code: Option<Loose>,
    construction_number: Option<Loose>,
    delivery_date: Option<Loose>,
    engines_count: Option<Loose>,
    engines_type: Option<Loose>,
    first_flight_date: Option<Loose>,
    icao_code_hex: Option<Loose>,
    line_number: Option<Loose>,
    model_code: Option<Loose>,
    registration_number: Option<Loose>,
    test_registration_number: Option<Loose>,
    plane_age: Option<Loose>,
    plane_class: Option<Loose>,
    model_name: Option<Loose>,
    plane_owner: Option<Loose>,
    plane_series: Option<Loose>,
    plane_status: Option<Loose>,
    production_line: Option<Loose>,
    registration_date: Option<Loose>,
    rollout_date: Option<Loose>,
}

impl Decodable for Airplane {
    type Wire = AirplaneWire;

    fn from_wire(w: AirplaneWire) -> Result<Self, DecodeError> {
        let f = Fields(Self::KIND);
        Ok(Airplane {
            airplane_id: f.key("airplane_id", w.airplane_id)?,
            iata_type: text(w.iata_type),
            airline_iata_code: text(w.airline_iata_code),
            iata_code_long: text(w.iata_code_long),
            iata_code_short: text(w.iata_code_short),
            airline_icao_code: text(w.airline_icao_code),
            construction_number: text(w.construction_number),
            delivery_date: f.date("delivery_date", w.delivery_date)?,
            engines_count: f.int("engines_count", w.engines_count)?,
            engines_type: text(w.engines_type),
            first_flight_date: f.date("first_flight_date", w.first_flight_date)?,
            icao_code_hex: text(w.icao_code_hex),
            line_number: text(w.line_number),
            model_code: text(w.model_code),
            registration_number: text(w.registration_number),
            test_registration_number: text(w.test_registration_number),
            plane_age: f.int("plane_age", w.plane_age)?,
            plane_class: text(w.plane_class),
            model_name: text(w.model_name),
            plane_owner: text(w.plane_owner),
            plane_series: text(w.plane_series),
            plane_status: text(w.plane_status),
            production_line: text(w.production_line),
            registration_date: f.date("registration_date", w.registration_date)?,
            rollout_date: f.date("rollout_date", w.rollout_date)?,
        })
    }
}
