//! Upstream fetching, raw payload archiving and reference-table persistence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use avisync_core::{Column, ColumnType, ColumnValue, EntityKind, NaturalKey, SyncError};
use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "avisync-storage";

pub const DEFAULT_BASE_URL: &str = "http://api.aviationstack.com/v1/";
pub const DEFAULT_ACCESS_KEY_VAR: &str = "AVIATION_STACK_API_KEY";

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Write-once archive of raw upstream payloads.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn artifact_relative_path(
        &self,
        fetched_at: DateTime<Utc>,
        kind: EntityKind,
        content_hash: &str,
    ) -> PathBuf {
        let stamp = fetched_at.format("%Y%m%d_%H%M%S").to_string();
        PathBuf::from(stamp)
            .join(kind.as_str())
            .join(format!("{content_hash}.json"))
    }

    /// Store a fetched payload under a hash-addressed path using an atomic temp-file rename.
    pub async fn archive_payload(
        &self,
        fetched_at: DateTime<Utc>,
        kind: EntityKind,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = self.artifact_relative_path(fetched_at, kind, &content_hash);
        let absolute_path = self.root.join(&relative_path);
        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .with_context(|| format!("artifact path {} has no parent", absolute_path.display()))?;

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating artifact directory {}", parent.display()))?;

        let stored = |deduplicated| StoredArtifact {
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking artifact path {}", absolute_path.display()))?
        {
            return Ok(stored(true));
        }

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp artifact file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp artifact file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp artifact file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &absolute_path).await {
            Ok(()) => Ok(stored(false)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&temp_path).await;
                Ok(stored(true))
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming temp artifact {} -> {}",
                        temp_path.display(),
                        absolute_path.display()
                    )
                })
            }
        }
    }
}

/// Per-call upstream parameters.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub run_id: Uuid,
    pub limit: Option<u32>,
    pub params: BTreeMap<String, String>,
}

#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Raw response body for one page of `kind`.
    async fn fetch(&self, kind: EntityKind, request: &FetchRequest) -> Result<Vec<u8>, SyncError>;
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub access_key_var: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_concurrent_requests: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_key_var: DEFAULT_ACCESS_KEY_VAR.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: None,
            max_concurrent_requests: 4,
        }
    }
}

/// Resource URL for `kind` with the access key, limit and filters applied.
///
/// Filters are applied after `access_key` and `limit` and overwrite them on a
/// name clash. Query pairs are emitted in name order.
pub fn build_request_url(
    base_url: &str,
    kind: EntityKind,
    access_key: &str,
    request: &FetchRequest,
) -> Result<reqwest::Url, SyncError> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let mut url = reqwest::Url::parse(&base)
        .and_then(|b| b.join(kind.resource_path()))
        .map_err(|err| SyncError::upstream(kind, format!("invalid base url `{base_url}`: {err}")))?;

    let mut query = BTreeMap::new();
    query.insert("access_key".to_string(), access_key.to_string());
    if let Some(limit) = request.limit.filter(|l| *l > 0) {
        query.insert("limit".to_string(), limit.to_string());
    }
    for (key, value) in &request.params {
        query.insert(key.clone(), value.clone());
    }
    url.query_pairs_mut().clear().extend_pairs(query.iter());
    Ok(url)
}

/// Copy of `url` that is safe to log.
pub fn redacted_url(url: &reqwest::Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if k == "access_key" { "REDACTED".to_string() } else { v.into_owned() };
            (k.into_owned(), value)
        })
        .collect();
    if pairs.is_empty() {
        redacted.set_query(None);
    } else {
        redacted.query_pairs_mut().clear().extend_pairs(pairs);
    }
    redacted.to_string()
}

/// HTTP client for the aviationstack REST API.
#[derive(Debug)]
pub struct AviationStackClient {
    client: reqwest::Client,
    config: UpstreamConfig,
    limiter: Arc<Semaphore>,
}

impl AviationStackClient {
    pub fn new(config: UpstreamConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            config,
        })
    }

    fn access_key(&self) -> Result<String, SyncError> {
        match std::env::var(&self.config.access_key_var) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(SyncError::MissingCredential {
                variable: self.config.access_key_var.clone(),
            }),
        }
    }

    async fn send(&self, kind: EntityKind, url: reqwest::Url) -> Result<Vec<u8>, SyncError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| SyncError::upstream(kind, "request limiter closed"))?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| SyncError::upstream(kind, err.without_url().to_string()))?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            let mut message: String = body.trim().chars().take(200).collect();
            if message.is_empty() {
                message = status.canonical_reason().unwrap_or("error response").to_string();
            }
            return Err(SyncError::Upstream {
                entity: kind,
                status: Some(status.as_u16()),
                message,
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|err| SyncError::upstream(kind, err.without_url().to_string()))?;
        debug!(bytes = body.len(), "upstream payload received");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl UpstreamSource for AviationStackClient {
    async fn fetch(&self, kind: EntityKind, request: &FetchRequest) -> Result<Vec<u8>, SyncError> {
        let access_key = self.access_key()?;
        let url = build_request_url(&self.config.base_url, kind, &access_key, request)?;
        let span = info_span!(
            "upstream_fetch",
            run_id = %request.run_id,
            entity = %kind,
            url = %redacted_url(&url)
        );
        self.send(kind, url).instrument(span).await
    }
}

/// Reads pre-fetched payloads from a directory instead of the network.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    dir: PathBuf,
}

impl SnapshotSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(kind.snapshot_file())
    }
}

#[async_trait]
impl UpstreamSource for SnapshotSource {
    async fn fetch(&self, kind: EntityKind, _request: &FetchRequest) -> Result<Vec<u8>, SyncError> {
        let path = self.path_for(kind);
        fs::read(&path)
            .await
            .map_err(|err| SyncError::upstream(kind, format!("reading snapshot {}: {err}", path.display())))
    }
}

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn count_rows(&self, kind: EntityKind) -> Result<u64, SyncError>;

    /// Every natural key currently stored for `kind`.
    async fn existing_keys(&self, kind: EntityKind) -> Result<HashSet<NaturalKey>, SyncError>;

    /// Insert all rows in one statement, stamping each with `created_at`.
    async fn insert_rows(
        &self,
        kind: EntityKind,
        columns: &[Column],
        rows: Vec<Vec<ColumnValue>>,
        created_at: DateTime<Utc>,
    ) -> Result<u64, SyncError>;

    async fn close(&self);
}

#[derive(Debug, Clone)]
pub struct PgReferenceStore {
    pool: PgPool,
}

impl PgReferenceStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("applying reference table migrations")?;
        Ok(())
    }
}

/// One column's values across a batch, typed for a postgres array bind.
#[derive(Debug)]
enum ColumnArray {
    BigInt(Vec<i64>),
    Double(Vec<f64>),
    Text(Vec<String>),
    Date(Vec<Option<NaiveDate>>),
}

impl ColumnArray {
    fn with_capacity(ty: ColumnType, capacity: usize) -> Self {
        match ty {
            ColumnType::BigInt => ColumnArray::BigInt(Vec::with_capacity(capacity)),
            ColumnType::Double => ColumnArray::Double(Vec::with_capacity(capacity)),
            ColumnType::Text => ColumnArray::Text(Vec::with_capacity(capacity)),
            ColumnType::Date => ColumnArray::Date(Vec::with_capacity(capacity)),
        }
    }

    fn push(&mut self, value: ColumnValue) -> Result<(), String> {
        match (self, value) {
            (ColumnArray::BigInt(values), ColumnValue::BigInt(v)) => values.push(v),
            (ColumnArray::Double(values), ColumnValue::Double(v)) => values.push(v),
            (ColumnArray::Text(values), ColumnValue::Text(v)) => values.push(v),
            (ColumnArray::Date(values), ColumnValue::Date(v)) => values.push(v),
            (_, other) => return Err(format!("unexpected {:?} value", other.column_type())),
        }
        Ok(())
    }

    fn sql_cast(&self) -> &'static str {
        match self {
            ColumnArray::BigInt(_) => "::bigint[]",
            ColumnArray::Double(_) => "::float8[]",
            ColumnArray::Text(_) => "::text[]",
            ColumnArray::Date(_) => "::date[]",
        }
    }
}

/// Pivot row-major values into one typed array per column.
fn pivot_columns(columns: &[Column], rows: Vec<Vec<ColumnValue>>) -> Result<Vec<ColumnArray>, String> {
    let mut arrays: Vec<ColumnArray> = columns
        .iter()
        .map(|c| ColumnArray::with_capacity(c.ty, rows.len()))
        .collect();
    for (index, row) in rows.into_iter().enumerate() {
        if row.len() != columns.len() {
            return Err(format!(
                "row {index} has {} values, expected {}",
                row.len(),
                columns.len()
            ));
        }
        for ((array, column), value) in arrays.iter_mut().zip(columns).zip(row) {
            array
                .push(value)
                .map_err(|err| format!("row {index} column {}: {err}", column.name))?;
        }
    }
    Ok(arrays)
}

fn build_unnest_insert<'a>(
    kind: EntityKind,
    columns: &[Column],
    arrays: Vec<ColumnArray>,
    created_at: DateTime<Utc>,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO \"{}\" (", kind.table()));
    for column in columns {
        qb.push(format!("\"{}\", ", column.name));
    }
    qb.push("created_at) SELECT u.*, ");
    qb.push_bind(created_at);
    qb.push(" FROM UNNEST(");
    for (i, array) in arrays.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        let cast = array.sql_cast();
        match array {
            ColumnArray::BigInt(values) => qb.push_bind(values),
            ColumnArray::Double(values) => qb.push_bind(values),
            ColumnArray::Text(values) => qb.push_bind(values),
            ColumnArray::Date(values) => qb.push_bind(values),
        };
        qb.push(cast);
    }
    qb.push(") AS u");
    qb
}

#[async_trait]
impl ReferenceStore for PgReferenceStore {
    async fn count_rows(&self, kind: EntityKind) -> Result<u64, SyncError> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", kind.table());
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| SyncError::storage_read(kind, err))?;
        Ok(count.max(0) as u64)
    }

    async fn existing_keys(&self, kind: EntityKind) -> Result<HashSet<NaturalKey>, SyncError> {
        let sql = format!("SELECT \"{}\" FROM \"{}\"", kind.key_column(), kind.table());
        let keys: Vec<i64> = sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| SyncError::storage_read(kind, err))?;
        Ok(keys.into_iter().collect())
    }

    async fn insert_rows(
        &self,
        kind: EntityKind,
        columns: &[Column],
        rows: Vec<Vec<ColumnValue>>,
        created_at: DateTime<Utc>,
    ) -> Result<u64, SyncError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let arrays = pivot_columns(columns, rows).map_err(|err| SyncError::storage_write(kind, err))?;
        let mut qb = build_unnest_insert(kind, columns, arrays, created_at);
        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|err| SyncError::storage_write(kind, err))?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub values: Vec<ColumnValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryTable {
    rows: Vec<StoredRow>,
    keys: HashSet<NaturalKey>,
    write_calls: usize,
}

/// In-process store with the same all-or-nothing unique-key contract as postgres.
#[derive(Debug, Default)]
pub struct MemoryReferenceStore {
    tables: Mutex<HashMap<EntityKind, MemoryTable>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl MemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend rows with these keys already exist.
    pub async fn seed_keys(&self, kind: EntityKind, keys: impl IntoIterator<Item = NaturalKey>) {
        let mut tables = self.tables.lock().await;
        tables.entry(kind).or_default().keys.extend(keys);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn write_calls(&self, kind: EntityKind) -> usize {
        let tables = self.tables.lock().await;
        tables.get(&kind).map(|t| t.write_calls).unwrap_or(0)
    }

    pub async fn rows(&self, kind: EntityKind) -> Vec<StoredRow> {
        let tables = self.tables.lock().await;
        tables.get(&kind).map(|t| t.rows.clone()).unwrap_or_default()
    }

    pub async fn keys(&self, kind: EntityKind) -> HashSet<NaturalKey> {
        let tables = self.tables.lock().await;
        tables.get(&kind).map(|t| t.keys.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReferenceStore for MemoryReferenceStore {
    async fn count_rows(&self, kind: EntityKind) -> Result<u64, SyncError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::storage_read(kind, "simulated read failure"));
        }
        let tables = self.tables.lock().await;
        Ok(tables.get(&kind).map(|t| t.keys.len() as u64).unwrap_or(0))
    }

    async fn existing_keys(&self, kind: EntityKind) -> Result<HashSet<NaturalKey>, SyncError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::storage_read(kind, "simulated read failure"));
        }
        Ok(self.keys(kind).await)
    }

    async fn insert_rows(
        &self,
        kind: EntityKind,
        columns: &[Column],
        rows: Vec<Vec<ColumnValue>>,
        created_at: DateTime<Utc>,
    ) -> Result<u64, SyncError> {
        let mut tables = self.tables.lock().await;
        let table = tables.entry(kind).or_default();
        table.write_calls += 1;

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::storage_write(kind, "simulated write failure"));
        }

        let key_index = columns
            .iter()
            .position(|c| c.name == kind.key_column())
            .ok_or_else(|| {
                SyncError::storage_write(kind, format!("column list lacks {}", kind.key_column()))
            })?;

        let mut batch_keys = HashSet::with_capacity(rows.len());
        for row in &rows {
            if row.len() != columns.len() {
                return Err(SyncError::storage_write(
                    kind,
                    format!("row has {} values, expected {}", row.len(), columns.len()),
                ));
            }
            let key = match row.get(key_index) {
                Some(ColumnValue::BigInt(key)) => *key,
                other => {
                    return Err(SyncError::storage_write(
                        kind,
                        format!("key column holds {other:?}"),
                    ))
                }
            };
            if table.keys.contains(&key) || !batch_keys.insert(key) {
                return Err(SyncError::storage_write(
                    kind,
                    format!(
                        "duplicate key value violates unique constraint on {}.{} ({key})",
                        kind.table(),
                        kind.key_column()
                    ),
                ));
            }
        }

        let inserted = rows.len() as u64;
        table.keys.extend(batch_keys);
        table
            .rows
            .extend(rows.into_iter().map(|values| StoredRow { values, created_at }));
        Ok(inserted)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avisync_core::{columns_for, ReferenceRecord, Tax};
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn workspace_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
    }

    fn tax(id: i64) -> Vec<ColumnValue> {
        Tax {
            tax_id: id,
            tax_name: format!("tax {id}"),
            iata_code: "XX".into(),
        }
        .row()
    }

    /// Serve exactly one canned HTTP response and hand back the request line.
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.expect("read");
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.expect("write");
            socket.flush().await.expect("flush");
            let request = String::from_utf8_lossy(&buf).to_string();
            request.lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{addr}/v1"), handle)
    }

    fn client_for(base_url: String, key_var: &str) -> AviationStackClient {
        AviationStackClient::new(UpstreamConfig {
            base_url,
            access_key_var: key_var.to_string(),
            timeout: Duration::from_secs(5),
            user_agent: Some("avisync-test".into()),
            max_concurrent_requests: 2,
        })
        .expect("client")
    }

    #[test]
    fn artifact_hashing_is_stable() {
        let hash = ArtifactStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn archived_payloads_deduplicate_by_hash_path() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        let fetched_at = DateTime::parse_from_rfc3339("2026-02-24T12:00:00Z")
            .expect("ts")
            .with_timezone(&Utc);

        let first = store
            .archive_payload(fetched_at, EntityKind::City, br#"{"data":[]}"#)
            .await
            .expect("first store");
        let second = store
            .archive_payload(fetched_at, EntityKind::City, br#"{"data":[]}"#)
            .await
            .expect("second store");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.relative_path, second.relative_path);
        assert!(first.absolute_path.exists());
        assert_eq!(
            first.relative_path,
            PathBuf::from("20260224_120000")
                .join("city")
                .join(format!("{}.json", first.content_hash))
        );
    }

    #[test]
    fn request_url_carries_key_limit_and_filters() {
        let request = FetchRequest {
            limit: Some(100),
            params: BTreeMap::from([("country_iso2".to_string(), "US".to_string())]),
            ..Default::default()
        };
        let url = build_request_url("http://api.aviationstack.com/v1", EntityKind::City, "k3y", &request)
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://api.aviationstack.com/v1/cities?access_key=k3y&country_iso2=US&limit=100"
        );
        assert_eq!(
            redacted_url(&url),
            "http://api.aviationstack.com/v1/cities?access_key=REDACTED&country_iso2=US&limit=100"
        );
    }

    #[test]
    fn zero_limit_is_omitted_and_filters_overwrite() {
        let request = FetchRequest {
            limit: Some(0),
            params: BTreeMap::from([("access_key".to_string(), "override".to_string())]),
            ..Default::default()
        };
        let url = build_request_url(DEFAULT_BASE_URL, EntityKind::Aircraft, "k3y", &request).expect("url");
        assert_eq!(
            url.as_str(),
            "http://api.aviationstack.com/v1/aircraft_types?access_key=override"
        );
    }

    #[tokio::test]
    async fn missing_access_key_fails_before_any_request() {
        let client = client_for("http://127.0.0.1:9/v1".into(), "AVISYNC_TEST_KEY_NEVER_SET");
        let err = client
            .fetch(EntityKind::Country, &FetchRequest::default())
            .await
            .expect_err("missing key");
        assert!(matches!(
            err,
            SyncError::MissingCredential { ref variable } if variable == "AVISYNC_TEST_KEY_NEVER_SET"
        ));
    }

    #[tokio::test]
    async fn error_status_maps_to_upstream_error() {
        std::env::set_var("AVISYNC_TEST_KEY_503", "secret");
        let (base, server) = one_shot_server("503 Service Unavailable", "").await;
        let client = client_for(base, "AVISYNC_TEST_KEY_503");
        let err = client
            .fetch(EntityKind::City, &FetchRequest::default())
            .await
            .expect_err("503");
        match err {
            SyncError::Upstream { entity, status, .. } => {
                assert_eq!(entity, EntityKind::City);
                assert_eq!(status, Some(503));
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.expect("server");
    }

    #[tokio::test]
    async fn successful_fetch_returns_raw_body() {
        std::env::set_var("AVISYNC_TEST_KEY_200", "secret");
        let (base, server) = one_shot_server("200 OK", r#"{"data":[]}"#).await;
        let client = client_for(base, "AVISYNC_TEST_KEY_200");
        let request = FetchRequest {
            limit: Some(5),
            ..Default::default()
        };
        let body = client.fetch(EntityKind::Tax, &request).await.expect("fetch");
        assert_eq!(body, br#"{"data":[]}"#.to_vec());

        let request_line = server.await.expect("server");
        assert!(request_line.starts_with("GET /v1/taxes?"), "{request_line}");
        assert!(request_line.contains("access_key=secret"));
        assert!(request_line.contains("limit=5"));
    }

    #[tokio::test]
    async fn snapshot_source_reads_fixture_files() {
        let source = SnapshotSource::new(workspace_root().join("fixtures/snapshots"));
        let body = source
            .fetch(EntityKind::Country, &FetchRequest::default())
            .await
            .expect("snapshot");
        assert!(!body.is_empty());

        let empty = SnapshotSource::new(tempdir().expect("tempdir").path().to_path_buf());
        let err = empty
            .fetch(EntityKind::Country, &FetchRequest::default())
            .await
            .expect_err("missing snapshot");
        assert_eq!(err.kind_label(), "upstream");
    }

    #[tokio::test]
    async fn memory_store_rejects_whole_batch_on_duplicate_key() {
        let store = MemoryReferenceStore::new();
        let columns = columns_for(EntityKind::Tax);
        let now = Utc::now();

        let inserted = store
            .insert_rows(EntityKind::Tax, columns, vec![tax(1), tax(2)], now)
            .await
            .expect("insert");
        assert_eq!(inserted, 2);

        let err = store
            .insert_rows(EntityKind::Tax, columns, vec![tax(3), tax(2)], now)
            .await
            .expect_err("duplicate");
        assert_eq!(err.kind_label(), "storage_write");

        let err = store
            .insert_rows(EntityKind::Tax, columns, vec![tax(4), tax(4)], now)
            .await
            .expect_err("in-batch duplicate");
        assert_eq!(err.kind_label(), "storage_write");

        assert_eq!(store.keys(EntityKind::Tax).await, HashSet::from([1, 2]));
        assert_eq!(store.count_rows(EntityKind::Tax).await.expect("count"), 2);
        assert_eq!(store.write_calls(EntityKind::Tax).await, 3);
        assert!(store.rows(EntityKind::Tax).await.iter().all(|r| r.created_at == now));
    }

    #[tokio::test]
    async fn memory_store_read_failures_surface_as_storage_read() {
        let store = MemoryReferenceStore::new();
        store.seed_keys(EntityKind::City, [7, 8]).await;
        assert_eq!(
            store.existing_keys(EntityKind::City).await.expect("keys"),
            HashSet::from([7, 8])
        );
        store.set_fail_reads(true);
        let err = store.existing_keys(EntityKind::City).await.expect_err("read");
        assert_eq!(err.kind_label(), "storage_read");
        store.close().await;
        assert!(store.is_closed());
    }

    #[test]
    fn pivot_rejects_misaligned_rows() {
        let columns = columns_for(EntityKind::Tax);
        let arrays = pivot_columns(columns, vec![tax(1), tax(2)]).expect("pivot");
        assert_eq!(arrays.len(), columns.len());
        assert!(matches!(&arrays[0], ColumnArray::BigInt(keys) if keys == &vec![1, 2]));

        let short = vec![ColumnValue::BigInt(1)];
        assert!(pivot_columns(columns, vec![short]).is_err());
    }

    #[test]
    fn unnest_insert_is_a_single_statement() {
        let columns = columns_for(EntityKind::Tax);
        let arrays = pivot_columns(columns, vec![tax(1)]).expect("pivot");
        let qb = build_unnest_insert(EntityKind::Tax, columns, arrays, Utc::now());
        assert_eq!(
            qb.sql(),
            "INSERT INTO \"tax\" (\"tax_id\", \"tax_name\", \"iata_code\", created_at) \
             SELECT u.*, $1 FROM UNNEST($2::bigint[], $3::text[], $4::text[]) AS u"
        );
    }
}
