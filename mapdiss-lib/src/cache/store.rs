//! Persistent map index
//!
//! One row per resource identifier. The store only deals in record
//! shape and upsert-by-id access; it never touches the filesystem cache
//! itself.

use std::path::Path;

use async_sqlite::rusqlite;
use async_sqlite::Client;
use async_sqlite::ClientBuilder;
use async_sqlite::JournalMode;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;

use crate::error::StoreError;
use crate::geodata::ResourceType;

/// Persisted state of one cached map, keyed by its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRecord {
    /// Stable remote resource identifier (primary key).
    pub id: String,
    /// Resource kind as of the last successful refresh.
    pub resource_type: Option<ResourceType>,
    /// Size of the locally cached binary, in bytes.
    pub size_bytes: u64,
    /// Last time a caller asked for this entry.
    pub requested_at: DateTime<Utc>,
    /// Last time the remote state was consulted.
    pub checked_at: DateTime<Utc>,
    /// Modification time of the locally cached binary.
    pub local_modified_at: Option<DateTime<Utc>>,
    /// Modification time the remote reported as of the last check.
    pub remote_modified_at: Option<DateTime<Utc>>,
}

/// Durable id → record index.
///
/// Upsert semantics, last writer wins. Concurrent processes sharing the
/// same database may race on a save; both converge to the same terminal
/// state, so no optimistic concurrency is attempted.
#[async_trait]
pub trait MapStore: Send + Sync {
    /// Looks up a persisted record by id.
    ///
    /// A malformed stored row behaves like an absent one; only an
    /// unusable store is an error.
    async fn load(&self, id: &str) -> Result<Option<MapRecord>, StoreError>;

    /// Upserts the record by id.
    ///
    /// `requested_at` is stamped with the current time at save, whatever
    /// the record carries.
    async fn save(&self, record: &MapRecord) -> Result<(), StoreError>;
}

/// SQLite-backed map index.
///
/// Uses WAL journal mode so concurrent request-handling processes can
/// read while one writes. Schema creation is idempotent and happens at
/// open time.
pub struct SqliteStore {
    client: Client,
}

impl SqliteStore {
    /// Opens (and if needed creates) the index at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let client = ClientBuilder::new()
            .path(path)
            .journal_mode(JournalMode::Wal)
            .open()
            .await
            .map_err(StoreError::Sqlite)?;

        Self::init_schema(&client).await?;

        Ok(Self { client })
    }

    /// Opens an in-memory index. Useful for testing.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let client = ClientBuilder::new()
            .path(":memory:")
            .open()
            .await
            .map_err(StoreError::Sqlite)?;

        Self::init_schema(&client).await?;

        Ok(Self { client })
    }

    async fn init_schema(client: &Client) -> Result<(), StoreError> {
        client
            .conn(|conn| {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS maps(
                        id TEXT PRIMARY KEY,
                        type TEXT,
                        size INTEGER NOT NULL,
                        req_date INTEGER NOT NULL,
                        check_date INTEGER NOT NULL,
                        local_date INTEGER,
                        remote_date INTEGER
                    )",
                    [],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::Sqlite)
    }
}

/// Raw column values of one row, converted to a record outside the
/// connection closure.
type RawRow = (
    Option<String>,
    i64,
    i64,
    i64,
    Option<i64>,
    Option<i64>,
);

#[async_trait]
impl MapStore for SqliteStore {
    async fn load(&self, id: &str) -> Result<Option<MapRecord>, StoreError> {
        let key = id.to_string();
        let result = self
            .client
            .conn(move |conn| {
                conn.query_row(
                    "SELECT type, size, req_date, check_date, local_date, remote_date
                     FROM maps WHERE id = ?",
                    [key],
                    |row| {
                        Ok::<RawRow, rusqlite::Error>((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
            })
            .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(async_sqlite::Error::Rusqlite(rusqlite::Error::QueryReturnedNoRows)) => {
                return Ok(None);
            }
            // A row whose columns cannot be read is malformed, not fatal.
            Err(async_sqlite::Error::Rusqlite(
                rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::FromSqlConversionFailure(..),
            )) => {
                warn!(id, "malformed row in map index, treating as absent");
                return Ok(None);
            }
            Err(e) => return Err(StoreError::Sqlite(e)),
        };

        match record_from_raw(id, raw) {
            Some(record) => Ok(Some(record)),
            None => {
                warn!(id, "malformed row in map index, treating as absent");
                Ok(None)
            }
        }
    }

    async fn save(&self, record: &MapRecord) -> Result<(), StoreError> {
        let id = record.id.clone();
        let kind = record.resource_type.map(|t| t.as_str());
        let size = i64::try_from(record.size_bytes).unwrap_or(i64::MAX);
        let req_date = Utc::now().timestamp();
        let check_date = record.checked_at.timestamp();
        let local_date = record.local_modified_at.map(|t| t.timestamp());
        let remote_date = record.remote_modified_at.map(|t| t.timestamp());

        self.client
            .conn(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO maps
                        (id, type, size, req_date, check_date, local_date, remote_date)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    rusqlite::params![id, kind, size, req_date, check_date, local_date, remote_date],
                )
            })
            .await
            .map_err(StoreError::Sqlite)?;
        Ok(())
    }
}

/// Converts raw column values into a record; `None` means malformed.
fn record_from_raw(id: &str, raw: RawRow) -> Option<MapRecord> {
    let (kind, size, req_date, check_date, local_date, remote_date) = raw;

    let resource_type = match kind {
        Some(name) => Some(ResourceType::parse(&name)?),
        None => None,
    };
    let ts = |secs: i64| Utc.timestamp_opt(secs, 0).single();

    Some(MapRecord {
        id: id.to_string(),
        resource_type,
        size_bytes: u64::try_from(size).ok()?,
        requested_at: ts(req_date)?,
        checked_at: ts(check_date)?,
        local_modified_at: match local_date {
            Some(secs) => Some(ts(secs)?),
            None => None,
        },
        remote_modified_at: match remote_date {
            Some(secs) => Some(ts(secs)?),
            None => None,
        },
    })
}

/// In-memory map index backed by a concurrent hash map.
///
/// Data is lost when the process exits; used by tests and useful as a
/// cache-disabled stand-in.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: DashMap<String, MapRecord>,
}

impl InMemoryStore {
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MapStore for InMemoryStore {
    async fn load(&self, id: &str) -> Result<Option<MapRecord>, StoreError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn save(&self, record: &MapRecord) -> Result<(), StoreError> {
        let mut record = record.clone();
        record.requested_at = Utc::now();
        self.records.insert(record.id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record(id: &str) -> MapRecord {
        MapRecord {
            id: id.to_string(),
            resource_type: Some(ResourceType::Raster),
            size_bytes: 2048,
            requested_at: Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap(),
            checked_at: Utc.with_ymd_and_hms(2023, 4, 1, 12, 30, 0).unwrap(),
            local_modified_at: Some(Utc.with_ymd_and_hms(2023, 3, 20, 8, 0, 0).unwrap()),
            remote_modified_at: Some(Utc.with_ymd_and_hms(2023, 3, 20, 8, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        assert_eq!(store.load("https://example.org/none").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let record = sample_record("https://example.org/r1");
        store.save(&record).await.unwrap();

        let loaded = store.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.resource_type, record.resource_type);
        assert_eq!(loaded.size_bytes, record.size_bytes);
        assert_eq!(loaded.checked_at, record.checked_at);
        assert_eq!(loaded.local_modified_at, record.local_modified_at);
        assert_eq!(loaded.remote_modified_at, record.remote_modified_at);
    }

    #[tokio::test]
    async fn test_save_stamps_requested_at() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let record = sample_record("https://example.org/r1");
        let before = Utc::now();
        store.save(&record).await.unwrap();

        let loaded = store.load(&record.id).await.unwrap().unwrap();
        assert!(loaded.requested_at >= before - chrono::Duration::seconds(1));
        assert!(loaded.requested_at > record.requested_at);
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let mut record = sample_record("https://example.org/r1");
        store.save(&record).await.unwrap();

        record.size_bytes = 4096;
        record.resource_type = Some(ResourceType::Vector);
        store.save(&record).await.unwrap();

        let loaded = store.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.size_bytes, 4096);
        assert_eq!(loaded.resource_type, Some(ResourceType::Vector));
    }

    #[tokio::test]
    async fn test_malformed_row_behaves_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps.db");
        let store = SqliteStore::open(&path).await.unwrap();
        let record = sample_record("https://example.org/r1");
        store.save(&record).await.unwrap();

        // Corrupt the stored type through a second connection.
        let client = ClientBuilder::new().path(&path).open().await.unwrap();
        client
            .conn(|conn| {
                conn.execute("UPDATE maps SET type = 'spreadsheet'", [])
            })
            .await
            .unwrap();

        assert_eq!(store.load(&record.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps.db");

        let store = SqliteStore::open(&path).await.unwrap();
        store.save(&sample_record("https://example.org/r1")).await.unwrap();
        drop(store);

        // Re-opening must not clobber existing rows.
        let store = SqliteStore::open(&path).await.unwrap();
        assert!(store.load("https://example.org/r1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        store.save(&sample_record("a")).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.load("a").await.unwrap().is_some());
        assert!(store.load("b").await.unwrap().is_none());
    }
}
