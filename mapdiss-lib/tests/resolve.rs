//! End-to-end resolve scenarios against a scripted repository.

use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use url::Url;

use mapdiss_lib::cache::Cache;
use mapdiss_lib::cache::MapStore;
use mapdiss_lib::cache::SqliteStore;
use mapdiss_lib::config::MapdissConfig;
use mapdiss_lib::error::Error;
use mapdiss_lib::error::RepoError;
use mapdiss_lib::geodata::GeodataExtent;
use mapdiss_lib::geodata::Introspector;
use mapdiss_lib::geodata::ResourceType;
use mapdiss_lib::repo::RemoteResourceInfo;
use mapdiss_lib::repo::Repository;

const TEMPLATE: &str =
    "NAME %NAME%\nEXTENT %X_MIN% %Y_MIN% %X_MAX% %Y_MAX%\nFILE %FILE%\nURL %URL%\n";

/// Scripted repository with mutable remote state.
struct ScriptedRepo {
    state: Mutex<RemoteState>,
    lookups: AtomicUsize,
    downloads: AtomicUsize,
    fail_lookup: bool,
}

struct RemoteState {
    modified_at: DateTime<Utc>,
    kind: ResourceType,
    payload: Vec<u8>,
}

impl ScriptedRepo {
    fn new(modified_at: DateTime<Utc>, kind: ResourceType, payload: &[u8]) -> Self {
        Self {
            state: Mutex::new(RemoteState {
                modified_at,
                kind,
                payload: payload.to_vec(),
            }),
            lookups: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            fail_lookup: false,
        }
    }

    fn set_remote(&self, modified_at: DateTime<Utc>, payload: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.modified_at = modified_at;
        state.payload = payload.to_vec();
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for ScriptedRepo {
    async fn lookup(&self, id: &str) -> Result<RemoteResourceInfo, RepoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookup {
            return Err(RepoError::metadata(format!("{id}/metadata"), 404));
        }
        let state = self.state.lock().unwrap();
        Ok(RemoteResourceInfo {
            modified_at: state.modified_at,
            kind: state.kind,
            location: Url::parse("https://repo.example.org/resource/r1").unwrap(),
        })
    }

    async fn download(&self, _location: &Url, dest: &Path) -> Result<u64, RepoError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let payload = self.state.lock().unwrap().payload.clone();
        tokio::fs::write(dest, &payload).await?;
        Ok(payload.len() as u64)
    }
}

struct FixedIntrospector;

#[async_trait]
impl Introspector for FixedIntrospector {
    async fn introspect(&self, _path: &Path, _kind: ResourceType) -> GeodataExtent {
        let mut extent = GeodataExtent::default();
        extent.set_bounds(16.187, 16.421, 48.123, 48.287);
        extent
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<SqliteStore>,
    repo: Arc<ScriptedRepo>,
    cache: Cache,
}

impl Harness {
    async fn new(repo: ScriptedRepo, always_check: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.map");
        tokio::fs::write(&template, TEMPLATE).await.unwrap();

        let mut config = MapdissConfig::new(
            dir.path(),
            &template,
            &template,
            "https://maps.example.org/mapserv",
        );
        if always_check {
            config = config.always_check();
        }

        let store = Arc::new(SqliteStore::open(dir.path().join("maps.db")).await.unwrap());
        let repo = Arc::new(repo);
        let cache = Cache::new(
            config,
            store.clone(),
            repo.clone(),
            Arc::new(FixedIntrospector),
        );
        Self {
            _dir: dir,
            store,
            repo,
            cache,
        }
    }
}

fn t1() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 3, 20, 8, 0, 0).unwrap()
}

#[tokio::test]
async fn test_scenario_a_unseen_identifier() {
    let harness = Harness::new(
        ScriptedRepo::new(t1(), ResourceType::Raster, b"tiff bytes"),
        false,
    )
    .await;

    let resolution = harness.cache.resolve("https://repo.example.org/id/r1").await.unwrap();

    assert!(resolution.refreshed);
    let entry = &resolution.entry;
    assert_eq!(entry.resource_type, Some(ResourceType::Raster));
    assert_eq!(entry.remote_modified_at, Some(t1()));
    assert_eq!(entry.size_bytes, 10);
    assert!(entry.local_path().exists());
    assert!(entry.mapfile_path().exists());

    let mapfile = tokio::fs::read_to_string(entry.mapfile_path()).await.unwrap();
    assert!(mapfile.contains("NAME r1"));
    assert!(mapfile.contains("EXTENT 16.187 48.123 16.421 48.287"));

    // The entry was persisted.
    let record = harness
        .store
        .load("https://repo.example.org/id/r1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.resource_type, Some(ResourceType::Raster));
}

#[tokio::test]
async fn test_scenario_b_fresh_entry_skips_remote() {
    let harness = Harness::new(
        ScriptedRepo::new(t1(), ResourceType::Raster, b"tiff bytes"),
        false,
    )
    .await;
    let id = "https://repo.example.org/id/r1";

    let first = harness.cache.resolve(id).await.unwrap();
    let second = harness.cache.resolve(id).await.unwrap();

    assert!(first.refreshed);
    assert!(!second.refreshed);
    // One remote check total: the second resolve stayed local.
    assert_eq!(harness.repo.lookups(), 1);
    assert_eq!(harness.repo.downloads(), 1);

    // Identical state except the last-requested marker.
    assert_eq!(second.entry.checked_at, first.entry.checked_at);
    assert_eq!(second.entry.local_modified_at, first.entry.local_modified_at);
    assert_eq!(second.entry.remote_modified_at, first.entry.remote_modified_at);
    assert_eq!(second.entry.size_bytes, first.entry.size_bytes);
    assert!(second.entry.requested_at >= first.entry.requested_at);
}

#[tokio::test]
async fn test_scenario_c_remote_update_refetches() {
    let harness = Harness::new(
        ScriptedRepo::new(t1(), ResourceType::Raster, b"tiff bytes"),
        true, // keep-alive 0: always check
    )
    .await;
    let id = "https://repo.example.org/id/r1";

    let first = harness.cache.resolve(id).await.unwrap();
    let old_mapfile = tokio::fs::read_to_string(first.entry.mapfile_path()).await.unwrap();

    let t2 = t1() + chrono::Duration::hours(2);
    harness.repo.set_remote(t2, b"updated tiff bytes");

    let second = harness.cache.resolve(id).await.unwrap();

    assert!(second.refreshed);
    assert_eq!(harness.repo.downloads(), 2);
    assert_eq!(second.entry.local_modified_at, Some(t2));
    assert_eq!(second.entry.size_bytes, 18);
    // Mapfile was deleted and regenerated.
    assert!(second.entry.mapfile_path().exists());
    let new_mapfile = tokio::fs::read_to_string(second.entry.mapfile_path()).await.unwrap();
    assert_eq!(new_mapfile, old_mapfile); // same template inputs
    let data = tokio::fs::read(second.entry.local_path()).await.unwrap();
    assert_eq!(data, b"updated tiff bytes");
}

#[tokio::test]
async fn test_unchanged_remote_updates_check_date_only() {
    let harness = Harness::new(
        ScriptedRepo::new(t1(), ResourceType::Vector, b"geojson bytes"),
        true,
    )
    .await;
    let id = "https://repo.example.org/id/v1";

    let first = harness.cache.resolve(id).await.unwrap();
    let second = harness.cache.resolve(id).await.unwrap();

    // Remote checked both times, but equal timestamps never refetch.
    assert_eq!(harness.repo.lookups(), 2);
    assert_eq!(harness.repo.downloads(), 1);
    assert!(!second.refreshed);
    assert!(second.entry.checked_at >= first.entry.checked_at);
}

#[tokio::test]
async fn test_lookup_failure_persists_nothing() {
    let mut repo = ScriptedRepo::new(t1(), ResourceType::Raster, b"tiff bytes");
    repo.fail_lookup = true;
    let harness = Harness::new(repo, false).await;
    let id = "https://repo.example.org/id/missing";

    let err = harness.cache.resolve(id).await.unwrap_err();

    assert!(matches!(err, Error::Lookup { .. }));
    assert_eq!(err.id(), id);
    // No half-updated entry was cached.
    assert!(harness.store.load(id).await.unwrap().is_none());
}
