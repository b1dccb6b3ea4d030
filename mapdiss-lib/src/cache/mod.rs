//! Cache orchestration
//!
//! `Cache::resolve` is the sole public entry point of the engine: it
//! loads or creates the entry for an identifier, refreshes it against
//! the staleness policy, updates the last-requested marker, and persists
//! the result.

mod entry;
mod store;

pub use entry::MapEntry;
pub use store::*;

pub(crate) use entry::RefreshContext;

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::config::MapdissConfig;
use crate::error::Error;
use crate::geodata::Introspector;
use crate::repo::Repository;

/// Result of one resolve call: the up-to-date entry plus whether the
/// call changed anything on disk.
#[derive(Debug)]
pub struct Resolution {
    /// The resolved, refreshed entry.
    pub entry: MapEntry,
    /// `true` when the binary was re-fetched or the mapfile regenerated.
    pub refreshed: bool,
}

/// The dissemination cache engine.
///
/// Holds the configuration and the three collaborators behind their
/// seams: the persistent index, the remote repository, and the geodata
/// introspector.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use mapdiss_lib::cache::{Cache, SqliteStore};
/// use mapdiss_lib::config::MapdissConfig;
/// use mapdiss_lib::geodata::GdalIntrospector;
/// use mapdiss_lib::repo::HttpRepository;
///
/// let config = MapdissConfig::new(
///     "/var/cache/mapdiss",
///     "templates/raster.map",
///     "templates/vector.map",
///     "https://maps.example.org/cgi-bin/mapserv",
/// );
/// let cache = Cache::new(
///     config,
///     Arc::new(SqliteStore::open("/var/cache/mapdiss/maps.db").await?),
///     Arc::new(HttpRepository::new()?),
///     Arc::new(GdalIntrospector::new()),
/// );
///
/// let resolution = cache.resolve("https://repo.example.org/resource/1").await?;
/// println!("{}", resolution.entry.callback_url(&cache.config().base_url));
/// ```
pub struct Cache {
    config: MapdissConfig,
    store: Arc<dyn MapStore>,
    repo: Arc<dyn Repository>,
    introspector: Arc<dyn Introspector>,
}

impl Cache {
    /// Creates the engine from its configuration and collaborators.
    pub fn new(
        config: MapdissConfig,
        store: Arc<dyn MapStore>,
        repo: Arc<dyn Repository>,
        introspector: Arc<dyn Introspector>,
    ) -> Self {
        Self {
            config,
            store,
            repo,
            introspector,
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &MapdissConfig {
        &self.config
    }

    /// Resolves an identifier to an up-to-date cached map.
    ///
    /// Loads the persisted entry (or creates one for an unseen
    /// identifier), refreshes it, stamps the last-requested marker, and
    /// persists the entry back before returning it.
    ///
    /// # Errors
    ///
    /// Fatal failures (unresolvable identifier, metadata or transfer
    /// errors, unusable store, mapfile write failure) propagate without
    /// persisting a half-updated entry. Introspection problems are not
    /// errors; they degrade to the whole-earth extent.
    pub async fn resolve(&self, id: &str) -> Result<Resolution, Error> {
        info!(id, "handling map request");

        let record = self
            .store
            .load(id)
            .await
            .map_err(|e| Error::store(id, e))?;
        let mut entry = match record {
            Some(record) => {
                info!(id, "map found in cache");
                MapEntry::from_record(record, &self.config.cache_dir)
            }
            None => {
                info!(id, "map not in cache");
                MapEntry::new(id, &self.config.cache_dir)
            }
        };

        let now = Utc::now();
        let ctx = RefreshContext {
            repo: self.repo.as_ref(),
            introspector: self.introspector.as_ref(),
            config: &self.config,
            now,
        };
        let refreshed = entry.refresh(&ctx).await?;
        entry.touch(now);

        self.store
            .save(&entry.to_record())
            .await
            .map_err(|e| Error::store(id, e))?;

        Ok(Resolution { entry, refreshed })
    }
}
