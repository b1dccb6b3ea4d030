//! Engine configuration

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::geodata::ResourceType;

/// Configuration for the dissemination cache engine.
///
/// Carries everything the orchestrator needs that the original service
/// kept as process-wide state: the cache directory, the staleness policy,
/// the mapfile templates, and the map-rendering engine's base URL. Built
/// once at startup and passed to [`Cache::new`](crate::cache::Cache::new).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use mapdiss_lib::config::MapdissConfig;
///
/// let config = MapdissConfig::new(
///     "/var/cache/mapdiss",
///     "templates/raster.map",
///     "templates/vector.map",
///     "https://maps.example.org/cgi-bin/mapserv",
/// )
/// .with_keep_alive(Duration::from_secs(7200));
/// ```
#[derive(Debug, Clone)]
pub struct MapdissConfig {
    /// Directory in which cached binaries and mapfiles are stored.
    pub cache_dir: PathBuf,

    /// Maximum age of a remote-state check before a fresh one is
    /// mandatory.
    ///
    /// Default: 1 hour
    pub keep_alive: Duration,

    /// Mapfile template for raster resources.
    pub raster_template: PathBuf,

    /// Mapfile template for vector resources.
    pub vector_template: PathBuf,

    /// Base URL of the map-rendering engine, used to build per-resource
    /// callback URLs.
    pub base_url: String,
}

impl MapdissConfig {
    /// Creates a config with the default keep-alive of one hour.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        raster_template: impl Into<PathBuf>,
        vector_template: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            keep_alive: Duration::from_secs(3600),
            raster_template: raster_template.into(),
            vector_template: vector_template.into(),
            base_url: base_url.into(),
        }
    }

    /// Sets the staleness keep-alive.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Creates a config that re-checks the remote state on every request
    /// (zero keep-alive).
    pub fn always_check(mut self) -> Self {
        self.keep_alive = Duration::ZERO;
        self
    }

    /// Returns the template path for the given resource type.
    pub fn template_for(&self, kind: ResourceType) -> &Path {
        match kind {
            ResourceType::Raster => &self.raster_template,
            ResourceType::Vector => &self.vector_template,
        }
    }
}
