//! Cached map entry and the refresh algorithm

use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use sha2::Digest;
use sha2::Sha256;
use tracing::debug;
use tracing::info;

use super::store::MapRecord;
use crate::config::MapdissConfig;
use crate::error::Error;
use crate::geodata::Introspector;
use crate::geodata::ResourceType;
use crate::mapfile;
use crate::mapfile::MapfileParams;
use crate::repo::RemoteResourceInfo;
use crate::repo::Repository;

/// Everything one refresh cycle needs, borrowed from the orchestrator.
///
/// `now` is injected so the staleness arithmetic is testable; remote
/// info fetched during the cycle lives in a local memo inside
/// [`MapEntry::refresh`], never on the entry itself.
pub(crate) struct RefreshContext<'a> {
    pub repo: &'a dyn Repository,
    pub introspector: &'a dyn Introspector,
    pub config: &'a MapdissConfig,
    pub now: DateTime<Utc>,
}

/// One cached resource: a raster or vector map fetched from the remote
/// repository, plus its generated mapfile.
///
/// The entry tracks two independent clocks: when the binary itself last
/// changed (`local_modified_at` vs. `remote_modified_at`) and when the
/// remote state was last consulted (`checked_at`). The mapfile is gated
/// on presence alone.
#[derive(Debug, Clone)]
pub struct MapEntry {
    /// Stable remote resource identifier.
    pub id: String,
    /// Resource kind, known after the first successful remote check.
    pub resource_type: Option<ResourceType>,
    /// Size of the locally cached binary, in bytes.
    pub size_bytes: u64,
    /// Last time a caller asked for this entry.
    pub requested_at: DateTime<Utc>,
    /// Last time the remote state was consulted. Epoch means never.
    pub checked_at: DateTime<Utc>,
    /// Modification time of the locally cached binary. Unset when the
    /// file is absent, which always counts as stale.
    pub local_modified_at: Option<DateTime<Utc>>,
    /// Modification time the remote reported as of the last check.
    pub remote_modified_at: Option<DateTime<Utc>>,
    local_path: PathBuf,
}

impl MapEntry {
    /// Creates a fresh entry for an identifier never seen before.
    pub fn new(id: impl Into<String>, cache_dir: &Path) -> Self {
        let id = id.into();
        let local_path = cache_dir.join(cache_file_name(&id));
        Self {
            id,
            resource_type: None,
            size_bytes: 0,
            requested_at: DateTime::UNIX_EPOCH,
            checked_at: DateTime::UNIX_EPOCH,
            local_modified_at: None,
            remote_modified_at: None,
            local_path,
        }
    }

    /// Reconstructs an entry from its persisted record.
    pub fn from_record(record: MapRecord, cache_dir: &Path) -> Self {
        let local_path = cache_dir.join(cache_file_name(&record.id));
        Self {
            id: record.id,
            resource_type: record.resource_type,
            size_bytes: record.size_bytes,
            requested_at: record.requested_at,
            checked_at: record.checked_at,
            local_modified_at: record.local_modified_at,
            remote_modified_at: record.remote_modified_at,
            local_path,
        }
    }

    /// Returns the persistable record for this entry.
    pub fn to_record(&self) -> MapRecord {
        MapRecord {
            id: self.id.clone(),
            resource_type: self.resource_type,
            size_bytes: self.size_bytes,
            requested_at: self.requested_at,
            checked_at: self.checked_at,
            local_modified_at: self.local_modified_at,
            remote_modified_at: self.remote_modified_at,
        }
    }

    /// Path of the cached binary in the cache directory.
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Path of the generated mapfile: the binary path with `.map`
    /// appended.
    pub fn mapfile_path(&self) -> PathBuf {
        let mut name = self.local_path.as_os_str().to_os_string();
        name.push(".map");
        PathBuf::from(name)
    }

    /// Returns a WMS/WFS safe layer name.
    ///
    /// Takes the last path segment of the identifier, converts spaces to
    /// underscores, and prefixes `map_` when the result does not start
    /// with a letter.
    pub fn layer_name(&self) -> String {
        let tail = self.id.rsplit('/').next().unwrap_or(&self.id);
        let name = tail.replace(' ', "_");
        if name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            name
        } else {
            format!("map_{name}")
        }
    }

    /// Returns the rendering-engine callback URL for this map.
    ///
    /// Ends with an `&` so the front door can append caller-supplied
    /// query parameters directly.
    pub fn callback_url(&self, base_url: &str) -> String {
        format!("{}?map={}&", base_url, self.mapfile_path().display())
    }

    /// Sets the last-requested marker. Called unconditionally after
    /// every successful resolve.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.requested_at = now;
    }

    /// Brings the local copy and its mapfile up to date.
    ///
    /// Two independent gates:
    ///
    /// 1. Remote staleness: when more than the keep-alive has passed
    ///    since the last check, or the local binary is missing, consult
    ///    the repository and re-copy the binary when the remote
    ///    modification time is strictly newer. A re-copy invalidates the
    ///    existing mapfile.
    /// 2. Mapfile presence: when the mapfile is absent, derive the
    ///    extent from the local binary and render it from the template.
    ///
    /// Returns whether anything changed on disk.
    pub(crate) async fn refresh(&mut self, ctx: &RefreshContext<'_>) -> Result<bool, Error> {
        let mut changed = false;
        let data_file = self.local_path.clone();
        let mapfile_path = self.mapfile_path();

        // At most one metadata lookup per cycle.
        let mut remote_info: Option<RemoteResourceInfo> = None;

        // The file on disk is authoritative: no file, no local mtime.
        let local_meta = tokio::fs::metadata(&data_file).await.ok();
        let local_exists = local_meta.is_some();
        match local_meta {
            Some(meta) => {
                if self.local_modified_at.is_none() {
                    if let Ok(mtime) = meta.modified() {
                        self.local_modified_at = Some(mtime.into());
                    }
                }
            }
            None => self.local_modified_at = None,
        }

        let elapsed = (ctx.now - self.checked_at).num_seconds();
        let keep_alive = ctx.config.keep_alive.as_secs() as i64;
        if elapsed > keep_alive || !local_exists {
            let info = ctx
                .repo
                .lookup(&self.id)
                .await
                .map_err(|e| Error::lookup(&self.id, e))?;
            debug!(id = %self.id, kind = %info.kind, modified = %info.modified_at, "remote state checked");

            let newer = match self.local_modified_at {
                Some(local) => info.modified_at > local,
                None => true,
            };
            if !local_exists || newer {
                info!(id = %self.id, from = %info.location, to = %data_file.display(), "fetching binary");
                match ctx.repo.download(&info.location, &data_file).await {
                    Ok(written) => self.size_bytes = written,
                    Err(e) => {
                        // A torn file must not satisfy the presence gate
                        // on the next request.
                        let _ = tokio::fs::remove_file(&data_file).await;
                        return Err(Error::transfer(&self.id, e));
                    }
                }
                self.local_modified_at = Some(info.modified_at);
                self.resource_type = Some(info.kind);
                changed = true;
                // The old mapfile embeds the old extent and type.
                if tokio::fs::metadata(&mapfile_path).await.is_ok() {
                    let _ = tokio::fs::remove_file(&mapfile_path).await;
                }
            }
            self.remote_modified_at = Some(info.modified_at);
            self.checked_at = ctx.now;
            remote_info = Some(info);
        }

        if tokio::fs::metadata(&mapfile_path).await.is_err() {
            let kind = match self.resource_type {
                Some(kind) => kind,
                // Only reachable when a stored row lost its type but the
                // binary survived; reuse the cycle's lookup if it ran.
                None => {
                    let info = match remote_info {
                        Some(info) => info,
                        None => ctx
                            .repo
                            .lookup(&self.id)
                            .await
                            .map_err(|e| Error::lookup(&self.id, e))?,
                    };
                    self.resource_type = Some(info.kind);
                    info.kind
                }
            };

            let extent = ctx.introspector.introspect(&data_file, kind).await;
            info!(id = %self.id, mapfile = %mapfile_path.display(), "generating mapfile");
            let params = MapfileParams {
                extent: &extent,
                name: &self.layer_name(),
                data_path: &data_file,
                callback_url: &self.callback_url(&ctx.config.base_url),
            };
            mapfile::generate(ctx.config.template_for(kind), &mapfile_path, &params)
                .await
                .map_err(|e| Error::mapfile(&self.id, e))?;
            changed = true;
        }

        Ok(changed)
    }
}

/// Cache file name for an identifier: lowercase hex SHA-256 digest.
fn cache_file_name(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let mut name = String::with_capacity(digest.len() * 2);
    for byte in digest {
        name.push_str(&format!("{byte:02x}"));
    }
    name
}
