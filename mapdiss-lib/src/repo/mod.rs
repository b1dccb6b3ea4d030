//! Remote repository collaborator
//!
//! The cache core never talks to the network directly; it goes through
//! the [`Repository`] trait. The trait owns identifier resolution, so the
//! core does not care whether an identifier is itself a URL or needs a
//! lookup indirection — by the time a [`RemoteResourceInfo`] comes back,
//! redirects are resolved and the location is byte-fetchable.

mod http;

pub use http::*;

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use url::Url;

use crate::error::RepoError;
use crate::geodata::ResourceType;

/// Result of one remote metadata lookup.
///
/// Transient: fetched at most once per refresh cycle and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResourceInfo {
    /// Modification time reported by the repository.
    pub modified_at: DateTime<Utc>,
    /// Resource kind derived from the reported MIME type.
    pub kind: ResourceType,
    /// Canonical, redirect-resolved location of the binary.
    pub location: Url,
}

/// Access to the remote repository holding the geodata binaries.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Resolves an identifier to the resource's current state.
    ///
    /// # Errors
    ///
    /// Fails when the identifier cannot be resolved, the metadata
    /// endpoint answers with a non-success status, or the reported MIME
    /// type is neither raster nor vector. All of these abort the whole
    /// refresh.
    async fn lookup(&self, id: &str) -> Result<RemoteResourceInfo, RepoError>;

    /// Streams the binary at `location` to `dest`, returning the number
    /// of bytes written.
    ///
    /// Resources may be large; implementations must transfer in chunks
    /// rather than buffering the whole body.
    async fn download(&self, location: &Url, dest: &Path) -> Result<u64, RepoError>;
}
