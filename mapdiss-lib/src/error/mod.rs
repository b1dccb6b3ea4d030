//! Error types

mod mapfile;
mod repo;
mod store;

pub use mapfile::*;
pub use repo::*;
pub use store::*;

/// Top-level error for a `resolve` call.
///
/// Every fatal failure carries the resource identifier and the phase it
/// failed in, so a front end can produce a meaningful caller-facing
/// response. Introspection failures are deliberately absent here: they
/// degrade to the default extent instead of failing the call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote metadata lookup failed (unresolvable identifier, metadata
    /// endpoint error, or unsupported format).
    #[error("repository lookup failed for '{id}'")]
    Lookup {
        /// The resource identifier being resolved.
        id: String,
        #[source]
        source: RepoError,
    },

    /// Copying the remote binary to the local cache failed.
    #[error("binary transfer failed for '{id}'")]
    Transfer {
        /// The resource identifier being resolved.
        id: String,
        #[source]
        source: RepoError,
    },

    /// The backing store could not be read or written.
    #[error("cache store failure for '{id}'")]
    Store {
        /// The resource identifier being resolved.
        id: String,
        #[source]
        source: StoreError,
    },

    /// Rendering or writing the mapfile failed.
    #[error("mapfile generation failed for '{id}'")]
    Mapfile {
        /// The resource identifier being resolved.
        id: String,
        #[source]
        source: MapfileError,
    },
}

impl Error {
    /// Creates a lookup-phase error.
    pub fn lookup(id: impl Into<String>, source: RepoError) -> Self {
        Self::Lookup {
            id: id.into(),
            source,
        }
    }

    /// Creates a transfer-phase error.
    pub fn transfer(id: impl Into<String>, source: RepoError) -> Self {
        Self::Transfer {
            id: id.into(),
            source,
        }
    }

    /// Creates a store-phase error.
    pub fn store(id: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            id: id.into(),
            source,
        }
    }

    /// Creates a mapfile-phase error.
    pub fn mapfile(id: impl Into<String>, source: MapfileError) -> Self {
        Self::Mapfile {
            id: id.into(),
            source,
        }
    }

    /// Returns the identifier of the resource whose resolution failed.
    pub fn id(&self) -> &str {
        match self {
            Self::Lookup { id, .. }
            | Self::Transfer { id, .. }
            | Self::Store { id, .. }
            | Self::Mapfile { id, .. } => id,
        }
    }
}
