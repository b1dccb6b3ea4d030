//! Repository collaborator error types

/// Errors from the remote repository: metadata lookup and binary transfer.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The metadata endpoint answered with a non-success status.
    #[error("metadata request for '{url}' returned HTTP {status}")]
    Metadata {
        /// The metadata URL that was queried.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The repository reported a MIME type that maps to neither raster
    /// nor vector data.
    #[error("unsupported file format '{mime}'")]
    UnsupportedFormat {
        /// The MIME type as reported by the repository.
        mime: String,
    },

    /// The metadata payload could not be interpreted.
    #[error("metadata parse error: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },

    /// Network error during lookup or transfer.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Local I/O error while writing fetched bytes.
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Creates a metadata-status error.
    pub fn metadata(url: impl Into<String>, status: u16) -> Self {
        Self::Metadata {
            url: url.into(),
            status,
        }
    }

    /// Creates an unsupported-format error.
    pub fn unsupported_format(mime: impl Into<String>) -> Self {
        Self::UnsupportedFormat { mime: mime.into() }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}
