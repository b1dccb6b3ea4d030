//! Mapfile generation error types

use std::path::PathBuf;

/// Errors while rendering or writing a mapfile.
#[derive(Debug, thiserror::Error)]
pub enum MapfileError {
    /// The template file for the resource type could not be read.
    #[error("cannot read mapfile template '{path}'")]
    Template {
        /// Path of the template that failed to load.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the rendered mapfile failed.
    #[error("cannot write mapfile '{path}'")]
    Write {
        /// Destination path of the mapfile.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
