//! Mapfile generation
//!
//! A mapfile is the text document the map-rendering engine reads to serve
//! one resource. It is produced from a per-type template by literal token
//! substitution; the rest of the template is passed through untouched.

use std::path::Path;

use crate::error::MapfileError;
use crate::geodata::GeodataExtent;

/// Values substituted into a mapfile template.
#[derive(Debug)]
pub struct MapfileParams<'a> {
    /// Spatial extent and identifier column of the resource.
    pub extent: &'a GeodataExtent,
    /// Sanitized layer name.
    pub name: &'a str,
    /// Path of the locally cached binary.
    pub data_path: &'a Path,
    /// Rendering-engine callback URL for this resource.
    pub callback_url: &'a str,
}

/// Substitutes the `%TOKEN%` placeholders into a template.
pub fn render(template: &str, params: &MapfileParams<'_>) -> String {
    template
        .replace("%X_MIN%", &params.extent.xmin.to_string())
        .replace("%X_MAX%", &params.extent.xmax.to_string())
        .replace("%Y_MIN%", &params.extent.ymin.to_string())
        .replace("%Y_MAX%", &params.extent.ymax.to_string())
        .replace("%IDCOL%", &params.extent.id_column)
        .replace("%SRID%", &params.extent.srid.to_string())
        .replace("%NAME%", params.name)
        .replace("%FILE%", &params.data_path.display().to_string())
        .replace("%URL%", params.callback_url)
}

/// Reads the template, renders it, and writes the result to `mapfile`.
///
/// The write goes through a temp file in the same directory followed by a
/// rename, so a concurrent reader never observes a half-written mapfile.
pub async fn generate(
    template: &Path,
    mapfile: &Path,
    params: &MapfileParams<'_>,
) -> Result<(), MapfileError> {
    let text = tokio::fs::read_to_string(template)
        .await
        .map_err(|source| MapfileError::Template {
            path: template.to_path_buf(),
            source,
        })?;
    let rendered = render(&text, params);
    write_atomic(mapfile, &rendered)
        .await
        .map_err(|source| MapfileError::Write {
            path: mapfile.to_path_buf(),
            source,
        })
}

/// Writes `contents` to `path` via a same-directory temp file + rename.
async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}
