//! GDAL/OGR based introspection
//!
//! Shells out to the `gdalinfo` and `ogrinfo` command line tools and
//! parses their free-text reports. The parsing is deliberately tolerant:
//! a missing marker line keeps the corresponding default, and a report
//! that cannot be read at all degrades to the whole-earth extent.

use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;
use tracing::warn;

use super::GeodataExtent;
use super::Introspector;
use super::ResourceType;

/// Introspector backed by the GDAL command line tools.
///
/// Rasters go through `gdalinfo`; vectors through two sequential
/// `ogrinfo` invocations (layer listing, then layer description). The
/// binaries are looked up on `PATH` unless overridden.
#[derive(Debug, Clone)]
pub struct GdalIntrospector {
    gdalinfo: PathBuf,
    ogrinfo: PathBuf,
}

impl Default for GdalIntrospector {
    fn default() -> Self {
        Self {
            gdalinfo: PathBuf::from("gdalinfo"),
            ogrinfo: PathBuf::from("ogrinfo"),
        }
    }
}

impl GdalIntrospector {
    /// Creates an introspector using `gdalinfo`/`ogrinfo` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an introspector with explicit tool locations.
    pub fn with_binaries(gdalinfo: impl Into<PathBuf>, ogrinfo: impl Into<PathBuf>) -> Self {
        Self {
            gdalinfo: gdalinfo.into(),
            ogrinfo: ogrinfo.into(),
        }
    }

    /// Runs a tool and returns its stdout, or `None` when the tool could
    /// not be started or exited unsuccessfully.
    async fn run(&self, program: &Path, args: &[&OsStr]) -> Option<String> {
        let output = match Command::new(program).args(args).output().await {
            Ok(output) => output,
            Err(e) => {
                warn!(program = %program.display(), error = %e, "introspection tool failed to start");
                return None;
            }
        };
        if !output.status.success() {
            warn!(program = %program.display(), status = %output.status, "introspection tool exited unsuccessfully");
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn raster_extent(&self, path: &Path) -> GeodataExtent {
        let mut extent = GeodataExtent::default();
        let Some(report) = self.run(&self.gdalinfo, &[path.as_os_str()]).await else {
            return extent;
        };
        match parse_raster_report(&report) {
            Some((x1, x2, y1, y2)) => extent.set_bounds(x1, x2, y1, y2),
            None => warn!(path = %path.display(), "no corner coordinates in gdalinfo report, keeping default extent"),
        }
        extent
    }

    async fn vector_extent(&self, path: &Path) -> GeodataExtent {
        let mut extent = GeodataExtent::default();

        let list_args = [OsStr::new("-nomd"), OsStr::new("-so"), path.as_os_str()];
        let Some(listing) = self.run(&self.ogrinfo, &list_args).await else {
            return extent;
        };
        let Some(layer) = first_layer_name(&listing) else {
            warn!(path = %path.display(), "no layer in ogrinfo listing, keeping default extent");
            return extent;
        };
        debug!(path = %path.display(), layer = %layer, "describing vector layer");

        let describe_args = [
            OsStr::new("-nomd"),
            OsStr::new("-so"),
            path.as_os_str(),
            OsStr::new(&layer),
        ];
        let Some(report) = self.run(&self.ogrinfo, &describe_args).await else {
            return extent;
        };

        let parsed = parse_layer_report(&report);
        if let Some((x1, x2, y1, y2)) = parsed.bounds {
            extent.set_bounds(x1, x2, y1, y2);
        }
        if let Some(id_column) = parsed.id_column {
            extent.id_column = id_column;
        }
        extent
    }
}

#[async_trait]
impl Introspector for GdalIntrospector {
    async fn introspect(&self, path: &Path, kind: ResourceType) -> GeodataExtent {
        match kind {
            ResourceType::Raster => self.raster_extent(path).await,
            ResourceType::Vector => self.vector_extent(path).await,
        }
    }
}

/// Fields extracted from an `ogrinfo` layer description.
#[derive(Debug, Default, PartialEq)]
struct LayerReport {
    /// Declared extent as reported, unnormalized: `(x1, x2, y1, y2)`.
    bounds: Option<(f64, f64, f64, f64)>,
    /// Discovered identifier column.
    id_column: Option<String>,
}

/// Extracts the coordinate pair from a gdalinfo corner line, e.g.
/// `Lower Left  (  16.1870000,  48.1230000) ( 16d11'13.20"E, ...)`.
fn parse_corner(line: &str) -> Option<(f64, f64)> {
    let open = line.find('(')?;
    let close = line[open..].find(')')? + open;
    let mut parts = line[open + 1..close].split(',');
    let x = parts.next()?.trim().parse().ok()?;
    let y = parts.next()?.trim().parse().ok()?;
    Some((x, y))
}

/// Finds the lower-left and upper-right corner coordinates in a gdalinfo
/// report. The returned tuple is unnormalized `(x1, x2, y1, y2)`.
fn parse_raster_report(report: &str) -> Option<(f64, f64, f64, f64)> {
    let mut lower_left = None;
    let mut upper_right = None;
    for line in report.lines() {
        if line.starts_with("Lower Left") {
            lower_left = parse_corner(line);
        } else if line.starts_with("Upper Right") {
            upper_right = parse_corner(line);
        }
    }
    let (x1, y1) = lower_left?;
    let (x2, y2) = upper_right?;
    Some((x1, x2, y1, y2))
}

/// Returns the first declared layer name from an ogrinfo listing, e.g.
/// `1: places (Point)` yields `places`.
fn first_layer_name(listing: &str) -> Option<String> {
    for line in listing.lines() {
        if let Some(rest) = line.strip_prefix("1: ") {
            let name = rest.split_whitespace().next()?;
            return Some(name.to_string());
        }
    }
    None
}

/// Parses an ogrinfo layer description: the `Extent:` line and the
/// identifier column.
///
/// Attribute declarations follow the indented `Layer SRS` WKT block; the
/// first non-indented line after the marker is the fallback identifier
/// column, unless a column literally named `id` appears among them.
fn parse_layer_report(report: &str) -> LayerReport {
    let mut parsed = LayerReport::default();

    let mut after_srs = false;
    for line in report.lines() {
        if let Some(rest) = line.strip_prefix("Extent:") {
            parsed.bounds = parse_extent_line(rest);
        }
        if line.starts_with("Layer SRS") {
            after_srs = true;
            continue;
        }
        if after_srs && !line.starts_with(' ') && !line.starts_with('\t') {
            let name = line.split(':').next().unwrap_or("").trim();
            if name.is_empty() {
                continue;
            }
            if name == "id" {
                parsed.id_column = Some("id".to_string());
                break;
            }
            if parsed.id_column.is_none() {
                parsed.id_column = Some(name.to_string());
            }
        }
    }
    parsed
}

/// Parses the value part of an `Extent:` line, e.g.
/// ` (16.187000, 48.123000) - (16.421000, 48.287000)`.
///
/// Returns `(x1, x2, y1, y2)` following the report's
/// `(xmin, ymin) - (xmax, ymax)` convention, unnormalized.
fn parse_extent_line(rest: &str) -> Option<(f64, f64, f64, f64)> {
    // Cannot split on '-': coordinates may be negative. Take the two
    // parenthesized groups instead.
    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;
    let (x1, y1) = parse_corner(&rest[open..=close])?;
    let (x2, y2) = parse_corner(&rest[close + 1..])?;
    Some((x1, x2, y1, y2))
}
