//! Geodata model and introspection seam
//!
//! Provides the spatial extent value type and the `Introspector` trait
//! used by the refresh logic to derive a resource's bounding box from the
//! locally cached file. Introspection never fails a refresh: anything the
//! concrete implementation cannot determine stays at the whole-earth
//! default so the resource remains servable.

mod gdal;

pub use gdal::*;

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

/// Kind of geodata a cached resource holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Gridded imagery (GeoTIFF, JPEG, PNG, JPEG 2000).
    Raster,
    /// Feature data (GeoJSON, KML, GML).
    Vector,
}

/// MIME types the repository may report for raster resources.
const RASTER_MIME_TYPES: &[&str] = &["image/tiff", "image/jpeg", "image/png", "image/jp2"];

/// MIME types the repository may report for vector resources.
const VECTOR_MIME_TYPES: &[&str] = &[
    "application/vnd.geo+json",
    "application/geo+json",
    "application/json",
    "application/vnd.google-earth.kml+xml",
    "application/gml+xml",
];

impl ResourceType {
    /// Classifies a repository-reported MIME type.
    ///
    /// Returns `None` for anything outside the supported raster and
    /// vector formats; callers treat that as a hard failure, not a third
    /// resource kind.
    pub fn from_mime(mime: &str) -> Option<Self> {
        if RASTER_MIME_TYPES.contains(&mime) {
            Some(Self::Raster)
        } else if VECTOR_MIME_TYPES.contains(&mime) {
            Some(Self::Vector)
        } else {
            None
        }
    }

    /// Returns the storable name of this resource type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raster => "raster",
            Self::Vector => "vector",
        }
    }

    /// Parses a storable name back into a resource type.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raster" => Some(Self::Raster),
            "vector" => Some(Self::Vector),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounding extent of a geodata file, in the resource's native SRS.
///
/// The default is the whole earth under WGS 84 with an `id` identifier
/// column. Introspection overrides whichever fields it can determine and
/// leaves the rest at the default, so a generated mapfile is always
/// renderable, if possibly degraded.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodataExtent {
    /// Western bound. Always `<= xmax`.
    pub xmin: f64,
    /// Eastern bound.
    pub xmax: f64,
    /// Southern bound. Always `<= ymax`.
    pub ymin: f64,
    /// Northern bound.
    pub ymax: f64,
    /// Identifier column for vector layers.
    pub id_column: String,
    /// Spatial reference system identifier.
    pub srid: i32,
}

impl Default for GeodataExtent {
    fn default() -> Self {
        Self {
            xmin: -180.0,
            xmax: 180.0,
            ymin: -90.0,
            ymax: 90.0,
            id_column: "id".to_string(),
            srid: 4326,
        }
    }
}

impl GeodataExtent {
    /// Sets the bounds, normalized so that `xmin <= xmax` and
    /// `ymin <= ymax` regardless of the corner order given.
    pub fn set_bounds(&mut self, x1: f64, x2: f64, y1: f64, y2: f64) {
        self.xmin = x1.min(x2);
        self.xmax = x1.max(x2);
        self.ymin = y1.min(y2);
        self.ymax = y1.max(y2);
    }
}

/// Derives the spatial extent of a locally cached geodata file.
///
/// Implementations must not fail: whatever cannot be determined stays at
/// the [`GeodataExtent`] default. Re-deriving geodata must never block
/// resource availability.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// Returns the extent of the file at `path`, interpreted as `kind`.
    async fn introspect(&self, path: &Path, kind: ResourceType) -> GeodataExtent;
}
