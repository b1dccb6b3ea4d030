//! Map dissemination cache engine
//!
//! Lets a map-rendering engine serve geospatial resources that live in a
//! remote digital repository: resolves a repository identifier to a
//! locally cached geodata binary plus a generated mapfile, refreshing
//! both on a two-clock staleness policy (content modification time vs.
//! metadata-check time).

pub mod cache;
pub mod config;
pub mod error;
pub mod geodata;
pub mod mapfile;
pub mod repo;

pub use cache::Cache;
pub use cache::Resolution;
pub use config::MapdissConfig;
pub use error::Error;
