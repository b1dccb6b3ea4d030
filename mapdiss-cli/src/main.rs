//! Command line front end
//!
//! Resolves one repository identifier through the cache engine and
//! prints the rendering-engine URL for it. Caller-supplied query
//! parameters are appended to the URL, minus any parameter that
//! re-identifies the resource.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mapdiss_lib::cache::Cache;
use mapdiss_lib::cache::SqliteStore;
use mapdiss_lib::config::MapdissConfig;
use mapdiss_lib::geodata::GdalIntrospector;
use mapdiss_lib::repo::HttpRepository;

/// Resolves a repository resource to a map-rendering-engine URL.
#[derive(Debug, Parser)]
#[command(name = "mapdiss", version)]
struct Args {
    /// Repository identifier of the geospatial resource.
    id: String,

    /// Directory holding cached binaries and mapfiles.
    #[arg(long, default_value = "/var/cache/mapdiss")]
    cache_dir: PathBuf,

    /// SQLite map index; defaults to maps.db inside the cache directory.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Seconds between remote staleness checks.
    #[arg(long, default_value_t = 3600)]
    keep_alive: u64,

    /// Mapfile template for raster resources.
    #[arg(long)]
    raster_template: PathBuf,

    /// Mapfile template for vector resources.
    #[arg(long)]
    vector_template: PathBuf,

    /// Base URL of the map-rendering engine.
    #[arg(long)]
    base_url: String,

    /// Query parameter to pass through to the rendering engine
    /// (repeatable).
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = MapdissConfig::new(
        &args.cache_dir,
        &args.raster_template,
        &args.vector_template,
        &args.base_url,
    )
    .with_keep_alive(Duration::from_secs(args.keep_alive));

    tokio::fs::create_dir_all(&args.cache_dir)
        .await
        .context("creating cache directory")?;
    let db = args
        .db
        .clone()
        .unwrap_or_else(|| args.cache_dir.join("maps.db"));
    let store = SqliteStore::open(&db).await.context("opening map index")?;

    let cache = Cache::new(
        config,
        Arc::new(store),
        Arc::new(HttpRepository::new()?),
        Arc::new(GdalIntrospector::new()),
    );

    let resolution = cache.resolve(&args.id).await?;
    let url = service_url(
        &resolution.entry.callback_url(&cache.config().base_url),
        &args.params,
    );
    info!(url = %url, refreshed = resolution.refreshed, "resolved");
    println!("{url}");

    Ok(())
}

/// Appends passthrough parameters to a callback URL.
///
/// The callback URL ends with `&`; the final URL must not. Any `id`
/// parameter is dropped, since the URL already targets the resource.
fn service_url(callback: &str, params: &[String]) -> String {
    let mut url = callback.trim_end_matches('&').to_string();
    for param in params {
        let (key, value) = param.split_once('=').unwrap_or((param.as_str(), ""));
        if key == "id" {
            continue;
        }
        url.push('&');
        url.push_str(&urlencoding::encode(key));
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    url
}
