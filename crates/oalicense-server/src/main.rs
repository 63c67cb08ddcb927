//! OA License Server Binary
//!
//! Standalone server for the batch license lookup API.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use oalicense_core::{CacheBackend, InMemoryBackend, LicenseConfig, Resolver};
use oalicense_server::{publishers, serve, AppState};

fn load_config() -> Result<LicenseConfig, Box<dyn std::error::Error>> {
    let mut config = match std::env::var("OALICENSE_CONFIG") {
        Ok(path) => {
            tracing::info!("loading configuration from {}", path);
            LicenseConfig::from_toml(&std::fs::read_to_string(&path)?)?
        }
        Err(_) => LicenseConfig::default(),
    };

    if let Ok(addr) = std::env::var("OALICENSE_ADDR") {
        config.server.addr = addr;
    }

    config.validate()?;
    Ok(config)
}

fn cache_backend() -> Result<Arc<dyn CacheBackend>, Box<dyn std::error::Error>> {
    #[cfg(feature = "sqlite")]
    if let Ok(path) = std::env::var("OALICENSE_CACHE_DB") {
        tracing::info!("using SQLite cache at {}", path);
        return Ok(Arc::new(oalicense_core::SqliteBackend::open(&path)?));
    }

    tracing::info!("using in-memory cache");
    Ok(Arc::new(InMemoryBackend::new()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let addr = config.server.addr.clone();
    let registry = publishers::default_registry()?;

    let resolver = Arc::new(Resolver::new(
        Arc::new(config),
        cache_backend()?,
        Arc::new(registry),
    ));
    let state = Arc::new(AppState::with_worker_pool(resolver));

    serve(&addr, state).await
}
