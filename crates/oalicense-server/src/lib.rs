//! OA License Server - Batch lookup API
//!
//! HTTP front door over the license pipeline. A lookup answers from the cache
//! immediately and reports everything else as `processing`; clients poll
//! again until each identifier is resolved or errored.

pub mod error;
pub mod http;
#[cfg(feature = "binary")]
pub mod publishers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use oalicense_core::{CacheStore, Completion, Dispatcher, Outcome, Resolver, WorkerPool};

pub use error::ApiError;

/// Shared application state
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl AppState {
    pub fn new(resolver: Arc<Resolver>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            resolver,
            dispatcher,
        }
    }

    /// Create with a worker pool sized from the resolver's configuration
    ///
    /// Must be called from within a tokio runtime. Completions are logged and
    /// expired cache entries are purged periodically.
    pub fn with_worker_pool(resolver: Arc<Resolver>) -> Self {
        let workers = resolver.config().detection.workers;
        let (pool, completions) = WorkerPool::spawn(Arc::clone(&resolver), workers);
        tokio::spawn(log_completions(completions));
        tokio::spawn(purge_expired(
            resolver.cache().clone(),
            resolver.config().cache.purge_interval(),
        ));
        Self::new(resolver, Arc::new(pool))
    }
}

/// Evict expired cache entries every `period`
pub async fn purge_expired(cache: CacheStore, period: Duration) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticks.tick().await;

    loop {
        ticks.tick().await;
        let removed = cache.purge_expired();
        if removed > 0 {
            tracing::info!("purged {} expired cache entries", removed);
        }
    }
}

async fn log_completions(mut completions: mpsc::UnboundedReceiver<Completion>) {
    while let Some(completion) = completions.recv().await {
        match completion.outcome {
            Outcome::Resolved(record) => tracing::info!(
                "{} resolved with {} license(s)",
                completion.identifier,
                record.licenses().len()
            ),
            Outcome::Errored(error) => {
                tracing::warn!("{} errored: {}", completion.identifier, error)
            }
            Outcome::Processing => tracing::debug!("{} still processing", completion.identifier),
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/lookup", post(http::post_lookup))
        .route("/lookup/{*ids}", get(http::get_lookup))
        .route("/status", get(http::get_status))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the server
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("OA license server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
