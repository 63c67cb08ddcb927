//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use oalicense_core::{RequestedIdentifier, ResultSet};

use crate::error::ApiError;
use crate::AppState;

/// Look up a JSON array of identifiers (strings or `{"id", "type"}` objects)
pub async fn post_lookup(
    State(state): State<Arc<AppState>>,
    Json(requests): Json<Vec<RequestedIdentifier>>,
) -> Result<Json<ResultSet>, ApiError> {
    lookup(state, requests).await
}

/// Look up comma-separated identifiers from the path
pub async fn get_lookup(
    State(state): State<Arc<AppState>>,
    Path(ids): Path<String>,
) -> Result<Json<ResultSet>, ApiError> {
    let requests = ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(RequestedIdentifier::from)
        .collect();
    lookup(state, requests).await
}

async fn lookup(
    state: Arc<AppState>,
    requests: Vec<RequestedIdentifier>,
) -> Result<Json<ResultSet>, ApiError> {
    let limit = state.resolver.config().server.lookup_limit;
    if requests.len() > limit {
        return Err(ApiError::TooManyIdentifiers {
            requested: requests.len(),
            limit,
        });
    }

    // Cache reads block; keep them off the async workers
    let results = tokio::task::spawn_blocking(move || {
        state
            .resolver
            .lookup(&requests, state.dispatcher.as_ref())
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::debug!(
        "lookup of {}: {} resolved, {} processing, {} errored",
        results.requested,
        results.results.len(),
        results.processing.len(),
        results.errors.len()
    );
    Ok(Json(results))
}

/// Service status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = state.resolver.config();
    let registry = state.resolver.registry();

    Json(serde_json::json!({
        "service": "oalicense",
        "version": env!("CARGO_PKG_VERSION"),
        "detectors": {
            "provider": registry.provider_count(),
            "license": registry.license_count()
        },
        "workers": config.detection.workers,
        "lookup_limit": config.server.lookup_limit
    }))
}
