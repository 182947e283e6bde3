//! API Handlers
//!
//! HTTP request handlers for each cache node endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use tracing::debug;

use crate::error::{GroupError, Result};
use crate::group::GroupRegistry;
use crate::models::{HealthResponse, StatsResponse};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Groups this node serves
    pub registry: Arc<GroupRegistry>,
    /// Address peers reach this node at
    pub node_addr: String,
}

impl AppState {
    /// Creates a new AppState over the given registry.
    pub fn new(registry: Arc<GroupRegistry>, node_addr: impl Into<String>) -> Self {
        Self {
            registry,
            node_addr: node_addr.into(),
        }
    }
}

/// Handler for GET /_cache/:group/:key
///
/// Serves the value as raw bytes. Peers call this to reach the key's owner.
pub async fn fetch_handler(
    State(state): State<AppState>,
    Path((group, key)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    fetch(&state, &group, &key).await
}

/// Handler for GET /_cache/:group/ (the empty key)
pub async fn fetch_empty_key_handler(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<impl IntoResponse> {
    fetch(&state, &group, "").await
}

async fn fetch(state: &AppState, group: &str, key: &str) -> Result<impl IntoResponse> {
    let group = state
        .registry
        .get(group)
        .ok_or_else(|| GroupError::NoSuchGroup(group.to_string()))?;

    debug!(group = %group.name(), key = %key, "serving peer fetch");
    let value = group.get(key).await?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        value.to_vec(),
    ))
}

/// Handler for GET /stats/:group
pub async fn stats_handler(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<StatsResponse>> {
    let found = state
        .registry
        .get(&group)
        .ok_or(GroupError::NoSuchGroup(group))?;

    Ok(Json(StatsResponse::new(found.name(), found.stats())))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(
        state.node_addr.clone(),
        state.registry.names(),
    ))
}
