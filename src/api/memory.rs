//! Memory index endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Json;

use crate::error::ProxyError;
use crate::memory::{IndexOutcome, MemoryDiff, MemoryStats, DEFAULT_INDEX_ROOTS};
use crate::model::MemoryEntry;

use super::routes::AppState;
use super::types::{MemoryAddRequest, MemoryIndexRequest, SearchQuery};

fn roots_or_default(base_paths: Vec<String>) -> Vec<String> {
    if base_paths.is_empty() {
        DEFAULT_INDEX_ROOTS.iter().map(|s| s.to_string()).collect()
    } else {
        base_paths
    }
}

pub async fn index(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MemoryIndexRequest>,
) -> Result<Json<IndexOutcome>, ProxyError> {
    let roots = roots_or_default(req.base_paths);
    Ok(Json(state.store.index_memory(&roots).await?))
}

pub async fn diff(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MemoryIndexRequest>,
) -> Result<Json<MemoryDiff>, ProxyError> {
    let roots = roots_or_default(req.base_paths);
    Ok(Json(state.store.memory_diff(&roots).await?))
}

pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MemoryAddRequest>,
) -> Result<Json<MemoryEntry>, ProxyError> {
    Ok(Json(
        state
            .store
            .add_to_memory(&req.path, req.description, req.tags)
            .await?,
    ))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<MemoryEntry>>, ProxyError> {
    Ok(Json(state.store.search_memory(&query.q).await?))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MemoryStats>, ProxyError> {
    Ok(Json(state.store.memory_stats().await?))
}
