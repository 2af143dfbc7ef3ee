//! Metrics endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::metrics::MetricsSummary;

use super::routes::AppState;

pub async fn summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MetricsSummary>, ProxyError> {
    Ok(Json(state.store.compute_metrics().await?))
}

pub async fn reasoning_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ProxyError> {
    let summary = state.store.reasoning_summary().await?;
    Ok(Json(json!({ "summary": summary })))
}
