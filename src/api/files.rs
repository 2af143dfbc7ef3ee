//! File proxy endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use futures::future::join_all;

use crate::error::ProxyError;

use super::routes::AppState;
use super::types::{BatchFileRequest, BatchFileResponse, FileRequest, FileResponse};

/// Fetch a single repository file.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FileRequest>,
) -> Result<Json<FileResponse>, ProxyError> {
    let file = state.store.github().get_file(&req.path).await?;
    Ok(Json(FileResponse {
        path: file.path,
        content: file.content,
        sha: file.sha,
    }))
}

/// Fetch several files concurrently. Failures are reported per path so
/// one missing file doesn't sink the batch.
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchFileRequest>,
) -> Json<BatchFileResponse> {
    let fetches = req
        .paths
        .iter()
        .map(|path| state.store.github().get_file(path));
    let results = join_all(fetches).await;

    let mut files = Vec::new();
    let mut errors = BTreeMap::new();
    for (path, result) in req.paths.into_iter().zip(results) {
        match result {
            Ok(file) => files.push(FileResponse {
                path: file.path,
                content: file.content,
                sha: file.sha,
            }),
            Err(e) => {
                errors.insert(path, e.to_string());
            }
        }
    }
    Json(BatchFileResponse { files, errors })
}
