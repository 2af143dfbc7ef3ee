//! OpenAPI document serving and the derived action catalog.
//!
//! The document is loaded once at startup and served verbatim;
//! `/actions/list` regroups its operations by tag so an agent can
//! discover what it is allowed to call.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProxyError;

use super::routes::AppState;

const METHODS: &[&str] = &["get", "post", "put", "patch", "delete"];

/// One callable operation from the OpenAPI document.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ActionEntry {
    pub operation_id: Option<String>,
    pub method: String,
    pub path: String,
    pub summary: Option<String>,
}

pub async fn openapi(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ProxyError> {
    state
        .openapi
        .as_ref()
        .cloned()
        .map(Json)
        .ok_or_else(|| ProxyError::NotFound("OpenAPI document not loaded".to_string()))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, Vec<ActionEntry>>>, ProxyError> {
    let doc = state
        .openapi
        .as_ref()
        .ok_or_else(|| ProxyError::NotFound("OpenAPI document not loaded".to_string()))?;
    Ok(Json(group_actions(doc)))
}

/// Group the document's operations by their first tag.
pub fn group_actions(doc: &Value) -> BTreeMap<String, Vec<ActionEntry>> {
    let mut groups: BTreeMap<String, Vec<ActionEntry>> = BTreeMap::new();
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return groups;
    };

    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        for method in METHODS {
            let Some(op) = item.get(*method) else {
                continue;
            };
            let tag = op
                .get("tags")
                .and_then(|t| t.as_array())
                .and_then(|t| t.first())
                .and_then(Value::as_str)
                .unwrap_or("untagged")
                .to_string();
            groups.entry(tag).or_default().push(ActionEntry {
                operation_id: op
                    .get("operationId")
                    .and_then(Value::as_str)
                    .map(String::from),
                method: method.to_uppercase(),
                path: path.clone(),
                summary: op.get("summary").and_then(Value::as_str).map(String::from),
            });
        }
    }
    groups
}
