use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::adapter::web::app_state::AppState;
use crate::core::domain::branch::ResourceManagerKind;

#[derive(Debug, Serialize)]
pub struct TargetView {
    pub target: String,
    pub kind: ResourceManagerKind,
}

/// Connection targets branch descriptors may name.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<TargetView>> {
    Json(
        state
            .registry
            .kinds()
            .into_iter()
            .map(|(target, kind)| TargetView { target, kind })
            .collect(),
    )
}
