use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub index: usize,
    pub checked: bool,
}

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub selected: Vec<usize>,
}

pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectionRequest>,
) -> Json<SelectionResponse> {
    let selected = state
        .engine
        .toggle_selection(request.index, request.checked)
        .await;
    Json(SelectionResponse { selected })
}

/// Shift-extend from the last-touched index.
pub async fn range(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectionRequest>,
) -> Json<SelectionResponse> {
    let selected = state
        .engine
        .extend_selection(request.index, request.checked)
        .await;
    Json(SelectionResponse { selected })
}

pub async fn select_all(State(state): State<Arc<AppState>>) -> Json<SelectionResponse> {
    let selected = state.engine.select_all().await;
    Json(SelectionResponse { selected })
}

pub async fn clear(State(state): State<Arc<AppState>>) -> Json<SelectionResponse> {
    let selected = state.engine.clear_selection().await;
    Json(SelectionResponse { selected })
}
