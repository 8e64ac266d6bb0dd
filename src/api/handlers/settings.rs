use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use super::super::state::AppState;
use super::Ack;

#[derive(Debug, Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct PanelRequest {
    pub visible: bool,
}

pub async fn set_enabled(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnabledRequest>,
) -> Json<Ack> {
    state.engine.set_enabled(request.enabled).await;
    Json(Ack::ok())
}

pub async fn set_panel(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PanelRequest>,
) -> Json<Ack> {
    state.engine.set_panel_visible(request.visible).await;
    Json(Ack::ok())
}
