use axum::{extract::State, Json};
use std::sync::Arc;

use super::super::state::AppState;
use super::Ack;
use crate::error::Result;

pub async fn start(State(state): State<Arc<AppState>>) -> Result<Json<Ack>> {
    state.engine.start_recording().await?;
    Ok(Json(Ack::ok()))
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Result<Json<Ack>> {
    state.engine.stop_and_save().await?;
    Ok(Json(Ack::ok()))
}
