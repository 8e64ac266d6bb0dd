use axum::{extract::State, Json};
use std::sync::Arc;

use super::super::state::AppState;
use super::Ack;
use crate::error::Result;

pub async fn run(State(state): State<Arc<AppState>>) -> Result<Json<Ack>> {
    state.engine.run().await?;
    Ok(Json(Ack::ok()))
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Json<Ack> {
    state.engine.stop_playback().await;
    Json(Ack::ok())
}
