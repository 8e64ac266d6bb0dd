use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use super::super::state::AppState;
use super::Ack;
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub at_epoch_ms: i64,
}

pub async fn arm(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<Ack>> {
    state.engine.schedule_run(request.at_epoch_ms).await?;
    Ok(Json(Ack::ok()))
}

pub async fn cancel(State(state): State<Arc<AppState>>) -> Json<Ack> {
    state.engine.cancel_schedule().await;
    Json(Ack::ok())
}
