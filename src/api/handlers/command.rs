use axum::{extract::State, Json};
use std::sync::Arc;

use super::super::state::AppState;
use super::Ack;
use crate::commands::Command;
use crate::error::Result;

/// Dispatch one inbound command to its engine entry point.
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    Json(command): Json<Command>,
) -> Result<Json<Ack>> {
    tracing::debug!("Command received: {:?}", command);
    state.engine.handle_command(command).await?;
    Ok(Json(Ack::ok()))
}
