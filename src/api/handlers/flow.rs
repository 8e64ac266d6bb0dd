use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::super::state::AppState;
use super::Ack;
use crate::error::Result;
use crate::models::{BulkMode, Flow, FlowSource, Step};

#[derive(Debug, Serialize)]
pub struct FlowResponse {
    pub source: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub content: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ValueEditRequest {
    pub index: usize,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct NudgeRequest {
    pub anchor: usize,
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetDelayRequest {
    pub anchor: usize,
    pub value: u64,
}

#[derive(Debug, Deserialize)]
pub struct BulkDelayRequest {
    pub mode: BulkMode,
    pub value: u64,
}

pub async fn get_flow(State(state): State<Arc<AppState>>) -> Json<FlowResponse> {
    let flow = state.engine.active_flow().await;
    Json(FlowResponse {
        source: flow.as_ref().map(|f| f.source.label().to_string()),
        steps: flow.map(|f| f.steps).unwrap_or_default(),
    })
}

/// Import an interchange document as the active flow without running it.
pub async fn import_flow(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<Ack>> {
    let steps = Flow::import_json(&request.content)?;
    state
        .engine
        .replace_active_flow(Flow::new(steps, FlowSource::File(request.name)))
        .await;
    Ok(Json(Ack::ok()))
}

pub async fn export_flow(State(state): State<Arc<AppState>>) -> Result<Json<ExportResponse>> {
    let content = state.engine.export().await?;
    Ok(Json(ExportResponse { content }))
}

pub async fn set_value(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValueEditRequest>,
) -> Json<Ack> {
    state.engine.set_value(request.index, &request.value).await;
    Json(Ack::ok())
}

pub async fn nudge_delay(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NudgeRequest>,
) -> Json<Ack> {
    state.engine.nudge_delay(request.anchor, request.delta).await;
    Json(Ack::ok())
}

pub async fn set_delay(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetDelayRequest>,
) -> Json<Ack> {
    state.engine.set_delay(request.anchor, request.value).await;
    Json(Ack::ok())
}

pub async fn bulk_delay(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkDelayRequest>,
) -> Json<Ack> {
    state.engine.bulk_delay(request.mode, request.value).await;
    Json(Ack::ok())
}
