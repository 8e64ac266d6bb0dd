use axum::{
    http::{HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::handlers::{
    command, flow, health, playback, recording, schedule, selection, settings,
};
use super::state::AppState;
use super::websocket::ws_handler;
use crate::config::Config;

pub fn create_router(state: Arc<AppState>, config: &Config) -> Router {
    // The engine is a local sidecar; only the configured control-surface
    // origins may talk to it.
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unparseable CORS origin: {}", origin);
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        // Health & status
        .route("/health", get(health::health_check))
        .route("/status", get(health::get_status))
        // Command dispatch
        .route("/command", post(command::dispatch))
        // Flow fetch / interchange / editing
        .route("/flow", get(flow::get_flow))
        .route("/flow/import", post(flow::import_flow))
        .route("/flow/export", get(flow::export_flow))
        .route("/flow/value", post(flow::set_value))
        .route("/flow/delay/nudge", post(flow::nudge_delay))
        .route("/flow/delay/set", post(flow::set_delay))
        .route("/flow/delay/bulk", post(flow::bulk_delay))
        // Selection
        .route("/selection/toggle", post(selection::toggle))
        .route("/selection/range", post(selection::range))
        .route("/selection/all", post(selection::select_all))
        .route("/selection/clear", post(selection::clear))
        // Playback
        .route("/run", post(playback::run))
        .route("/stop", post(playback::stop))
        // Recording
        .route("/record/start", post(recording::start))
        .route("/record/stop", post(recording::stop))
        // Scheduling
        .route("/schedule", post(schedule::arm))
        .route("/schedule", delete(schedule::cancel))
        // Flags
        .route("/enabled", post(settings::set_enabled))
        .route("/panel", post(settings::set_panel))
        // WebSocket event feed
        .route("/ws/:client_id", get(ws_handler))
        .layer(cors)
        .with_state(state)
}
