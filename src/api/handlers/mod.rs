pub mod command;
pub mod flow;
pub mod health;
pub mod playback;
pub mod recording;
pub mod schedule;
pub mod selection;
pub mod settings;

use serde::Serialize;

/// Minimal acknowledgement body for mutation endpoints.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
