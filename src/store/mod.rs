//! The persistence seam: an asynchronous key-value substrate.
//!
//! Absence or failure of the store degrades every operation to a no-op
//! returning empty/void. The engine keeps running in memory only; it never
//! refuses to start over persistence.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

pub mod memory;
pub mod null;
pub mod sqlite;
pub mod state;

pub use memory::MemoryStore;
pub use null::NullStore;
pub use sqlite::SqliteStore;
pub use state::{RecoverySnapshot, StateStore};

/// Persisted key names. All values are JSON.
pub mod keys {
    pub const ENABLED: &str = "reenact_enabled";
    pub const LAST_FLOW: &str = "reenact_last_flow";
    pub const LAST_SOURCE: &str = "reenact_last_source";
    pub const IS_RECORDING: &str = "reenact_is_recording";
    pub const SESSION_STEPS: &str = "reenact_session_steps";
    pub const PANEL_VISIBLE: &str = "reenact_panel_visible";
    pub const IS_PLAYING: &str = "reenact_is_playing";
    pub const PLAY_FLOW: &str = "reenact_play_flow";
    pub const PLAY_INDEX: &str = "reenact_play_index";
    pub const SCHEDULED_AT: &str = "reenact_scheduled_at";
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the requested keys. Missing keys are simply absent from the map.
    async fn get(&self, keys: &[&str]) -> HashMap<String, Value>;

    /// Write all entries. Failures are swallowed by the implementation.
    async fn set(&self, entries: HashMap<String, Value>);
}
