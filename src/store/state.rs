use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{keys, KeyValueStore};
use crate::models::Step;

/// Everything recovery needs from the store, read in one round trip.
#[derive(Debug, Clone)]
pub struct RecoverySnapshot {
    pub enabled: bool,
    pub last_flow: Vec<Step>,
    pub last_source: Option<String>,
    pub is_recording: bool,
    pub session_steps: Vec<Step>,
    pub panel_visible: bool,
    pub is_playing: bool,
    pub play_flow: Vec<Step>,
    pub play_index: usize,
    pub scheduled_at: Option<i64>,
}

impl Default for RecoverySnapshot {
    fn default() -> Self {
        Self {
            enabled: true,
            last_flow: Vec::new(),
            last_source: None,
            is_recording: false,
            session_steps: Vec::new(),
            panel_visible: false,
            is_playing: false,
            play_flow: Vec::new(),
            play_index: 0,
            scheduled_at: None,
        }
    }
}

/// Typed wrapper owning the key names and (de)serialization. Serialization
/// failures degrade to no-ops with a logged error, matching the substrate's
/// failure philosophy.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<dyn KeyValueStore>,
}

impl StateStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> Option<(String, Value)> {
        match serde_json::to_value(value) {
            Ok(v) => Some((key.to_string(), v)),
            Err(e) => {
                tracing::error!("Could not serialize {}: {}", key, e);
                None
            }
        }
    }

    fn decode<T: DeserializeOwned>(map: &HashMap<String, Value>, key: &str) -> Option<T> {
        let value = map.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Ignoring malformed stored value for {}: {}", key, e);
                None
            }
        }
    }

    async fn write(&self, entries: impl IntoIterator<Item = Option<(String, Value)>>) {
        let entries: HashMap<String, Value> = entries.into_iter().flatten().collect();
        if !entries.is_empty() {
            self.inner.set(entries).await;
        }
    }

    pub async fn load_snapshot(&self) -> RecoverySnapshot {
        let map = self
            .inner
            .get(&[
                keys::ENABLED,
                keys::LAST_FLOW,
                keys::LAST_SOURCE,
                keys::IS_RECORDING,
                keys::SESSION_STEPS,
                keys::PANEL_VISIBLE,
                keys::IS_PLAYING,
                keys::PLAY_FLOW,
                keys::PLAY_INDEX,
                keys::SCHEDULED_AT,
            ])
            .await;

        let defaults = RecoverySnapshot::default();
        RecoverySnapshot {
            enabled: Self::decode(&map, keys::ENABLED).unwrap_or(defaults.enabled),
            last_flow: Self::decode(&map, keys::LAST_FLOW).unwrap_or_default(),
            last_source: Self::decode(&map, keys::LAST_SOURCE),
            is_recording: Self::decode(&map, keys::IS_RECORDING).unwrap_or(false),
            session_steps: Self::decode(&map, keys::SESSION_STEPS).unwrap_or_default(),
            panel_visible: Self::decode(&map, keys::PANEL_VISIBLE).unwrap_or(false),
            is_playing: Self::decode(&map, keys::IS_PLAYING).unwrap_or(false),
            play_flow: Self::decode(&map, keys::PLAY_FLOW).unwrap_or_default(),
            play_index: Self::decode(&map, keys::PLAY_INDEX).unwrap_or(0),
            scheduled_at: Self::decode::<Option<i64>>(&map, keys::SCHEDULED_AT).flatten(),
        }
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.write([Self::encode(keys::ENABLED, &enabled)]).await;
    }

    pub async fn set_panel_visible(&self, visible: bool) {
        self.write([Self::encode(keys::PANEL_VISIBLE, &visible)])
            .await;
    }

    /// Mark a recording session live with its steps so far.
    pub async fn begin_recording(&self, steps: &[Step]) {
        self.write([
            Self::encode(keys::IS_RECORDING, &true),
            Self::encode(keys::SESSION_STEPS, &steps),
        ])
        .await;
    }

    /// Persisted after every appended step, for crash/reload recovery.
    pub async fn save_session_steps(&self, steps: &[Step]) {
        self.write([Self::encode(keys::SESSION_STEPS, &steps)]).await;
    }

    pub async fn clear_recording(&self) {
        self.write([
            Self::encode(keys::IS_RECORDING, &false),
            Self::encode(keys::SESSION_STEPS, &Vec::<Step>::new()),
        ])
        .await;
    }

    /// Persist the active flow slot (what `run` consumes and status shows).
    pub async fn save_active_flow(&self, steps: &[Step], source_label: &str) {
        self.write([
            Self::encode(keys::LAST_FLOW, &steps),
            Self::encode(keys::LAST_SOURCE, &source_label),
        ])
        .await;
    }

    /// Arm playback progress before the loop starts.
    pub async fn save_progress(&self, steps: &[Step], index: usize) {
        self.write([
            Self::encode(keys::IS_PLAYING, &true),
            Self::encode(keys::PLAY_FLOW, &steps),
            Self::encode(keys::PLAY_INDEX, &index),
        ])
        .await;
    }

    /// Written before each step acts, so recovery resumes at that step.
    pub async fn set_play_index(&self, index: usize) {
        self.write([Self::encode(keys::PLAY_INDEX, &index)]).await;
    }

    pub async fn set_playing(&self, playing: bool) {
        self.write([Self::encode(keys::IS_PLAYING, &playing)]).await;
    }

    /// Natural completion or explicit stop, either way progress is gone.
    pub async fn clear_progress(&self) {
        self.write([
            Self::encode(keys::IS_PLAYING, &false),
            Self::encode(keys::PLAY_FLOW, &Vec::<Step>::new()),
            Self::encode(keys::PLAY_INDEX, &0usize),
        ])
        .await;
    }

    pub async fn set_scheduled_at(&self, at_epoch_ms: Option<i64>) {
        self.write([Self::encode(keys::SCHEDULED_AT, &at_epoch_ms)])
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn snapshot_defaults_when_store_is_empty() {
        let store = StateStore::new(Arc::new(MemoryStore::new()));
        let snap = store.load_snapshot().await;
        assert!(snap.enabled, "engine is enabled until told otherwise");
        assert!(!snap.is_recording);
        assert!(!snap.is_playing);
        assert_eq!(snap.play_index, 0);
    }

    #[tokio::test]
    async fn progress_round_trip() {
        let store = StateStore::new(Arc::new(MemoryStore::new()));
        let steps = vec![Step::click("body > a", 100), Step::click("body > b", 200)];

        store.save_progress(&steps, 0).await;
        store.set_play_index(1).await;

        let snap = store.load_snapshot().await;
        assert!(snap.is_playing);
        assert_eq!(snap.play_flow, steps);
        assert_eq!(snap.play_index, 1);

        store.clear_progress().await;
        let snap = store.load_snapshot().await;
        assert!(!snap.is_playing);
        assert!(snap.play_flow.is_empty());
    }

    #[tokio::test]
    async fn recording_state_round_trip() {
        let store = StateStore::new(Arc::new(MemoryStore::new()));
        let steps = vec![Step::page_status("https://a", "A", "complete", 1)];

        store.begin_recording(&steps).await;
        let snap = store.load_snapshot().await;
        assert!(snap.is_recording);
        assert_eq!(snap.session_steps, steps);

        store.clear_recording().await;
        let snap = store.load_snapshot().await;
        assert!(!snap.is_recording);
        assert!(snap.session_steps.is_empty());
    }
}
