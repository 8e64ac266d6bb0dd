use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use super::KeyValueStore;

/// Explicit degraded mode: every read is empty, every write is dropped.
/// Recording and playback still run, without crash-recovery guarantees.
#[derive(Debug, Default)]
pub struct NullStore;

#[async_trait]
impl KeyValueStore for NullStore {
    async fn get(&self, _keys: &[&str]) -> HashMap<String, Value> {
        HashMap::new()
    }

    async fn set(&self, _entries: HashMap<String, Value>) {}
}
