use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;

use super::KeyValueStore;

/// In-memory store for tests and ephemeral runs, and the fallback when the
/// SQLite store cannot be opened.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> HashMap<String, Value> {
        keys.iter()
            .filter_map(|k| {
                self.entries
                    .get(*k)
                    .map(|entry| (k.to_string(), entry.value().clone()))
            })
            .collect()
    }

    async fn set(&self, entries: HashMap<String, Value>) {
        for (key, value) in entries {
            self.entries.insert(key, value);
        }
    }
}
