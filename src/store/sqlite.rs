use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::KeyValueStore;

/// Default database path under the platform data directory.
fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| anyhow!("Could not find data directory"))?;
    Ok(data_dir.join("reenact").join("reenact.db"))
}

/// Production store: a single `kv` table with JSON-encoded values.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(path_override: Option<&Path>) -> Result<Self> {
        let db_path = match path_override {
            Some(p) => p.to_path_buf(),
            None => default_db_path()?,
        };
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        tracing::info!("Key-value store opened at {:?}", db_path);
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> HashMap<String, Value> {
        let conn = match self.conn.lock() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Store lock poisoned on get: {}", e);
                return HashMap::new();
            }
        };

        let mut out = HashMap::new();
        for key in keys {
            let row: std::result::Result<Option<String>, _> = conn
                .query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional();
            match row {
                Ok(Some(text)) => match serde_json::from_str(&text) {
                    Ok(value) => {
                        out.insert(key.to_string(), value);
                    }
                    Err(e) => tracing::error!("Stored value for {} is not JSON: {}", key, e),
                },
                Ok(None) => {}
                Err(e) => tracing::error!("Store read failed for {}: {}", key, e),
            }
        }
        out
    }

    async fn set(&self, entries: HashMap<String, Value>) {
        let conn = match self.conn.lock() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Store lock poisoned on set: {}", e);
                return;
            }
        };

        for (key, value) in entries {
            let text = match serde_json::to_string(&value) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!("Could not encode value for {}: {}", key, e);
                    continue;
                }
            };
            if let Err(e) = conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, text],
            ) {
                tracing::error!("Store write failed for {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_values_through_the_kv_table() {
        let dir = std::env::temp_dir().join(format!("reenact-store-{}", uuid::Uuid::new_v4()));
        let path = dir.join("test.db");
        let store = SqliteStore::new(Some(&path)).unwrap();

        tokio_test::block_on(async {
            let mut entries = HashMap::new();
            entries.insert("reenact_enabled".to_string(), json!(true));
            entries.insert("reenact_play_index".to_string(), json!(4));
            store.set(entries).await;

            let got = store
                .get(&["reenact_enabled", "reenact_play_index", "missing"])
                .await;
            assert_eq!(got.get("reenact_enabled"), Some(&json!(true)));
            assert_eq!(got.get("reenact_play_index"), Some(&json!(4)));
            assert!(!got.contains_key("missing"));
        });

        std::fs::remove_dir_all(&dir).ok();
    }
}
