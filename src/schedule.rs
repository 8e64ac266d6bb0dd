use chrono::Utc;
use std::sync::{Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{EngineError, Result};
use crate::session::Engine;
use crate::store::StateStore;

/// One-shot "run the active flow at wall-clock T" timer. The stamp is
/// persisted so a restart re-arms it; arming replaces any pending schedule.
pub struct Scheduler {
    store: StateStore,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            task: Mutex::new(None),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task
            .lock()
            .map(|guard| guard.as_ref().map(|t| !t.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Arm a run at `at_epoch_ms`. Times not strictly in the future are
    /// rejected before any state changes.
    pub async fn arm(&self, engine: Weak<Engine>, at_epoch_ms: i64) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        if at_epoch_ms <= now {
            return Err(EngineError::InvalidSchedule);
        }

        self.abort_task();
        self.store.set_scheduled_at(Some(at_epoch_ms)).await;

        let store = self.store.clone();
        let wait = Duration::from_millis((at_epoch_ms - now) as u64);
        tracing::info!("Scheduled run armed for {} ms from now", wait.as_millis());

        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            // The stamp is consumed before firing so a crash inside the run
            // does not replay the schedule on the next start.
            store.set_scheduled_at(None).await;
            if let Some(engine) = engine.upgrade() {
                tracing::info!("Scheduled run firing");
                if let Err(err) = engine.run().await {
                    tracing::warn!("Scheduled run failed: {}", err);
                }
            }
        });

        if let Ok(mut guard) = self.task.lock() {
            *guard = Some(handle);
        }
        Ok(())
    }

    pub async fn cancel(&self) {
        if self.abort_task() {
            tracing::info!("Scheduled run cancelled");
        }
        self.store.set_scheduled_at(None).await;
    }

    /// Recovery path: a future stamp re-arms, a stale one is cleared.
    pub async fn rearm(&self, engine: Weak<Engine>, stamp: Option<i64>) {
        let Some(at) = stamp else {
            return;
        };
        if at <= Utc::now().timestamp_millis() {
            tracing::info!("Discarding expired schedule stamp {}", at);
            self.store.set_scheduled_at(None).await;
            return;
        }
        if let Err(err) = self.arm(engine, at).await {
            tracing::warn!("Could not re-arm schedule: {}", err);
        }
    }

    fn abort_task(&self) -> bool {
        if let Ok(mut guard) = self.task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
                return true;
            }
        }
        false
    }
}
