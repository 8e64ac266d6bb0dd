use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::Result;
use crate::models::{Flow, Step};
use crate::store::StateStore;

/// Location facts about the current document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub ready_state: String,
}

/// Replay-side seam. The production implementation drives the page over CDP;
/// tests act on an in-memory document.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn snapshot(&self) -> Result<PageSnapshot>;

    /// Whether any of the selector's fallback candidates resolves right now.
    async fn exists(&self, selector: &str) -> Result<bool>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Apply a committed value, as a change event would.
    async fn set_value(&self, selector: &str, value: &str, tag_name: &str) -> Result<()>;

    /// Simulate typing into a text control or content-editable region.
    async fn type_text(&self, selector: &str, value: &str, is_content_editable: bool)
        -> Result<()>;

    async fn press_key(&self, selector: &str, key: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn navigate(&self, url: &str) -> Result<()>;
}

/// How a playback pass ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayOutcome {
    /// Every step ran; progress state was cleared.
    Completed,
    /// Stopped by the user mid-run; progress state was cleared.
    Cancelled,
    /// A cross-page navigation was issued. Progress points at the navigation
    /// step so the post-load recovery pass re-enters there.
    Navigating,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackProgress {
    pub index: usize,
    pub total: usize,
    pub kind: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PlaybackTiming {
    pub element_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl From<&Config> for PlaybackTiming {
    fn from(config: &Config) -> Self {
        Self {
            element_timeout_ms: config.element_timeout_ms,
            poll_interval_ms: config.poll_interval_ms,
        }
    }
}

/// The playback state machine. One pass walks the flow from a start index;
/// navigation steps end the pass and a later pass picks up at the same index.
pub struct Player {
    actuator: Arc<dyn Actuator>,
    store: StateStore,
    timing: PlaybackTiming,
    active: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    cancel_sender: broadcast::Sender<()>,
    progress_sender: broadcast::Sender<PlaybackProgress>,
}

impl Player {
    pub fn new(actuator: Arc<dyn Actuator>, store: StateStore, timing: PlaybackTiming) -> Self {
        let (cancel_tx, _) = broadcast::channel(1);
        let (progress_tx, _) = broadcast::channel(64);
        Self {
            actuator,
            store,
            timing,
            active: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            cancel_sender: cancel_tx,
            progress_sender: progress_tx,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<PlaybackProgress> {
        self.progress_sender.subscribe()
    }

    /// Request cancellation of the current pass. Safe to call when idle.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.cancel_sender.send(());
    }

    /// Walk the flow from `start_index`. The step index is persisted before
    /// each action so a crash or reload resumes at the step that was in
    /// flight, never past it.
    pub async fn run(&self, flow: &Flow, start_index: usize) -> Result<PlayOutcome> {
        self.active.store(true, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
        let outcome = self.run_inner(flow, start_index).await;
        self.active.store(false, Ordering::SeqCst);

        match &outcome {
            Ok(PlayOutcome::Completed) | Ok(PlayOutcome::Cancelled) => {
                self.store.clear_progress().await;
            }
            Ok(PlayOutcome::Navigating) => {}
            Err(err) => {
                tracing::error!("Playback aborted: {}", err);
                self.store.clear_progress().await;
            }
        }
        outcome
    }

    async fn run_inner(&self, flow: &Flow, start_index: usize) -> Result<PlayOutcome> {
        let total = flow.steps.len();
        tracing::info!("Playback pass starting at step {}/{}", start_index, total);

        for (index, step) in flow.steps.iter().enumerate().skip(start_index) {
            if self.stopped.load(Ordering::SeqCst) {
                tracing::info!("Playback stopped at step {}", index);
                return Ok(PlayOutcome::Cancelled);
            }

            self.store.set_play_index(index).await;
            let _ = self.progress_sender.send(PlaybackProgress {
                index,
                total,
                kind: step.kind().to_string(),
            });

            match step {
                Step::PageStatus { .. } => {
                    // Context marker from the start of a recording.
                }
                Step::Navigation { url, .. } => {
                    let here = self.actuator.current_url().await.unwrap_or_default();
                    if here != *url {
                        tracing::info!("Navigating to {}", url);
                        self.actuator.navigate(url).await?;
                        return Ok(PlayOutcome::Navigating);
                    }
                    // Already there, typically right after the post-load
                    // resume re-entered this step.
                }
                Step::Click { selector, .. } => {
                    if !self.await_element(selector).await? {
                        continue;
                    }
                    self.actuator.click(selector).await?;
                }
                Step::Change {
                    selector,
                    value,
                    tag_name,
                    ..
                } => {
                    if !self.await_element(selector).await? {
                        continue;
                    }
                    self.actuator.set_value(selector, value, tag_name).await?;
                }
                Step::Input {
                    selector,
                    value,
                    is_content_editable,
                    ..
                } => {
                    if !self.await_element(selector).await? {
                        continue;
                    }
                    self.actuator
                        .type_text(selector, value, *is_content_editable)
                        .await?;
                }
                Step::Key { selector, key, .. } => {
                    if !self.await_element(selector).await? {
                        continue;
                    }
                    self.actuator.press_key(selector, key).await?;
                }
            }

            if self.pause(step.effective_delay()).await {
                tracing::info!("Playback stopped during delay after step {}", index);
                return Ok(PlayOutcome::Cancelled);
            }
        }

        tracing::info!("Playback pass completed ({} steps)", total);
        Ok(PlayOutcome::Completed)
    }

    /// Poll until the selector resolves or the timeout lapses. A miss is not
    /// fatal: the step is skipped, its delay with it.
    async fn await_element(&self, selector: &str) -> Result<bool> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.timing.element_timeout_ms);
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(false);
            }
            if self.actuator.exists(selector).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("Element not found, skipping step: {}", selector);
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(self.timing.poll_interval_ms)).await;
        }
    }

    /// Sleep the inter-step delay. Returns true if cancelled mid-sleep.
    async fn pause(&self, delay_ms: u64) -> bool {
        let mut cancel_rx = self.cancel_sender.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                self.stopped.load(Ordering::SeqCst)
            }
            _ = cancel_rx.recv() => true,
        }
    }
}
