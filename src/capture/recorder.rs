use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{is_allowed_key, Flow, FlowSource, Step};
use crate::selector::{synthesize, PathSegment};
use crate::store::StateStore;

/// One interaction reported by the page while recording. The production
/// capture script ships these over a CDP binding; tests feed them directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub kind: String,
    /// Ancestor facts of the event target, target-first.
    #[serde(default)]
    pub path: Vec<PathSegment>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub is_content_editable: bool,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ready_state: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Capture-side seam. The production implementation injects a capture script
/// and relays binding calls; tests use a scripted fake.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Install capture-phase listeners on the document.
    async fn install(&self) -> Result<()>;

    /// Remove the listeners. Events already in flight may still arrive.
    async fn uninstall(&self) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<CapturedEvent>;
}

struct RecordingSession {
    id: Uuid,
    steps: Vec<Step>,
}

/// The capture engine: consumes page events, normalizes them into steps, and
/// persists the working flow after every append.
pub struct Recorder {
    source: Arc<dyn EventSource>,
    store: StateStore,
    session: Arc<Mutex<Option<RecordingSession>>>,
    step_sender: broadcast::Sender<Step>,
    cancel_sender: broadcast::Sender<()>,
}

impl Recorder {
    pub fn new(source: Arc<dyn EventSource>, store: StateStore) -> Self {
        let (step_tx, _) = broadcast::channel(256);
        let (cancel_tx, _) = broadcast::channel(1);
        Self {
            source,
            store,
            session: Arc::new(Mutex::new(None)),
            step_sender: step_tx,
            cancel_sender: cancel_tx,
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn step_count(&self) -> usize {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.steps.len())
            .unwrap_or(0)
    }

    pub async fn session_steps(&self) -> Vec<Step> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.steps.clone())
            .unwrap_or_default()
    }

    /// Subscribe to steps as they are appended.
    pub fn subscribe_steps(&self) -> broadcast::Receiver<Step> {
        self.step_sender.subscribe()
    }

    /// Begin a fresh session seeded with one page-status step.
    pub async fn start(&self, page_status: Step) -> Result<()> {
        self.begin(vec![page_status]).await
    }

    /// Re-enter a session interrupted by a reload: the persisted steps plus a
    /// synthetic navigation step describing the current location.
    pub async fn resume(&self, mut persisted: Vec<Step>, navigation: Step) -> Result<()> {
        persisted.push(navigation);
        self.begin(persisted).await
    }

    async fn begin(&self, steps: Vec<Step>) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            if session.is_some() {
                return Ok(());
            }
            let id = Uuid::new_v4();
            tracing::info!("Recording session {} started ({} seed steps)", id, steps.len());
            *session = Some(RecordingSession { id, steps });
        }

        // Nothing is persisted until listeners are actually live; otherwise a
        // failed start would leave an armed session the next recovery pass
        // resumes, and a retry would short-circuit past install.
        if let Err(err) = self.source.install().await {
            self.session.lock().await.take();
            self.store.clear_recording().await;
            return Err(err);
        }

        let steps = self.session_steps().await;
        self.store.begin_recording(&steps).await;
        self.spawn_consumer();
        Ok(())
    }

    /// Append a navigation observed mid-session (same-process reload path).
    pub async fn append_navigation(&self, navigation: Step) {
        let steps = {
            let mut session = self.session.lock().await;
            let Some(ref mut sess) = *session else {
                return;
            };
            sess.steps.push(navigation.clone());
            sess.steps.clone()
        };
        self.store.save_session_steps(&steps).await;
        let _ = self.step_sender.send(navigation);
    }

    fn spawn_consumer(&self) {
        let session = Arc::clone(&self.session);
        let store = self.store.clone();
        let step_sender = self.step_sender.clone();
        let mut cancel_rx = self.cancel_sender.subscribe();
        let mut events = self.source.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_rx.recv() => {
                        tracing::debug!("Capture consumer cancelled");
                        break;
                    }
                    maybe_event = events.recv() => {
                        match maybe_event {
                            Ok(event) => {
                                let Some(step) = normalize_event(&event) else {
                                    continue;
                                };

                                let steps = {
                                    let mut session_guard = session.lock().await;
                                    let Some(ref mut sess) = *session_guard else {
                                        // Stopped between delivery and processing.
                                        continue;
                                    };
                                    sess.steps.push(step.clone());
                                    sess.steps.clone()
                                };

                                // Durability over throughput: persist after
                                // every append so a crash loses nothing.
                                store.save_session_steps(&steps).await;
                                let _ = step_sender.send(step);
                            }
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                tracing::warn!("Capture consumer lagged, {} events dropped", missed);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                tracing::debug!("Capture event stream closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Stop the session: remove listeners, derive delays, clear the recording
    /// flags, and hand the finished flow to the caller.
    pub async fn stop(&self) -> Result<Flow> {
        let _ = self.cancel_sender.send(());
        self.source.uninstall().await.ok();

        let session = self
            .session
            .lock()
            .await
            .take()
            .ok_or(EngineError::EmptyFlow)?;
        let mut steps = session.steps;
        if steps.is_empty() {
            return Err(EngineError::EmptyFlow);
        }

        Flow::derive_delays(&mut steps);
        self.store.clear_recording().await;

        tracing::info!(
            "Recording session {} saved with {} steps",
            session.id,
            steps.len()
        );
        Ok(Flow::new(steps, FlowSource::Recording))
    }

    /// Drop the session without saving.
    pub async fn cancel(&self) {
        let _ = self.cancel_sender.send(());
        self.source.uninstall().await.ok();
        if self.session.lock().await.take().is_some() {
            self.store.clear_recording().await;
            tracing::info!("Recording cancelled");
        }
    }
}

/// Turn a page event into a step, or drop it. Keydown events outside the key
/// allow-list and events with no resolvable target are dropped here even if
/// the capture script already filtered them.
fn normalize_event(event: &CapturedEvent) -> Option<Step> {
    let selector = synthesize(&event.path);
    if selector.is_empty() {
        return None;
    }
    match event.kind.as_str() {
        "click" => Some(Step::click(&selector, event.timestamp)),
        "change" => Some(Step::change(
            &selector,
            event.value.as_deref().unwrap_or(""),
            event.tag.as_deref().unwrap_or(""),
            event.timestamp,
        )),
        "input" => Some(Step::input(
            &selector,
            event.value.as_deref().unwrap_or(""),
            event.tag.as_deref().unwrap_or(""),
            event.is_content_editable,
            event.timestamp,
        )),
        "key" => {
            let key = event.key.as_deref()?;
            if !is_allowed_key(key) {
                return None;
            }
            Some(Step::key(&selector, key, event.timestamp))
        }
        other => {
            tracing::debug!("Ignoring unknown capture event kind {:?}", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakySource {
        fail_next: AtomicBool,
        installed: AtomicBool,
        sender: broadcast::Sender<CapturedEvent>,
    }

    impl FlakySource {
        fn new() -> Self {
            let (tx, _) = broadcast::channel(8);
            Self {
                fail_next: AtomicBool::new(true),
                installed: AtomicBool::new(false),
                sender: tx,
            }
        }
    }

    #[async_trait]
    impl EventSource for FlakySource {
        async fn install(&self) -> Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(EngineError::Browser("binding unavailable".to_string()));
            }
            self.installed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn uninstall(&self) -> Result<()> {
            self.installed.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<CapturedEvent> {
            self.sender.subscribe()
        }
    }

    #[tokio::test]
    async fn failed_install_leaves_no_recording_state() {
        let source = Arc::new(FlakySource::new());
        let store = StateStore::new(Arc::new(MemoryStore::new()));
        let recorder = Recorder::new(
            Arc::clone(&source) as Arc<dyn EventSource>,
            store.clone(),
        );

        let status = Step::page_status("https://app.test/", "Fixture", "complete", 0);
        let err = recorder.start(status.clone()).await.unwrap_err();
        assert!(matches!(err, EngineError::Browser(_)));
        assert!(!recorder.is_recording().await);
        assert!(!store.load_snapshot().await.is_recording);

        // The retry goes through the full start path, listeners included.
        recorder.start(status).await.unwrap();
        assert!(recorder.is_recording().await);
        assert!(source.installed.load(Ordering::SeqCst));
        assert!(store.load_snapshot().await.is_recording);
    }

    fn click_event(ts: i64) -> CapturedEvent {
        CapturedEvent {
            kind: "click".to_string(),
            path: vec![
                PathSegment::new("button", None, 2),
                PathSegment::new("body", None, 1),
                PathSegment::new("html", None, 1),
            ],
            value: None,
            tag: Some("button".to_string()),
            is_content_editable: false,
            key: None,
            url: None,
            title: None,
            ready_state: None,
            timestamp: ts,
        }
    }

    #[test]
    fn click_events_normalize_with_synthesized_selector() {
        let step = normalize_event(&click_event(123)).unwrap();
        assert_eq!(
            step,
            Step::click("html > body > button:nth-of-type(2)", 123)
        );
    }

    #[test]
    fn disallowed_keys_are_dropped() {
        let mut event = click_event(1);
        event.kind = "key".to_string();
        event.key = Some("a".to_string());
        assert!(normalize_event(&event).is_none());

        event.key = Some("Enter".to_string());
        let step = normalize_event(&event).unwrap();
        assert_eq!(step.kind(), "key");
    }

    #[test]
    fn events_without_a_target_are_dropped() {
        let mut event = click_event(1);
        event.path.clear();
        assert!(normalize_event(&event).is_none());
    }

    #[test]
    fn unknown_kinds_are_dropped() {
        let mut event = click_event(1);
        event.kind = "scroll".to_string();
        assert!(normalize_event(&event).is_none());
    }
}
