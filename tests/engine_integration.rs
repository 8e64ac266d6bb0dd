//! Cross-module tests driving the engine through the capture and actuator
//! seams, with an in-memory document standing in for the page.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

use reenact::capture::{CapturedEvent, EventSource};
use reenact::commands::Command;
use reenact::config::Config;
use reenact::dom::{Document, NodeId};
use reenact::error::{EngineError, Result};
use reenact::models::{coerce_checked, Step};
use reenact::playback::{Actuator, PageSnapshot};
use reenact::selector::{resolve, synthesize, PathSegment};
use reenact::session::{Engine, EngineEvent, Mode, RecoveryOutcome};
use reenact::store::{MemoryStore, NullStore, StateStore};

struct FakeEventSource {
    sender: broadcast::Sender<CapturedEvent>,
    installed: AtomicBool,
}

impl FakeEventSource {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            sender: tx,
            installed: AtomicBool::new(false),
        }
    }

    fn emit(&self, event: CapturedEvent) {
        let _ = self.sender.send(event);
    }
}

#[async_trait]
impl EventSource for FakeEventSource {
    async fn install(&self) -> Result<()> {
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

/// Applies step effects to an in-memory document and records each effect
/// together with the play index persisted at the moment it ran.
struct FakeActuator {
    doc: Mutex<Document>,
    effects: Mutex<Vec<(String, usize)>>,
    store: StateStore,
}

impl FakeActuator {
    fn new(doc: Document, store: StateStore) -> Self {
        Self {
            doc: Mutex::new(doc),
            effects: Mutex::new(Vec::new()),
            store,
        }
    }

    fn effects(&self) -> Vec<String> {
        self.effects
            .lock()
            .unwrap()
            .iter()
            .map(|(effect, _)| effect.clone())
            .collect()
    }

    fn effect_indexes(&self) -> Vec<usize> {
        self.effects
            .lock()
            .unwrap()
            .iter()
            .map(|(_, index)| *index)
            .collect()
    }

    fn find(&self, selector: &str) -> Option<NodeId> {
        let doc = self.doc.lock().unwrap();
        resolve(&doc, &[selector])
    }

    async fn record(&self, effect: String) {
        let index = self.store.load_snapshot().await.play_index;
        self.effects.lock().unwrap().push((effect, index));
    }
}

#[async_trait]
impl Actuator for FakeActuator {
    async fn snapshot(&self) -> Result<PageSnapshot> {
        let doc = self.doc.lock().unwrap();
        Ok(PageSnapshot {
            url: doc.url.clone(),
            title: doc.title.clone(),
            ready_state: "complete".to_string(),
        })
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        Ok(self.find(selector).is_some())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if self.find(selector).is_some() {
            self.record(format!("click {}", selector)).await;
        }
        Ok(())
    }

    async fn set_value(&self, selector: &str, value: &str, _tag_name: &str) -> Result<()> {
        let Some(node) = self.find(selector) else {
            return Ok(());
        };
        self.doc.lock().unwrap().node_mut(node).value = value.to_string();
        self.record(format!("change {} = {}", selector, value)).await;
        Ok(())
    }

    async fn type_text(
        &self,
        selector: &str,
        value: &str,
        is_content_editable: bool,
    ) -> Result<()> {
        let Some(node) = self.find(selector) else {
            return Ok(());
        };
        {
            let mut doc = self.doc.lock().unwrap();
            let element = doc.node_mut(node);
            if is_content_editable {
                element.text = value.to_string();
            } else if matches!(element.input_type(), Some("checkbox") | Some("radio")) {
                element.checked = coerce_checked(value);
            } else {
                element.value = value.to_string();
            }
        }
        self.record(format!("input {} = {}", selector, value)).await;
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
        if self.find(selector).is_some() {
            self.record(format!("key {} {}", selector, key)).await;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.doc.lock().unwrap().url.clone())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.doc.lock().unwrap().url = url.to_string();
        self.record(format!("navigate {}", url)).await;
        Ok(())
    }
}

struct Harness {
    engine: Arc<Engine>,
    source: Arc<FakeEventSource>,
    actuator: Arc<FakeActuator>,
    store: StateStore,
}

/// html > body with a button, a text input and a checkbox.
fn sample_document(url: &str) -> Document {
    let mut doc = Document::new(url, "Fixture");
    let body = doc.append(doc.root(), "body");
    let _button = doc.append(body, "button");
    let _field = doc.append(body, "input");
    let check = doc.append(body, "input");
    doc.set_attr(check, "type", "checkbox");
    doc
}

fn selector_for(doc: &Document, node: NodeId) -> String {
    synthesize(&doc.element_path(node))
}

fn fast_config() -> Config {
    Config {
        element_timeout_ms: 200,
        poll_interval_ms: 20,
        settle_delay_ms: 10,
        ..Config::default()
    }
}

fn harness_with_store(doc: Document, store: StateStore) -> Harness {
    let source = Arc::new(FakeEventSource::new());
    let actuator = Arc::new(FakeActuator::new(doc, store.clone()));
    let engine = Engine::new(
        fast_config(),
        store.clone(),
        Arc::clone(&source) as Arc<dyn EventSource>,
        Arc::clone(&actuator) as Arc<dyn Actuator>,
    );
    Harness {
        engine,
        source,
        actuator,
        store,
    }
}

fn harness(doc: Document) -> Harness {
    harness_with_store(doc, StateStore::new(Arc::new(MemoryStore::new())))
}

async fn wait_for_outcome(rx: &mut broadcast::Receiver<EngineEvent>, want: &str) {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(EngineEvent::PlaybackFinished { outcome }) if outcome == want => break,
                Ok(_) => continue,
                Err(err) => panic!("event feed closed: {}", err),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for outcome {:?}", want));
}

async fn wait_for_recorded_step(rx: &mut broadcast::Receiver<EngineEvent>) -> Step {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(EngineEvent::StepRecorded { step }) => return step,
                Ok(_) => continue,
                Err(err) => panic!("event feed closed: {}", err),
            }
        }
    })
    .await
    .expect("timed out waiting for a recorded step")
}

fn click_event(path: Vec<PathSegment>, ts: i64) -> CapturedEvent {
    CapturedEvent {
        kind: "click".to_string(),
        path,
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

fn delayed(mut step: Step, delay: u64) -> Step {
    step.set_delay(delay);
    step
}

#[tokio::test]
async fn record_save_and_replay_round_trip() {
    let doc = sample_document("https://app.test/");
    let button_path = {
        let body = doc.node(doc.root()).children[0];
        let button = doc.node(body).children[0];
        doc.element_path(button)
    };
    let h = harness(doc);
    let mut events = h.engine.subscribe();

    h.engine.start_recording().await.unwrap();
    assert_eq!(h.engine.mode().await, Mode::Recording);
    assert!(h.source.installed.load(Ordering::SeqCst));

    h.source.emit(click_event(button_path, 1000));
    let recorded = wait_for_recorded_step(&mut events).await;
    assert_eq!(recorded.kind(), "click");

    h.engine.stop_and_save().await.unwrap();
    assert_eq!(h.engine.mode().await, Mode::Idle);
    assert!(!h.source.installed.load(Ordering::SeqCst));

    let flow = h.engine.active_flow().await.expect("flow should be active");
    assert_eq!(flow.len(), 2, "page status seed plus the click");
    assert_eq!(flow.steps[0].kind(), "page_status");
    // Session steps are cleared once the flow is promoted.
    let snap = h.store.load_snapshot().await;
    assert!(!snap.is_recording);
    assert!(snap.session_steps.is_empty());
    assert_eq!(snap.last_flow.len(), 2);

    h.engine.run().await.unwrap();
    wait_for_outcome(&mut events, "completed").await;

    let effects = h.actuator.effects();
    assert_eq!(effects.len(), 1);
    assert!(effects[0].starts_with("click html > body > button"));
    assert!(!h.store.load_snapshot().await.is_playing);
}

#[tokio::test]
async fn missing_elements_are_skipped_not_fatal() {
    let doc = sample_document("https://app.test/");
    let body = doc.node(doc.root()).children[0];
    let button = selector_for(&doc, doc.node(body).children[0]);
    let h = harness(doc);
    let mut events = h.engine.subscribe();

    let steps = vec![
        delayed(Step::click("html > body > nav > a", 0), 50),
        delayed(Step::click(&button, 0), 50),
    ];
    h.engine
        .replace_active_flow(reenact::models::Flow::new(
            steps,
            reenact::models::FlowSource::Recording,
        ))
        .await;

    h.engine.run().await.unwrap();
    wait_for_outcome(&mut events, "completed").await;

    let effects = h.actuator.effects();
    assert_eq!(effects.len(), 1, "only the resolvable step runs");
    assert!(effects[0].starts_with("click"));
}

#[tokio::test]
async fn navigation_exits_the_pass_and_recovery_resumes_at_the_same_index() {
    let doc = sample_document("https://app.test/page1");
    let body = doc.node(doc.root()).children[0];
    let button = selector_for(&doc, doc.node(body).children[0]);
    let field = selector_for(&doc, doc.node(body).children[1]);
    let h = harness(doc);
    let mut events = h.engine.subscribe();

    let steps = vec![
        delayed(Step::click(&button, 0), 50),
        delayed(Step::navigation("https://app.test/page2", "Page 2", 0), 50),
        delayed(Step::input(&field, "hello", "input", false, 0), 50),
    ];
    h.engine
        .replace_active_flow(reenact::models::Flow::new(
            steps,
            reenact::models::FlowSource::Recording,
        ))
        .await;

    h.engine.run().await.unwrap();
    wait_for_outcome(&mut events, "navigating").await;

    // Progress points at the navigation step itself, not past it.
    let snap = h.store.load_snapshot().await;
    assert!(snap.is_playing);
    assert_eq!(snap.play_index, 1);

    // The "page load" after navigation triggers a recovery pass, which finds
    // the location already matching and falls through to the next step.
    let outcome = h.engine.recover().await;
    assert_eq!(outcome, RecoveryOutcome::ResumedPlayback { index: 1 });
    wait_for_outcome(&mut events, "completed").await;

    let effects = h.actuator.effects();
    assert_eq!(
        effects,
        vec![
            format!("click {}", button),
            "navigate https://app.test/page2".to_string(),
            format!("input {} = hello", field),
        ]
    );
    assert!(!h.store.load_snapshot().await.is_playing);
}

#[tokio::test]
async fn run_entry_navigates_first_when_the_flow_starts_elsewhere() {
    let doc = sample_document("https://app.test/start");
    let body = doc.node(doc.root()).children[0];
    let button = selector_for(&doc, doc.node(body).children[0]);
    let h = harness(doc);
    let mut events = h.engine.subscribe();

    let steps = vec![
        delayed(Step::navigation("https://app.test/form", "Form", 0), 50),
        delayed(Step::click(&button, 0), 50),
    ];
    h.engine
        .replace_active_flow(reenact::models::Flow::new(
            steps,
            reenact::models::FlowSource::Recording,
        ))
        .await;

    h.engine.run().await.unwrap();
    assert_eq!(h.engine.mode().await, Mode::NavigatingAway);
    assert_eq!(
        h.actuator.effects(),
        vec!["navigate https://app.test/form".to_string()]
    );

    let outcome = h.engine.recover().await;
    assert_eq!(outcome, RecoveryOutcome::ResumedPlayback { index: 0 });
    wait_for_outcome(&mut events, "completed").await;
    assert_eq!(h.actuator.effects().len(), 2);
}

#[tokio::test]
async fn recording_in_progress_wins_over_a_stale_playback_flag() {
    let doc = sample_document("https://app.test/");
    let store = StateStore::new(Arc::new(MemoryStore::new()));
    let seed = vec![Step::page_status(
        "https://app.test/",
        "Fixture",
        "complete",
        Utc::now().timestamp_millis(),
    )];
    store.begin_recording(&seed).await;
    store.save_progress(&[Step::click("html > body > button", 0)], 0).await;

    let h = harness_with_store(doc, store);
    let outcome = h.engine.recover().await;

    assert_eq!(outcome, RecoveryOutcome::ResumedRecording);
    assert_eq!(h.engine.mode().await, Mode::Recording);
    assert!(h.source.installed.load(Ordering::SeqCst));
    assert!(h.actuator.effects().is_empty(), "no playback effects");

    // The reload shows up in the session as a synthetic navigation step.
    let snap = h.store.load_snapshot().await;
    assert_eq!(snap.session_steps.len(), 2);
    assert_eq!(snap.session_steps[1].kind(), "navigation");
}

#[tokio::test]
async fn the_persisted_index_matches_each_effect() {
    let doc = sample_document("https://app.test/");
    let body = doc.node(doc.root()).children[0];
    let button = selector_for(&doc, doc.node(body).children[0]);
    let field = selector_for(&doc, doc.node(body).children[1]);
    let h = harness(doc);
    let mut events = h.engine.subscribe();

    let steps = vec![
        delayed(Step::click(&button, 0), 50),
        delayed(Step::input(&field, "alpha", "input", false, 0), 50),
        delayed(Step::key(&field, "Enter", 0), 50),
    ];
    h.engine
        .replace_active_flow(reenact::models::Flow::new(
            steps,
            reenact::models::FlowSource::Recording,
        ))
        .await;

    h.engine.run().await.unwrap();
    wait_for_outcome(&mut events, "completed").await;

    assert_eq!(h.actuator.effect_indexes(), vec![0, 1, 2]);
}

#[tokio::test]
async fn commands_no_op_when_their_precondition_is_unmet() {
    let h = harness(sample_document("https://app.test/"));

    // Stop without a recording does nothing.
    h.engine
        .handle_command(Command::RecordStop)
        .await
        .unwrap();
    assert_eq!(h.engine.mode().await, Mode::Idle);

    // Run with no flow is a user-visible rejection.
    let err = h.engine.handle_command(Command::Run).await.unwrap_err();
    assert!(matches!(err, EngineError::EmptyFlow));

    // A bad import leaves the active flow untouched.
    let err = h
        .engine
        .handle_command(Command::Load {
            content: "{\"not\":\"an array\"}".to_string(),
            name: "bad.json".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidImport(_)));
    assert!(h.engine.active_flow().await.is_none());
}

#[tokio::test]
async fn panel_and_enabled_flags_round_trip_through_commands() {
    let h = harness(sample_document("https://app.test/"));

    h.engine.handle_command(Command::ShowPanel).await.unwrap();
    assert!(h.store.load_snapshot().await.panel_visible);
    h.engine.handle_command(Command::HidePanel).await.unwrap();
    assert!(!h.store.load_snapshot().await.panel_visible);

    h.engine.set_enabled(false).await;
    let flow = vec![delayed(Step::click("html > body > button", 0), 50)];
    h.engine
        .replace_active_flow(reenact::models::Flow::new(
            flow,
            reenact::models::FlowSource::Recording,
        ))
        .await;
    // Disabled engines ignore run instead of erroring.
    h.engine.run().await.unwrap();
    assert_eq!(h.engine.mode().await, Mode::Idle);
    assert!(h.actuator.effects().is_empty());
}

#[tokio::test]
async fn everything_still_runs_without_a_store() {
    let doc = sample_document("https://app.test/");
    let button_path = {
        let body = doc.node(doc.root()).children[0];
        doc.element_path(doc.node(body).children[0])
    };
    let h = harness_with_store(doc, StateStore::new(Arc::new(NullStore::default())));
    let mut events = h.engine.subscribe();

    h.engine.start_recording().await.unwrap();
    h.source.emit(click_event(button_path, 5));
    wait_for_recorded_step(&mut events).await;
    h.engine.stop_and_save().await.unwrap();

    h.engine.run().await.unwrap();
    wait_for_outcome(&mut events, "completed").await;
    assert_eq!(h.actuator.effects().len(), 1);

    // Nothing persisted means recovery finds nothing to do.
    assert_eq!(h.engine.recover().await, RecoveryOutcome::Noop);
}

#[tokio::test]
async fn stop_is_silent_when_idle_and_cancels_when_playing() {
    let doc = sample_document("https://app.test/");
    let body = doc.node(doc.root()).children[0];
    let button = selector_for(&doc, doc.node(body).children[0]);
    let h = harness(doc);
    let mut events = h.engine.subscribe();

    // Nothing is playing, so nothing is announced.
    h.engine.stop_playback().await;
    assert_eq!(h.engine.mode().await, Mode::Idle);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    // A long tail delay keeps the pass alive until stop lands.
    h.engine
        .replace_active_flow(reenact::models::Flow::new(
            vec![delayed(Step::click(&button, 0), 10_000)],
            reenact::models::FlowSource::Recording,
        ))
        .await;
    h.engine.run().await.unwrap();
    timeout(Duration::from_secs(5), async {
        while h.actuator.effects().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("the click should run before stop");

    h.engine.stop_playback().await;
    wait_for_outcome(&mut events, "cancelled").await;
    assert_eq!(h.engine.mode().await, Mode::Idle);
    assert!(!h.store.load_snapshot().await.is_playing);
}

#[tokio::test]
async fn schedules_fire_once_and_reject_the_past() {
    let doc = sample_document("https://app.test/");
    let body = doc.node(doc.root()).children[0];
    let button = selector_for(&doc, doc.node(body).children[0]);
    let h = harness(doc);
    let mut events = h.engine.subscribe();

    let past = Utc::now().timestamp_millis() - 1000;
    let err = h.engine.schedule_run(past).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidSchedule));

    h.engine
        .replace_active_flow(reenact::models::Flow::new(
            vec![delayed(Step::click(&button, 0), 50)],
            reenact::models::FlowSource::Recording,
        ))
        .await;

    let soon = Utc::now().timestamp_millis() + 150;
    h.engine.schedule_run(soon).await.unwrap();
    assert!(h.store.load_snapshot().await.scheduled_at.is_some());

    wait_for_outcome(&mut events, "completed").await;
    assert_eq!(h.actuator.effects().len(), 1);
    // The stamp was consumed before the run fired.
    assert!(h.store.load_snapshot().await.scheduled_at.is_none());
}
