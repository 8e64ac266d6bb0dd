use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

use crate::capture::{EventSource, Recorder};
use crate::commands::Command;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::models::{BulkMode, Flow, FlowSource, SelectionSet, Step};
use crate::playback::{Actuator, PlayOutcome, PlaybackTiming, Player};
use crate::schedule::Scheduler;
use crate::store::StateStore;

/// What the engine is doing right now. One mode at a time; entry points
/// check the mode and no-op rather than interleave.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Idle,
    Recording,
    Playing,
    /// The document is unloading after a navigation step; the next load's
    /// recovery pass re-enters playback.
    NavigatingAway,
}

/// Broadcast to observers; the WebSocket feed relays these to connected
/// control surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RecordingStarted,
    StepRecorded { step: Step },
    RecordingSaved { steps: usize },
    PlaybackStep { index: usize, total: usize, kind: String },
    PlaybackFinished { outcome: String },
    FlowUpdated { steps: usize, source: String },
    ScheduleArmed { at_epoch_ms: i64 },
    ScheduleCancelled,
    PanelVisibility { visible: bool },
    Status { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowSummary {
    pub source: String,
    pub steps: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub mode: Mode,
    pub enabled: bool,
    pub panel_visible: bool,
    pub flow: Option<FlowSummary>,
    pub selection: Vec<usize>,
    pub recording_steps: usize,
    pub scheduled_at: Option<i64>,
}

/// The session context: owns the mode machine, the active flow and its
/// selection, and wires capture, playback, recovery and scheduling together.
pub struct Engine {
    pub(super) config: Config,
    pub(super) store: StateStore,
    pub(super) recorder: Recorder,
    pub(super) player: Player,
    pub(super) actuator: Arc<dyn Actuator>,
    pub(super) scheduler: Scheduler,
    pub(super) mode: Mutex<Mode>,
    pub(super) active_flow: Mutex<Option<Flow>>,
    pub(super) selection: Mutex<SelectionSet>,
    pub(super) enabled: AtomicBool,
    pub(super) panel_visible: AtomicBool,
    pub(super) recovery_lock: Mutex<()>,
    pub(super) event_sender: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub fn new(
        config: Config,
        store: StateStore,
        source: Arc<dyn EventSource>,
        actuator: Arc<dyn Actuator>,
    ) -> Arc<Self> {
        let timing = PlaybackTiming::from(&config);
        let (event_tx, _) = broadcast::channel(256);
        let engine = Arc::new(Self {
            recorder: Recorder::new(source, store.clone()),
            player: Player::new(Arc::clone(&actuator), store.clone(), timing),
            scheduler: Scheduler::new(store.clone()),
            actuator,
            mode: Mutex::new(Mode::Idle),
            active_flow: Mutex::new(None),
            selection: Mutex::new(SelectionSet::new()),
            enabled: AtomicBool::new(true),
            panel_visible: AtomicBool::new(false),
            recovery_lock: Mutex::new(()),
            event_sender: event_tx,
            config,
            store,
        });
        engine.spawn_relays();
        engine
    }

    /// Forward recorder appends and player progress onto the event feed.
    fn spawn_relays(&self) {
        let mut steps = self.recorder.subscribe_steps();
        let events = self.event_sender.clone();
        tokio::spawn(async move {
            loop {
                match steps.recv().await {
                    Ok(step) => {
                        let _ = events.send(EngineEvent::StepRecorded { step });
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut progress = self.player.subscribe_progress();
        let events = self.event_sender.clone();
        tokio::spawn(async move {
            loop {
                match progress.recv().await {
                    Ok(update) => {
                        let _ = events.send(EngineEvent::PlaybackStep {
                            index: update.index,
                            total: update.total,
                            kind: update.kind,
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_sender.subscribe()
    }

    pub(super) fn emit(&self, event: EngineEvent) {
        let _ = self.event_sender.send(event);
    }

    pub async fn mode(&self) -> Mode {
        *self.mode.lock().await
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    // --- command surface -------------------------------------------------

    pub async fn handle_command(self: &Arc<Self>, command: Command) -> Result<()> {
        match command {
            Command::ShowPanel => {
                self.set_panel_visible(true).await;
                Ok(())
            }
            Command::HidePanel => {
                self.set_panel_visible(false).await;
                Ok(())
            }
            Command::Run => self.run().await,
            Command::RecordStart => self.start_recording().await,
            Command::RecordStop => self.stop_and_save().await,
            Command::Load { content, name } => self.load_and_play(&content, &name).await,
        }
    }

    // --- playback ---------------------------------------------------------

    /// Start playback of the active flow from the top. No-op when disabled or
    /// not idle; rejects an empty or missing flow.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        if !self.is_enabled() {
            tracing::info!("Run ignored, engine disabled");
            return Ok(());
        }

        let flow = {
            let mut mode = self.mode.lock().await;
            if *mode != Mode::Idle {
                tracing::info!("Run ignored, engine is {:?}", *mode);
                return Ok(());
            }
            let flow = self
                .active_flow
                .lock()
                .await
                .clone()
                .filter(|f| !f.is_empty())
                .ok_or(EngineError::EmptyFlow)?;
            self.store.save_progress(&flow.steps, 0).await;
            *mode = Mode::Playing;
            flow
        };

        // A leading page-status or navigation step pointing elsewhere means
        // the run begins with a load; recovery re-enters from index 0.
        if let Some(target) = flow.steps.first().and_then(Step::url) {
            if !target.is_empty() {
                let here = self.actuator.current_url().await.unwrap_or_default();
                if here != target {
                    tracing::info!("Run begins with navigation to {}", target);
                    if let Err(err) = self.actuator.navigate(target).await {
                        *self.mode.lock().await = Mode::Idle;
                        self.store.clear_progress().await;
                        return Err(err);
                    }
                    *self.mode.lock().await = Mode::NavigatingAway;
                    return Ok(());
                }
            }
        }

        self.spawn_play(flow, 0, 0);
        Ok(())
    }

    /// Drive one playback pass on a background task and settle the mode from
    /// its outcome.
    pub(super) fn spawn_play(self: &Arc<Self>, flow: Flow, start_index: usize, settle_ms: u64) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if settle_ms > 0 {
                tokio::time::sleep(Duration::from_millis(settle_ms)).await;
            }
            match engine.player.run(&flow, start_index).await {
                Ok(PlayOutcome::Navigating) => {
                    *engine.mode.lock().await = Mode::NavigatingAway;
                    engine.emit(EngineEvent::PlaybackFinished {
                        outcome: "navigating".to_string(),
                    });
                }
                Ok(PlayOutcome::Completed) => {
                    *engine.mode.lock().await = Mode::Idle;
                    engine.emit(EngineEvent::PlaybackFinished {
                        outcome: "completed".to_string(),
                    });
                }
                Ok(PlayOutcome::Cancelled) => {
                    *engine.mode.lock().await = Mode::Idle;
                    engine.emit(EngineEvent::PlaybackFinished {
                        outcome: "cancelled".to_string(),
                    });
                }
                Err(err) => {
                    tracing::error!("Playback failed: {}", err);
                    *engine.mode.lock().await = Mode::Idle;
                    engine.store.clear_progress().await;
                    engine.emit(EngineEvent::Status {
                        message: format!("Playback failed: {}", err),
                    });
                }
            }
        });
    }

    /// Cancel playback, clear persisted progress, and disarm any pending
    /// scheduled run.
    pub async fn stop_playback(&self) {
        // A pending scheduled run is disarmed regardless of mode.
        self.scheduler.cancel().await;
        {
            let mut mode = self.mode.lock().await;
            if !matches!(*mode, Mode::Playing | Mode::NavigatingAway) {
                tracing::debug!("Stop ignored, engine is {:?}", *mode);
                return;
            }
            *mode = Mode::Idle;
        }
        self.player.stop();
        self.store.clear_progress().await;
        self.emit(EngineEvent::PlaybackFinished {
            outcome: "cancelled".to_string(),
        });
    }

    // --- recording --------------------------------------------------------

    /// Begin a recording session seeded with the current page status. No-op
    /// unless idle.
    pub async fn start_recording(&self) -> Result<()> {
        let mut mode = self.mode.lock().await;
        if *mode != Mode::Idle {
            tracing::info!("Record start ignored, engine is {:?}", *mode);
            return Ok(());
        }
        let page = self.actuator.snapshot().await?;
        let status = Step::page_status(
            &page.url,
            &page.title,
            &page.ready_state,
            Utc::now().timestamp_millis(),
        );
        self.recorder.start(status).await?;
        *mode = Mode::Recording;
        drop(mode);
        self.emit(EngineEvent::RecordingStarted);
        Ok(())
    }

    /// Stop recording and promote the session flow to the active slot. No-op
    /// unless recording; an empty session surfaces `EmptyFlow`.
    pub async fn stop_and_save(&self) -> Result<()> {
        {
            let mut mode = self.mode.lock().await;
            if *mode != Mode::Recording {
                tracing::info!("Record stop ignored, engine is {:?}", *mode);
                return Ok(());
            }
            *mode = Mode::Idle;
        }
        let flow = self.recorder.stop().await?;
        let steps = flow.len();
        self.replace_active_flow(flow).await;
        self.emit(EngineEvent::RecordingSaved { steps });
        Ok(())
    }

    // --- flow management --------------------------------------------------

    /// Import an interchange document, make it the active flow, and run it.
    /// Import failure leaves engine state unchanged.
    pub async fn load_and_play(self: &Arc<Self>, content: &str, name: &str) -> Result<()> {
        if *self.mode.lock().await != Mode::Idle {
            tracing::info!("Load ignored, engine busy");
            return Ok(());
        }
        let steps = Flow::import_json(content)?;
        self.replace_active_flow(Flow::new(steps, FlowSource::File(name.to_string())))
            .await;
        self.run().await
    }

    /// Swap in a new active flow, persist it, and reset the selection.
    pub async fn replace_active_flow(&self, flow: Flow) {
        self.store
            .save_active_flow(&flow.steps, flow.source.label())
            .await;
        self.selection.lock().await.clear();
        let summary = EngineEvent::FlowUpdated {
            steps: flow.len(),
            source: flow.source.label().to_string(),
        };
        *self.active_flow.lock().await = Some(flow);
        self.emit(summary);
    }

    pub async fn active_flow(&self) -> Option<Flow> {
        self.active_flow.lock().await.clone()
    }

    /// Serialize the active flow, falling back to the in-progress recording.
    pub async fn export(&self) -> Result<String> {
        if let Some(flow) = self.active_flow.lock().await.as_ref() {
            if !flow.is_empty() {
                return flow.export_json();
            }
        }
        let steps = self.recorder.session_steps().await;
        if steps.is_empty() {
            return Err(EngineError::EmptyFlow);
        }
        Flow::new(steps, FlowSource::Recording).export_json()
    }

    // --- flags ------------------------------------------------------------

    pub async fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.store.set_enabled(enabled).await;
        self.emit(EngineEvent::Status {
            message: if enabled {
                "enabled".to_string()
            } else {
                "disabled".to_string()
            },
        });
    }

    pub async fn set_panel_visible(&self, visible: bool) {
        self.panel_visible.store(visible, Ordering::SeqCst);
        self.store.set_panel_visible(visible).await;
        self.emit(EngineEvent::PanelVisibility { visible });
    }

    // --- selection --------------------------------------------------------

    pub async fn toggle_selection(&self, index: usize, checked: bool) -> Vec<usize> {
        let mut selection = self.selection.lock().await;
        selection.toggle(index, checked);
        selection.sorted()
    }

    pub async fn extend_selection(&self, index: usize, checked: bool) -> Vec<usize> {
        let mut selection = self.selection.lock().await;
        selection.range(index, checked);
        selection.sorted()
    }

    pub async fn select_all(&self) -> Vec<usize> {
        let len = self
            .active_flow
            .lock()
            .await
            .as_ref()
            .map(Flow::len)
            .unwrap_or(0);
        let mut selection = self.selection.lock().await;
        selection.select_all(len);
        selection.sorted()
    }

    pub async fn clear_selection(&self) -> Vec<usize> {
        let mut selection = self.selection.lock().await;
        selection.clear();
        selection.sorted()
    }

    // --- flow editing -----------------------------------------------------

    pub async fn set_value(&self, index: usize, value: &str) {
        self.edit_flow(|flow, _| flow.set_value(index, value)).await;
    }

    pub async fn nudge_delay(&self, anchor: usize, delta: i64) {
        self.edit_flow(|flow, selection| flow.nudge_delay(anchor, delta, selection))
            .await;
    }

    pub async fn set_delay(&self, anchor: usize, value: u64) {
        self.edit_flow(|flow, selection| flow.set_delay(anchor, value, selection))
            .await;
    }

    pub async fn bulk_delay(&self, mode: BulkMode, value: u64) {
        self.edit_flow(|flow, selection| flow.bulk_delay(mode, value, selection))
            .await;
    }

    /// Apply one mutation to the active flow and persist the result. No-op
    /// when no flow is loaded.
    async fn edit_flow<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Flow, &SelectionSet),
    {
        let selection = self.selection.lock().await;
        let mut guard = self.active_flow.lock().await;
        let Some(flow) = guard.as_mut() else {
            return;
        };
        mutate(flow, &selection);
        self.store
            .save_active_flow(&flow.steps, flow.source.label())
            .await;
        let event = EngineEvent::FlowUpdated {
            steps: flow.len(),
            source: flow.source.label().to_string(),
        };
        drop(guard);
        drop(selection);
        self.emit(event);
    }

    // --- scheduling -------------------------------------------------------

    /// Arm a one-shot run at `at_epoch_ms`; replaces any pending schedule.
    pub async fn schedule_run(self: &Arc<Self>, at_epoch_ms: i64) -> Result<()> {
        self.scheduler
            .arm(Arc::downgrade(self), at_epoch_ms)
            .await?;
        self.emit(EngineEvent::ScheduleArmed { at_epoch_ms });
        Ok(())
    }

    pub async fn cancel_schedule(&self) {
        self.scheduler.cancel().await;
        self.emit(EngineEvent::ScheduleCancelled);
    }

    // --- status -----------------------------------------------------------

    pub async fn status(&self) -> StatusSnapshot {
        let flow = self
            .active_flow
            .lock()
            .await
            .as_ref()
            .map(|f| FlowSummary {
                source: f.source.label().to_string(),
                steps: f.len(),
            });
        let selection = self.selection.lock().await.sorted();
        let scheduled_at = self.store.load_snapshot().await.scheduled_at;
        StatusSnapshot {
            mode: *self.mode.lock().await,
            enabled: self.is_enabled(),
            panel_visible: self.panel_visible.load(Ordering::SeqCst),
            flow,
            selection,
            recording_steps: self.recorder.step_count().await,
            scheduled_at,
        }
    }
}
