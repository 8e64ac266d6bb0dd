use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::engine::{Engine, EngineEvent, Mode};
use crate::models::{Flow, FlowSource, Step};

/// What a recovery pass decided to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryOutcome {
    ResumedRecording,
    ResumedPlayback { index: usize },
    RestoredFlow,
    Noop,
}

impl Engine {
    /// Reconcile persisted state with a freshly loaded document. Invoked at
    /// process start and after every main-document load.
    ///
    /// Decision order is load-bearing: a recording-in-progress wins over a
    /// stale playback flag, and playback resumption never fires while
    /// recording is active. Passes are serialized by a lock, and a pass is a
    /// no-op while a play loop is running in-process (mid-flow loads caused
    /// by clicks must not spawn a second player).
    pub async fn recover(self: &Arc<Self>) -> RecoveryOutcome {
        let _guard = self.recovery_lock.lock().await;

        if self.player.is_active() {
            tracing::debug!("Recovery skipped, playback active in-process");
            return RecoveryOutcome::Noop;
        }

        let snapshot = self.store.load_snapshot().await;
        self.enabled.store(snapshot.enabled, Ordering::SeqCst);
        self.panel_visible
            .store(snapshot.panel_visible, Ordering::SeqCst);
        self.scheduler
            .rearm(Arc::downgrade(self), snapshot.scheduled_at)
            .await;

        if snapshot.is_recording {
            let page = match self.actuator.snapshot().await {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!("Recovery could not read the page: {}", err);
                    return RecoveryOutcome::Noop;
                }
            };
            // The reload itself is a recordable navigation event.
            let navigation =
                Step::navigation(&page.url, &page.title, Utc::now().timestamp_millis());

            if self.recorder.is_recording().await {
                // Same-process reload: the pipeline is still armed.
                self.recorder.append_navigation(navigation).await;
            } else if let Err(err) = self
                .recorder
                .resume(snapshot.session_steps, navigation)
                .await
            {
                tracing::warn!("Could not resume recording: {}", err);
                return RecoveryOutcome::Noop;
            }

            *self.mode.lock().await = Mode::Recording;
            tracing::info!("Recording resumed after document load");
            self.emit(EngineEvent::Status {
                message: "recording resumed".to_string(),
            });
            return RecoveryOutcome::ResumedRecording;
        }

        if snapshot.enabled && snapshot.is_playing && !snapshot.play_flow.is_empty() {
            let flow = Flow::new(snapshot.play_flow, FlowSource::RunningAutomation);
            let index = snapshot.play_index.min(flow.len().saturating_sub(1));
            *self.active_flow.lock().await = Some(flow.clone());
            self.selection.lock().await.clear();
            *self.mode.lock().await = Mode::Playing;

            tracing::info!("Resuming playback at step {}", index);
            // Settle delay gives client-side rehydration a moment to finish.
            self.spawn_play(flow, index, self.config.settle_delay_ms);
            return RecoveryOutcome::ResumedPlayback { index };
        }

        if !snapshot.last_flow.is_empty() {
            let source = snapshot
                .last_source
                .as_deref()
                .map(FlowSource::from_label)
                .unwrap_or(FlowSource::Recording);
            let flow = Flow::new(snapshot.last_flow, source);
            let event = EngineEvent::FlowUpdated {
                steps: flow.len(),
                source: flow.source.label().to_string(),
            };
            *self.active_flow.lock().await = Some(flow);
            self.selection.lock().await.clear();
            self.emit(event);
            tracing::debug!("Restored last saved flow");
            return RecoveryOutcome::RestoredFlow;
        }

        RecoveryOutcome::Noop
    }
}
