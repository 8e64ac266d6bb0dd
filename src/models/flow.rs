use serde::{Deserialize, Serialize};

use super::selection::SelectionSet;
use super::step::{Step, DEFAULT_DELAY_MS, FALLBACK_DELAY_MS, MIN_DELAY_MS};
use crate::error::{EngineError, Result};

/// Where the active flow came from. Display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowSource {
    Recording,
    File(String),
    RunningAutomation,
}

impl FlowSource {
    pub fn label(&self) -> &str {
        match self {
            FlowSource::Recording => "recording",
            FlowSource::File(name) => name,
            FlowSource::RunningAutomation => "running_automation",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "recording" => FlowSource::Recording,
            "running_automation" => FlowSource::RunningAutomation,
            other => FlowSource::File(other.to_string()),
        }
    }
}

/// An ordered sequence of steps forming one automation sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub steps: Vec<Step>,
    pub source: FlowSource,
}

/// Bulk toolbar delay operation over a selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkMode {
    Set,
    Add,
    Subtract,
}

impl Flow {
    pub fn new(steps: Vec<Step>, source: FlowSource) -> Self {
        Self { steps, source }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Derive per-step delays from capture timestamps.
    ///
    /// Step i's delay is the pause after executing step i, taken from the gap
    /// to step i+1 and floored at the minimum. The last step gets the fixed
    /// fallback, not the floor.
    pub fn derive_delays(steps: &mut [Step]) {
        if steps.is_empty() {
            return;
        }
        for i in 0..steps.len() - 1 {
            let curr = steps[i].timestamp();
            let next = steps[i + 1].timestamp();
            // A non-negative gap is real pacing, even from a zero epoch; an
            // absent pair (both zero) or a backwards clock falls back.
            let delay = if next >= curr && !(curr == 0 && next == 0) {
                ((next - curr) as u64).max(MIN_DELAY_MS)
            } else {
                FALLBACK_DELAY_MS
            };
            steps[i].set_delay(delay);
        }
        let last = steps.len() - 1;
        steps[last].set_delay(FALLBACK_DELAY_MS);
    }

    /// Serialize to the interchange format: a pretty-printed JSON array of steps.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.steps)
            .map_err(|e| EngineError::InvalidImport(e.to_string()))
    }

    /// Parse an interchange document. Any JSON array is accepted; missing step
    /// fields default, but a non-array document or unknown step tag is rejected.
    pub fn import_json(text: &str) -> Result<Vec<Step>> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| EngineError::InvalidImport(e.to_string()))?;
        if !value.is_array() {
            return Err(EngineError::InvalidImport(
                "expected a JSON array of steps".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| EngineError::InvalidImport(e.to_string()))
    }

    /// Replace the value of a change/input step. No-op for other variants or
    /// out-of-range indices.
    pub fn set_value(&mut self, index: usize, value: &str) {
        if let Some(step) = self.steps.get_mut(index) {
            step.set_value(value);
        }
    }

    fn delay_for_edit(step: &Step) -> u64 {
        step.delay().unwrap_or(DEFAULT_DELAY_MS)
    }

    /// Increment-control edit: shift the anchor's delay by `delta`, and when
    /// the anchor sits in a multi-element selection, propagate the same delta
    /// to every other selected step. Relative spacing is preserved.
    pub fn nudge_delay(&mut self, anchor: usize, delta: i64, selection: &SelectionSet) {
        if anchor >= self.steps.len() {
            return;
        }
        let apply = |step: &mut Step| {
            let current = Self::delay_for_edit(step) as i64;
            step.set_delay((current + delta).max(MIN_DELAY_MS as i64) as u64);
        };
        apply(&mut self.steps[anchor]);

        if selection.contains(anchor) && selection.len() > 1 {
            for idx in selection.iter() {
                if idx != anchor {
                    if let Some(step) = self.steps.get_mut(idx) {
                        apply(step);
                    }
                }
            }
        }
    }

    /// Direct edit: set the anchor's delay to an absolute value (clamped to
    /// the minimum). A multi-element selection containing the anchor gets the
    /// same absolute value on every selected step.
    pub fn set_delay(&mut self, anchor: usize, value: u64, selection: &SelectionSet) {
        if anchor >= self.steps.len() {
            return;
        }
        let value = value.max(MIN_DELAY_MS);
        if selection.contains(anchor) && selection.len() > 1 {
            for idx in selection.iter() {
                if let Some(step) = self.steps.get_mut(idx) {
                    step.set_delay(value);
                }
            }
        }
        self.steps[anchor].set_delay(value);
    }

    /// Bulk toolbar edit over the whole selection. No-op when nothing is
    /// selected.
    pub fn bulk_delay(&mut self, mode: BulkMode, value: u64, selection: &SelectionSet) {
        if selection.is_empty() {
            return;
        }
        for idx in selection.iter() {
            if let Some(step) = self.steps.get_mut(idx) {
                let current = Self::delay_for_edit(step);
                let new = match mode {
                    BulkMode::Set => value.max(MIN_DELAY_MS),
                    BulkMode::Add => current + value,
                    BulkMode::Subtract => current.saturating_sub(value).max(MIN_DELAY_MS),
                };
                step.set_delay(new);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed_clicks(timestamps: &[i64]) -> Vec<Step> {
        timestamps
            .iter()
            .map(|ts| Step::click("div > button", *ts))
            .collect()
    }

    fn delays(steps: &[Step]) -> Vec<Option<u64>> {
        steps.iter().map(|s| s.delay()).collect()
    }

    #[test]
    fn delays_derive_from_timestamp_gaps() {
        let mut steps = timed_clicks(&[1000, 1100, 1260]);
        Flow::derive_delays(&mut steps);
        assert_eq!(delays(&steps), vec![Some(100), Some(160), Some(1000)]);
    }

    #[test]
    fn delays_floor_at_minimum() {
        let mut steps = timed_clicks(&[1000, 1010]);
        Flow::derive_delays(&mut steps);
        assert_eq!(delays(&steps), vec![Some(50), Some(1000)]);
    }

    #[test]
    fn zero_epoch_still_yields_gaps() {
        let mut steps = timed_clicks(&[0, 100, 260]);
        Flow::derive_delays(&mut steps);
        assert_eq!(delays(&steps), vec![Some(100), Some(160), Some(1000)]);
    }

    #[test]
    fn missing_timestamp_pairs_fall_back() {
        let mut steps = timed_clicks(&[0, 0, 2100]);
        Flow::derive_delays(&mut steps);
        assert_eq!(delays(&steps), vec![Some(1000), Some(2100), Some(1000)]);
    }

    #[test]
    fn nudge_propagates_delta_across_selection() {
        let mut flow = Flow::new(timed_clicks(&[0, 0, 0]), FlowSource::Recording);
        flow.steps[0].set_delay(80);
        flow.steps[1].set_delay(120);
        flow.steps[2].set_delay(200);

        let mut selection = SelectionSet::new();
        selection.toggle(0, true);
        selection.toggle(1, true);
        selection.toggle(2, true);

        flow.nudge_delay(1, 30, &selection);
        assert_eq!(
            delays(&flow.steps),
            vec![Some(110), Some(150), Some(230)],
            "nudge preserves relative spacing"
        );
    }

    #[test]
    fn direct_edit_sets_absolute_value_across_selection() {
        let mut flow = Flow::new(timed_clicks(&[0, 0, 0]), FlowSource::Recording);
        flow.steps[0].set_delay(80);
        flow.steps[1].set_delay(120);
        flow.steps[2].set_delay(200);

        let mut selection = SelectionSet::new();
        selection.toggle(0, true);
        selection.toggle(1, true);
        selection.toggle(2, true);

        flow.set_delay(1, 100, &selection);
        assert_eq!(delays(&flow.steps), vec![Some(100), Some(100), Some(100)]);
    }

    #[test]
    fn direct_edit_clamps_to_minimum() {
        let mut flow = Flow::new(timed_clicks(&[0]), FlowSource::Recording);
        flow.set_delay(0, 10, &SelectionSet::new());
        assert_eq!(flow.steps[0].delay(), Some(50));
    }

    #[test]
    fn nudge_outside_selection_touches_only_anchor() {
        let mut flow = Flow::new(timed_clicks(&[0, 0]), FlowSource::Recording);
        flow.steps[0].set_delay(100);
        flow.steps[1].set_delay(100);

        let mut selection = SelectionSet::new();
        selection.toggle(1, true);

        flow.nudge_delay(0, -10, &selection);
        assert_eq!(delays(&flow.steps), vec![Some(90), Some(100)]);
    }

    #[test]
    fn bulk_modes() {
        let mut flow = Flow::new(timed_clicks(&[0, 0]), FlowSource::Recording);
        flow.steps[0].set_delay(100);
        flow.steps[1].set_delay(300);

        let mut selection = SelectionSet::new();
        selection.toggle(0, true);
        selection.toggle(1, true);

        flow.bulk_delay(BulkMode::Add, 50, &selection);
        assert_eq!(delays(&flow.steps), vec![Some(150), Some(350)]);

        flow.bulk_delay(BulkMode::Subtract, 200, &selection);
        assert_eq!(delays(&flow.steps), vec![Some(50), Some(150)]);

        flow.bulk_delay(BulkMode::Set, 30, &selection);
        assert_eq!(delays(&flow.steps), vec![Some(50), Some(50)]);
    }

    #[test]
    fn bulk_with_empty_selection_is_noop() {
        let mut flow = Flow::new(timed_clicks(&[0]), FlowSource::Recording);
        flow.steps[0].set_delay(100);
        flow.bulk_delay(BulkMode::Set, 500, &SelectionSet::new());
        assert_eq!(flow.steps[0].delay(), Some(100));
    }

    #[test]
    fn unset_delay_edits_start_from_default() {
        let mut flow = Flow::new(timed_clicks(&[0]), FlowSource::Recording);
        flow.nudge_delay(0, 10, &SelectionSet::new());
        assert_eq!(flow.steps[0].delay(), Some(110));
    }

    #[test]
    fn export_import_round_trip() {
        let mut steps = vec![
            Step::page_status("https://example.com/a", "A", "complete", 1000),
            Step::navigation("https://example.com/b", "B", 2000),
            Step::change("form > select", "eu", "select", 3000),
        ];
        Flow::derive_delays(&mut steps);
        let flow = Flow::new(steps, FlowSource::Recording);

        let json = flow.export_json().unwrap();
        let imported = Flow::import_json(&json).unwrap();
        assert_eq!(imported, flow.steps);
    }

    #[test]
    fn import_accepts_partial_objects() {
        let steps =
            Flow::import_json(r#"[{"type":"click","selector":"div > a"},{"type":"key"}]"#).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].selector(), Some("div > a"));
        assert_eq!(steps[1].delay(), None);
    }

    #[test]
    fn import_rejects_non_array() {
        assert!(matches!(
            Flow::import_json(r#"{"type":"click"}"#),
            Err(EngineError::InvalidImport(_))
        ));
        assert!(matches!(
            Flow::import_json("not json"),
            Err(EngineError::InvalidImport(_))
        ));
    }

    #[test]
    fn import_rejects_unknown_tag() {
        assert!(matches!(
            Flow::import_json(r#"[{"type":"hover","selector":"a"}]"#),
            Err(EngineError::InvalidImport(_))
        ));
    }

    #[test]
    fn value_edit_only_touches_value_steps() {
        let mut flow = Flow::new(
            vec![
                Step::click("a", 0),
                Step::input("b", "old", "input", false, 0),
            ],
            FlowSource::Recording,
        );
        flow.set_value(0, "ignored");
        flow.set_value(1, "new");
        flow.set_value(9, "out of range");
        match &flow.steps[1] {
            Step::Input { value, .. } => assert_eq!(value, "new"),
            other => panic!("unexpected step {:?}", other),
        }
    }
}
