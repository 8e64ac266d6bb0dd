use serde::{Deserialize, Serialize};

/// Replay pacing floor. Delays below this are bumped up for stability.
pub const MIN_DELAY_MS: u64 = 50;
/// Delay assigned to the last step of a flow, and to pairs with missing timestamps.
pub const FALLBACK_DELAY_MS: u64 = 1000;
/// Pacing used at replay time when a step carries no delay at all.
pub const DEFAULT_DELAY_MS: u64 = 100;

/// Non-printable keys worth recording. Everything else is dropped at capture.
pub const ALLOWED_KEYS: [&str; 7] = [
    "Enter",
    "Tab",
    "Escape",
    "ArrowUp",
    "ArrowDown",
    "ArrowLeft",
    "ArrowRight",
];

pub fn is_allowed_key(key: &str) -> bool {
    ALLOWED_KEYS.contains(&key)
}

/// Truthy coercion for recorded checkbox/radio values.
pub fn coerce_checked(value: &str) -> bool {
    matches!(value, "true" | "1")
}

/// One recorded interaction or navigation event.
///
/// Selectors are always locator strings, never element handles: elements do
/// not survive serialization and must be re-resolved at replay time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Informational snapshot taken at capture start. Never replayed.
    PageStatus {
        #[serde(default)]
        url: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        ready_state: String,
        #[serde(default)]
        timestamp: i64,
    },
    /// Replayed by navigating when the current location differs.
    Navigation {
        #[serde(default)]
        url: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay: Option<u64>,
    },
    Click {
        #[serde(default)]
        selector: String,
        #[serde(default)]
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay: Option<u64>,
    },
    /// Full-value commit, e.g. a select element choice.
    Change {
        #[serde(default)]
        selector: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        tag_name: String,
        #[serde(default)]
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay: Option<u64>,
    },
    /// Incremental value event. For content-editable targets `value` is the
    /// text content, otherwise the control value.
    Input {
        #[serde(default)]
        selector: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        tag_name: String,
        #[serde(default)]
        is_content_editable: bool,
        #[serde(default)]
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay: Option<u64>,
    },
    Key {
        #[serde(default)]
        selector: String,
        #[serde(default)]
        key: String,
        #[serde(default)]
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay: Option<u64>,
    },
}

impl Step {
    pub fn page_status(url: &str, title: &str, ready_state: &str, timestamp: i64) -> Self {
        Step::PageStatus {
            url: url.to_string(),
            title: title.to_string(),
            ready_state: ready_state.to_string(),
            timestamp,
        }
    }

    pub fn navigation(url: &str, title: &str, timestamp: i64) -> Self {
        Step::Navigation {
            url: url.to_string(),
            title: title.to_string(),
            timestamp,
            delay: None,
        }
    }

    pub fn click(selector: &str, timestamp: i64) -> Self {
        Step::Click {
            selector: selector.to_string(),
            timestamp,
            delay: None,
        }
    }

    pub fn change(selector: &str, value: &str, tag_name: &str, timestamp: i64) -> Self {
        Step::Change {
            selector: selector.to_string(),
            value: value.to_string(),
            tag_name: tag_name.to_string(),
            timestamp,
            delay: None,
        }
    }

    pub fn input(
        selector: &str,
        value: &str,
        tag_name: &str,
        is_content_editable: bool,
        timestamp: i64,
    ) -> Self {
        Step::Input {
            selector: selector.to_string(),
            value: value.to_string(),
            tag_name: tag_name.to_string(),
            is_content_editable,
            timestamp,
            delay: None,
        }
    }

    pub fn key(selector: &str, key: &str, timestamp: i64) -> Self {
        Step::Key {
            selector: selector.to_string(),
            key: key.to_string(),
            timestamp,
            delay: None,
        }
    }

    /// The locator string, for interaction steps.
    pub fn selector(&self) -> Option<&str> {
        match self {
            Step::Click { selector, .. }
            | Step::Change { selector, .. }
            | Step::Input { selector, .. }
            | Step::Key { selector, .. } => Some(selector),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Step::PageStatus { url, .. } | Step::Navigation { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Step::PageStatus { timestamp, .. }
            | Step::Navigation { timestamp, .. }
            | Step::Click { timestamp, .. }
            | Step::Change { timestamp, .. }
            | Step::Input { timestamp, .. }
            | Step::Key { timestamp, .. } => *timestamp,
        }
    }

    pub fn delay(&self) -> Option<u64> {
        match self {
            Step::PageStatus { .. } => None,
            Step::Navigation { delay, .. }
            | Step::Click { delay, .. }
            | Step::Change { delay, .. }
            | Step::Input { delay, .. }
            | Step::Key { delay, .. } => *delay,
        }
    }

    /// Delay with the replay-time default applied.
    pub fn effective_delay(&self) -> u64 {
        self.delay().unwrap_or(DEFAULT_DELAY_MS)
    }

    pub fn set_delay(&mut self, value: u64) {
        match self {
            Step::PageStatus { .. } => {}
            Step::Navigation { delay, .. }
            | Step::Click { delay, .. }
            | Step::Change { delay, .. }
            | Step::Input { delay, .. }
            | Step::Key { delay, .. } => *delay = Some(value),
        }
    }

    pub fn set_value(&mut self, new_value: &str) {
        match self {
            Step::Change { value, .. } | Step::Input { value, .. } => {
                *value = new_value.to_string();
            }
            _ => {}
        }
    }

    /// Whether replay should resolve an element for this step.
    pub fn is_interaction(&self) -> bool {
        !matches!(self, Step::PageStatus { .. } | Step::Navigation { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Step::PageStatus { .. } => "page_status",
            Step::Navigation { .. } => "navigation",
            Step::Click { .. } => "click",
            Step::Change { .. } => "change",
            Step::Input { .. } => "input",
            Step::Key { .. } => "key",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serialization_uses_snake_case() {
        let step = Step::click("div > button:nth-of-type(2)", 1700000000000);
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "click");
        assert_eq!(json["selector"], "div > button:nth-of-type(2)");
        assert!(json.get("delay").is_none(), "unset delay is not serialized");
    }

    #[test]
    fn partial_objects_deserialize_with_defaults() {
        let step: Step = serde_json::from_str(r#"{"type":"input"}"#).unwrap();
        match step {
            Step::Input {
                selector,
                value,
                is_content_editable,
                delay,
                ..
            } => {
                assert_eq!(selector, "");
                assert_eq!(value, "");
                assert!(!is_content_editable);
                assert_eq!(delay, None);
            }
            other => panic!("expected input step, got {:?}", other),
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let res = serde_json::from_str::<Step>(r#"{"type":"scroll"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn key_allow_list() {
        assert!(is_allowed_key("Enter"));
        assert!(is_allowed_key("ArrowLeft"));
        assert!(!is_allowed_key("a"));
        assert!(!is_allowed_key("Backspace"));
    }

    #[test]
    fn checked_coercion() {
        assert!(coerce_checked("true"));
        assert!(coerce_checked("1"));
        assert!(!coerce_checked("false"));
        assert!(!coerce_checked(""));
    }
}
