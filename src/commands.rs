use serde::{Deserialize, Serialize};

/// Inbound command set from external control surfaces. Each maps to one
/// engine entry point and no-ops when its precondition is unmet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    ShowPanel,
    HidePanel,
    Run,
    RecordStart,
    RecordStop,
    Load { content: String, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_a_snake_case_tag() {
        let cmd: Command = serde_json::from_str(r#"{"command":"record_start"}"#).unwrap();
        assert_eq!(cmd, Command::RecordStart);

        let cmd: Command =
            serde_json::from_str(r#"{"command":"load","content":"[]","name":"demo.json"}"#)
                .unwrap();
        assert_eq!(
            cmd,
            Command::Load {
                content: "[]".to_string(),
                name: "demo.json".to_string()
            }
        );
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"command":"reboot"}"#).is_err());
    }
}
