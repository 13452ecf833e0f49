//! Operator commands and the JSON outcome envelope they print.
//!
//! Every command resolves to a `CommandResult`: a process exit code plus one
//! line of JSON on stdout, so wrapper scripts can branch on `status` and
//! `error_class` without scraping prose.

pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::CommandResult;

    #[test]
    fn success_envelope_carries_no_error_class() {
        let result = CommandResult::success("seed", "demo dataset loaded");
        assert_eq!(result.exit_code, 0);

        let payload: serde_json::Value =
            serde_json::from_str(&result.output).expect("envelope is valid JSON");
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["error_class"], serde_json::Value::Null);
        assert_eq!(payload["message"], "demo dataset loaded");
    }

    #[test]
    fn failure_envelope_names_the_class_and_keeps_the_exit_code() {
        let result = CommandResult::failure("migrate", "db_connectivity", "no such host", 4);
        assert_eq!(result.exit_code, 4);

        let payload: serde_json::Value =
            serde_json::from_str(&result.output).expect("envelope is valid JSON");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "db_connectivity");
    }
}
