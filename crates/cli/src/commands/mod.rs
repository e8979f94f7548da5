pub mod config;
pub mod doctor;
pub mod drill;
pub mod migrate;
pub mod research;

use std::io::Write;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use hiredrill_agent::openai::OpenAiClient;
use hiredrill_agent::{AgentRuntime, TaskRegistry};
use hiredrill_core::config::{AppConfig, LoadOptions};
use hiredrill_core::domain::session::{UserSelection, UserSelectionRequest};
use hiredrill_core::errors::DomainError;
use hiredrill_core::events::StreamEvent;
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

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn async_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

pub(crate) fn agent_runtime(
    config: &AppConfig,
    command: &str,
) -> Result<Arc<AgentRuntime>, CommandResult> {
    let llm = OpenAiClient::from_config(&config.llm).map_err(|error| {
        CommandResult::failure(command, "llm_setup", format!("llm client setup failed: {error}"), 6)
    })?;
    Ok(Arc::new(AgentRuntime::new(Arc::new(llm), Arc::new(TaskRegistry::new()), config)))
}

/// Validates the practice target the same way the API does.
pub fn selection(
    command: &str,
    company: &str,
    role: &str,
    description: Option<&str>,
) -> Result<UserSelection, CommandResult> {
    UserSelectionRequest {
        company_name: company.to_string(),
        role: role.to_string(),
        role_description: description.map(str::to_string),
    }
    .validate()
    .map_err(|error| {
        let message = match error {
            DomainError::InvalidSelection { message, .. } => message,
            other => other.to_string(),
        };
        CommandResult::failure(command, "invalid_input", message, 4)
    })
}

/// Writes each event as one JSON line and maps the terminal event to the command result.
pub async fn write_events<T, S>(
    command: &str,
    mut events: S,
    out: &mut impl Write,
) -> CommandResult
where
    T: Serialize,
    S: Stream<Item = StreamEvent<T>> + Unpin,
{
    while let Some(event) = events.next().await {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(error) => {
                return CommandResult::failure(command, "serialization", error.to_string(), 7);
            }
        };
        if let Err(error) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            return CommandResult::failure(command, "output", error.to_string(), 7);
        }

        match event {
            StreamEvent::Complete { .. } => {
                return CommandResult::success(command, format!("{command} completed"));
            }
            StreamEvent::Error { message } => {
                return CommandResult::failure(command, "pipeline", message, 5);
            }
            StreamEvent::Status { .. } | StreamEvent::Candidate { .. } => {}
        }
    }
    CommandResult::failure(command, "pipeline", "event stream ended without a result", 5)
}
