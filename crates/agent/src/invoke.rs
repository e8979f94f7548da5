//! The single chokepoint every agent call goes through.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::guardrails::{Direction, GuardrailDecision, GuardrailEngine};
use crate::llm::{Cancellable, LlmClient, LlmError};
use crate::registry::TaskRegistry;
use crate::spec::AgentSpec;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("input guardrail tripped for {agent}: {reason}")]
    InputTripwire { agent: String, reason: String },
    #[error("output guardrail tripped for {agent}: {reason}")]
    OutputTripwire { agent: String, reason: String },
    #[error("{agent} timed out after {after:?}")]
    Timeout { agent: String, after: Duration },
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("{agent} produced output that could not be decoded: {message}")]
    Decode { agent: String, message: String },
}

impl AgentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The guardrail direction if this is a tripwire.
    pub fn tripwire(&self) -> Option<Direction> {
        match self {
            Self::InputTripwire { .. } => Some(Direction::Input),
            Self::OutputTripwire { .. } => Some(Direction::Output),
            _ => None,
        }
    }
}

/// Removes the handle from the registry however the invocation ends, including when the
/// caller drops the future.
struct Registration<'a> {
    registry: &'a TaskRegistry,
    correlation_id: &'a str,
    handle_id: Uuid,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.correlation_id, self.handle_id);
    }
}

pub struct AgentInvoker {
    llm: Arc<dyn LlmClient>,
    registry: Arc<TaskRegistry>,
    guardrails: GuardrailEngine,
}

impl AgentInvoker {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<TaskRegistry>,
        guardrails: GuardrailEngine,
    ) -> Self {
        Self { llm, registry, guardrails }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Runs `spec` over `input` and decodes its final output. `Ok(None)` means the agent
    /// finished without producing anything.
    pub async fn run<T: DeserializeOwned>(
        &self,
        spec: &AgentSpec,
        input: &str,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<Option<T>, AgentError> {
        let Some(output) = self.run_raw(spec, input, correlation_id, timeout).await? else {
            return Ok(None);
        };
        serde_json::from_value(output).map(Some).map_err(|error| AgentError::Decode {
            agent: spec.name().to_string(),
            message: error.to_string(),
        })
    }

    /// Checks the input before the model sees it, then drains the run. A run whose correlation id
    /// is cancelled (before or during the call) yields `Ok(None)` rather than an error.
    pub async fn run_raw(
        &self,
        spec: &AgentSpec,
        input: &str,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<Option<Value>, AgentError> {
        let invocation = async {
            if self.registry.is_cancelled(correlation_id) {
                return Ok(None);
            }
            if spec.guardrails().input {
                self.guard(spec, input, Direction::Input).await?;
            }

            let mut stream = self.llm.run_streamed(spec, input);
            let handle = stream.handle();
            let registered: Arc<dyn Cancellable> = handle.clone();
            if !self.registry.register(correlation_id, registered) {
                return Ok(None);
            }
            let _registration = Registration {
                registry: &self.registry,
                correlation_id,
                handle_id: handle.handle_id(),
            };

            let output = match stream.final_output().await {
                Ok(output) => output,
                Err(LlmError::Cancelled) => {
                    tracing::debug!(
                        event_name = "agent.invoke.cancelled",
                        correlation_id = %correlation_id,
                        agent = spec.name(),
                        "agent run cancelled"
                    );
                    return Ok(None);
                }
                Err(error) => return Err(AgentError::Llm(error)),
            };
            if spec.guardrails().output {
                if let Some(output) = &output {
                    self.guard(spec, &output_text(output), Direction::Output).await?;
                }
            }
            Ok::<_, AgentError>(output)
        };

        // Dropping the invocation drops its stream, which cancels an unfinished run.
        match tokio::time::timeout(timeout, invocation).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(error)) => {
                tracing::debug!(
                    event_name = "agent.invoke.failed",
                    correlation_id = %correlation_id,
                    agent = spec.name(),
                    error = %error,
                    "agent invocation failed"
                );
                Err(error)
            }
            Err(_) => {
                tracing::warn!(
                    event_name = "agent.invoke.timeout",
                    correlation_id = %correlation_id,
                    agent = spec.name(),
                    timeout_secs = timeout.as_secs(),
                    "agent invocation timed out"
                );
                Err(AgentError::Timeout { agent: spec.name().to_string(), after: timeout })
            }
        }
    }

    async fn guard(
        &self,
        spec: &AgentSpec,
        text: &str,
        direction: Direction,
    ) -> Result<(), AgentError> {
        match self.guardrails.check(text, direction).await? {
            GuardrailDecision::Allow => Ok(()),
            GuardrailDecision::Tripwire { reason, .. } => {
                let agent = spec.name().to_string();
                Err(match direction {
                    Direction::Input => AgentError::InputTripwire { agent, reason },
                    Direction::Output => AgentError::OutputTripwire { agent, reason },
                })
            }
        }
    }
}

/// Text the output guardrail inspects: plain strings as-is, structured output as JSON.
fn output_text(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
