//! Shared plumbing for the streaming pipelines.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use hiredrill_core::events::{Phase, StreamEvent};

use crate::guardrails::Direction;
use crate::invoke::AgentError;

const EVENT_BUFFER: usize = 32;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("{agent} returned no output")]
    EmptyOutput { agent: String },
    /// A fan-out stage where no item succeeded. The message is safe to show.
    #[error("{0}")]
    AllFailed(&'static str),
    #[error("event consumer disconnected")]
    Disconnected,
}

/// User-facing wording for one pipeline's fatal errors.
#[derive(Clone, Copy, Debug)]
pub struct FailureMessages {
    pub timeout: &'static str,
    pub failure: &'static str,
}

impl PipelineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Agent(error) if error.is_timeout())
    }

    pub fn tripwire(&self) -> Option<Direction> {
        match self {
            Self::Agent(error) => error.tripwire(),
            _ => None,
        }
    }

    /// Message for the terminal `error` event. Never carries internal detail.
    pub fn user_message(&self, messages: FailureMessages) -> &'static str {
        if let Some(direction) = self.tripwire() {
            return direction.safe_message();
        }
        match self {
            Self::AllFailed(message) => *message,
            _ if self.is_timeout() => messages.timeout,
            _ => messages.failure,
        }
    }
}

/// How one fan-out item ended. Tripwires are not outcomes: they abort the whole pipeline.
pub(crate) enum ItemOutcome<T> {
    Succeeded(T),
    TimedOut,
    Failed,
}

pub(crate) fn classify<T>(result: Result<Option<T>, AgentError>) -> Result<ItemOutcome<T>, AgentError> {
    match result {
        Ok(Some(value)) => Ok(ItemOutcome::Succeeded(value)),
        Ok(None) => Ok(ItemOutcome::Failed),
        Err(error) if error.tripwire().is_some() => Err(error),
        Err(error) if error.is_timeout() => Ok(ItemOutcome::TimedOut),
        Err(_) => Ok(ItemOutcome::Failed),
    }
}

/// Sending half of a pipeline's event stream. A detached emitter drops every event, for callers
/// that only want the final value.
pub struct Emitter<T> {
    tx: Option<mpsc::Sender<StreamEvent<T>>>,
}

impl<T> Emitter<T> {
    pub fn channel() -> (Self, ReceiverStream<StreamEvent<T>>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (Self { tx: Some(tx) }, ReceiverStream::new(rx))
    }

    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub async fn send(&self, event: StreamEvent<T>) -> Result<(), PipelineError> {
        match &self.tx {
            Some(tx) => tx.send(event).await.map_err(|_| PipelineError::Disconnected),
            None => Ok(()),
        }
    }

    pub async fn status(&self, message: impl Into<String>) -> Result<(), PipelineError> {
        self.send(StreamEvent::status(message)).await
    }

    pub async fn phase(&self, phase: Phase, message: impl Into<String>) -> Result<(), PipelineError> {
        self.send(StreamEvent::phase(phase, message)).await
    }

    /// Emits the terminal event; a gone consumer is not an error at this point.
    pub async fn finish(&self, outcome: Result<T, &'static str>) {
        let event = match outcome {
            Ok(data) => StreamEvent::Complete { data },
            Err(message) => StreamEvent::error(message),
        };
        let _ = self.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hiredrill_core::events::StreamEvent;
    use tokio_stream::StreamExt;

    use super::{classify, Emitter, FailureMessages, ItemOutcome, PipelineError};
    use crate::guardrails::SAFE_OUTPUT_MESSAGE;
    use crate::invoke::AgentError;
    use crate::llm::LlmError;

    const MESSAGES: FailureMessages =
        FailureMessages { timeout: "Timed out. Please try again.", failure: "Failed." };

    #[test]
    fn errors_translate_to_fixed_messages() {
        let tripwire = PipelineError::from(AgentError::OutputTripwire {
            agent: "Summarizer".to_string(),
            reason: "sk-".to_string(),
        });
        assert_eq!(tripwire.user_message(MESSAGES), SAFE_OUTPUT_MESSAGE);

        let timeout = PipelineError::from(AgentError::Timeout {
            agent: "Planner".to_string(),
            after: Duration::from_secs(1),
        });
        assert_eq!(timeout.user_message(MESSAGES), MESSAGES.timeout);

        let internal = PipelineError::from(AgentError::Llm(LlmError::Request("tcp reset".into())));
        assert_eq!(internal.user_message(MESSAGES), MESSAGES.failure);
        assert_eq!(
            PipelineError::AllFailed("All searches failed. Please try again.").user_message(MESSAGES),
            "All searches failed. Please try again."
        );
    }

    #[test]
    fn fan_out_outcomes_keep_tripwires_fatal() {
        assert!(matches!(classify(Ok(Some(1))), Ok(ItemOutcome::Succeeded(1))));
        assert!(matches!(classify::<u8>(Ok(None)), Ok(ItemOutcome::Failed)));
        assert!(matches!(
            classify::<u8>(Err(AgentError::Timeout {
                agent: "Search".to_string(),
                after: Duration::from_secs(1)
            })),
            Ok(ItemOutcome::TimedOut)
        ));
        assert!(classify::<u8>(Err(AgentError::InputTripwire {
            agent: "Search".to_string(),
            reason: "jailbreak".to_string()
        }))
        .is_err());
    }

    #[tokio::test]
    async fn detached_emitter_swallows_events() {
        let emitter: Emitter<()> = Emitter::detached();
        assert!(emitter.status("ignored").await.is_ok());

        let (emitter, mut events) = Emitter::<u8>::channel();
        emitter.status("working").await.expect("consumer attached");
        emitter.finish(Ok(7)).await;
        drop(emitter);

        assert_eq!(events.next().await, Some(StreamEvent::status("working")));
        assert_eq!(events.next().await, Some(StreamEvent::Complete { data: 7 }));
        assert_eq!(events.next().await, None);
    }
}
