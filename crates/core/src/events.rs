use serde::{Deserialize, Serialize};

/// Scout pipeline phase attached to status events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discovering,
    Filtering,
    Analyzing,
}

/// One item of a pipeline's ordered event sequence.
///
/// `Complete` and `Error` are terminal and mutually exclusive: a well-formed stream ends with
/// exactly one of them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent<T> {
    Status {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase: Option<Phase>,
    },
    Candidate {
        generator: String,
        title: String,
    },
    Complete {
        data: T,
    },
    Error {
        message: String,
    },
}

impl<T> StreamEvent<T> {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status { message: message.into(), phase: None }
    }

    pub fn phase(phase: Phase, message: impl Into<String>) -> Self {
        Self::Status { message: message.into(), phase: Some(phase) }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Re-types a non-terminal event so one pipeline can forward another's progress.
    pub fn forward<U>(self) -> Option<StreamEvent<U>> {
        match self {
            Self::Status { message, phase } => Some(StreamEvent::Status { message, phase }),
            Self::Candidate { generator, title } => Some(StreamEvent::Candidate { generator, title }),
            Self::Complete { .. } | Self::Error { .. } => None,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Candidate { .. } => "candidate",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Phase, StreamEvent};

    #[test]
    fn events_serialize_with_type_tag() {
        let status: StreamEvent<()> = StreamEvent::phase(Phase::Filtering, "Filtering candidates...");
        let json = serde_json::to_value(&status).expect("status serializes");
        assert_eq!(json["type"], "status");
        assert_eq!(json["phase"], "filtering");

        let plain: StreamEvent<()> = StreamEvent::status("Planning research strategy...");
        let json = serde_json::to_value(&plain).expect("status serializes");
        assert!(json.get("phase").is_none());

        let complete = StreamEvent::Complete { data: 7u8 };
        let json = serde_json::to_value(&complete).expect("complete serializes");
        assert_eq!(json["type"], "complete");
        assert_eq!(json["data"], 7);
    }

    #[test]
    fn terminal_events_are_not_forwarded() {
        let complete: StreamEvent<u8> = StreamEvent::Complete { data: 1 };
        assert!(complete.is_terminal());
        assert!(complete.forward::<String>().is_none());

        let status: StreamEvent<u8> = StreamEvent::status("working");
        assert!(matches!(
            status.forward::<String>(),
            Some(StreamEvent::Status { ref message, .. }) if message == "working"
        ));
    }
}
