//! Scores a submitted solution against the session's current drill and records the feedback.

use std::fmt::Write as _;

use chrono::Local;
use serde::Serialize;
use thiserror::Error;

use hiredrill_core::domain::drill::Drill;
use hiredrill_core::domain::evaluation::SolutionFeedback;
use hiredrill_core::sanitize::truncate_chars;
use hiredrill_db::{FeedbackRecord, FeedbackStore, SessionStore};

use crate::guardrails::{Direction, SAFE_INPUT_MESSAGE, SAFE_OUTPUT_MESSAGE};
use crate::invoke::AgentError;
use crate::runtime::AgentRuntime;

pub const MAX_SOLUTION_CHARS: usize = 10_000;
pub const TRUNCATION_NOTE: &str = "(Note: Solution was truncated for evaluation due to length)";

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("session not found or expired")]
    SessionNotFound,
    #[error("session has no current drill")]
    NoDrill,
    #[error("evaluation input was blocked: {0}")]
    InputBlocked(String),
    #[error("evaluation output was blocked: {0}")]
    OutputBlocked(String),
    #[error("evaluation timed out")]
    Timeout,
    #[error("evaluation failed: {0}")]
    Failed(String),
}

impl EvaluationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "session_not_found",
            Self::NoDrill => "no_drill",
            Self::InputBlocked(_) => "input_blocked",
            Self::OutputBlocked(_) => "output_blocked",
            Self::Timeout => "timeout",
            Self::Failed(_) => "evaluation_failed",
        }
    }

    /// HTTP status the error is reported with.
    pub fn status(&self) -> u16 {
        match self {
            Self::SessionNotFound => 404,
            Self::NoDrill | Self::InputBlocked(_) => 400,
            Self::OutputBlocked(_) | Self::Timeout | Self::Failed(_) => 500,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "Session not found or expired",
            Self::NoDrill => "No drill found for this session. Generate a drill first.",
            Self::InputBlocked(_) => SAFE_INPUT_MESSAGE,
            Self::OutputBlocked(_) => SAFE_OUTPUT_MESSAGE,
            Self::Timeout => "Evaluation timed out. Please try again.",
            Self::Failed(_) => "Evaluation failed. Please try again.",
        }
    }
}

impl From<AgentError> for EvaluationError {
    fn from(error: AgentError) -> Self {
        match (&error, error.tripwire()) {
            (_, Some(Direction::Input)) => Self::InputBlocked(error.to_string()),
            (_, Some(Direction::Output)) => Self::OutputBlocked(error.to_string()),
            (AgentError::Timeout { .. }, None) => Self::Timeout,
            _ => Self::Failed(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub session_id: String,
    pub feedback: SolutionFeedback,
    pub feedback_file_path: String,
}

pub fn evaluator_input(company: &str, role: &str, drill: &Drill, solution: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Company: {company}");
    let _ = writeln!(out, "Role: {role}");
    out.push_str("\nORIGINAL DRILL:\n");
    let _ = writeln!(out, "Title: {}", drill.title);
    let _ = writeln!(out, "Description: {}", drill.description);
    let _ = writeln!(out, "Requirements: {}", drill.requirements.join(", "));
    out.push_str("\nUSER'S SUBMITTED SOLUTION:\n```\n");
    out.push_str(truncate_chars(solution, MAX_SOLUTION_CHARS));
    out.push_str("\n```");
    if solution.chars().count() > MAX_SOLUTION_CHARS {
        out.push('\n');
        out.push_str(TRUNCATION_NOTE);
    }
    out
}

/// Evaluates `solution` for the session's current drill, saves the feedback and carries its
/// summary into the session for the next drill.
pub async fn evaluate_solution(
    runtime: &AgentRuntime,
    sessions: &dyn SessionStore,
    feedback_store: &dyn FeedbackStore,
    session_id: &str,
    solution: &str,
) -> Result<EvaluationOutcome, EvaluationError> {
    let mut session = sessions
        .get(session_id)
        .await
        .map_err(|error| EvaluationError::Failed(error.to_string()))?
        .ok_or(EvaluationError::SessionNotFound)?;
    let drill = session.current_drill.clone().ok_or(EvaluationError::NoDrill)?;

    let input = evaluator_input(&session.company_name, &session.role, &drill, solution);
    let feedback: SolutionFeedback = runtime
        .invoker()
        .run(
            &runtime.catalog().solution_evaluator,
            &input,
            session_id,
            runtime.settings().evaluation_timeout,
        )
        .await?
        .ok_or_else(|| EvaluationError::Failed("evaluator returned no output".to_string()))?;
    let feedback = feedback.normalized();

    let record = FeedbackRecord {
        company_name: session.company_name.clone(),
        role: session.role.clone(),
        drill_title: drill.title.clone(),
        feedback: feedback.clone(),
        timestamp: Local::now(),
    };
    let feedback_file_path = feedback_store
        .save(&record)
        .await
        .map_err(|error| EvaluationError::Failed(error.to_string()))?;

    session.last_feedback_summary = Some(feedback.summary_for_next_drill.clone());
    sessions.put(session).await.map_err(|error| EvaluationError::Failed(error.to_string()))?;

    tracing::info!(
        event_name = "evaluation.completed",
        correlation_id = %session_id,
        score = feedback.score,
        path = %feedback_file_path,
        "solution evaluated"
    );
    Ok(EvaluationOutcome { session_id: session_id.to_string(), feedback, feedback_file_path })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use hiredrill_core::config::AppConfig;
    use hiredrill_core::domain::drill::{Difficulty, Drill, DrillType};
    use hiredrill_core::domain::session::{SessionRecord, UserSelectionRequest};
    use hiredrill_db::{InMemorySessionStore, MarkdownFeedbackStore, SessionStore};

    use super::{evaluate_solution, evaluator_input, EvaluationError, MAX_SOLUTION_CHARS, TRUNCATION_NOTE};
    use crate::prompts::{AgentCatalog, SOLUTION_EVALUATOR};
    use crate::registry::TaskRegistry;
    use crate::runtime::{AgentRuntime, PipelineSettings};
    use crate::scripted::{Reply, ScriptedLlm};

    fn drill() -> Drill {
        Drill {
            title: "Rate limiter".to_string(),
            drill_type: DrillType::Coding,
            difficulty: Difficulty::Medium,
            description: "Build a token bucket".to_string(),
            requirements: vec!["thread safe".to_string(), "burst support".to_string()],
            starter_code: None,
            hints: Vec::new(),
            expected_time_minutes: 45,
            tech_stack: Vec::new(),
            company_context: None,
        }
    }

    fn session(with_drill: bool) -> SessionRecord {
        let selection = UserSelectionRequest {
            company_name: "Acme".to_string(),
            role: "backend_developer".to_string(),
            role_description: None,
        }
        .validate()
        .expect("valid selection");
        let mut record = SessionRecord::from_selection(&selection);
        if with_drill {
            record.current_drill = Some(drill());
        }
        record
    }

    fn runtime(llm: ScriptedLlm) -> AgentRuntime {
        let config = AppConfig::default();
        let settings = PipelineSettings {
            evaluation_timeout: Duration::from_millis(100),
            ..PipelineSettings::from_config(&config)
        };
        AgentRuntime::with_parts(
            Arc::new(llm),
            Arc::new(TaskRegistry::new()),
            AgentCatalog::new(&config.llm, settings.max_searches),
            settings,
        )
    }

    #[test]
    fn input_fences_and_truncates_the_solution() {
        let input = evaluator_input("Acme", "Backend Developer", &drill(), "fn main() {}");
        assert!(input.starts_with("Company: Acme\nRole: Backend Developer\n\nORIGINAL DRILL:\n"));
        assert!(input.contains("Requirements: thread safe, burst support\n"));
        assert!(input.ends_with("USER'S SUBMITTED SOLUTION:\n```\nfn main() {}\n```"));

        let long = "a".repeat(MAX_SOLUTION_CHARS + 1);
        let input = evaluator_input("Acme", "Backend Developer", &drill(), &long);
        assert!(input.ends_with(TRUNCATION_NOTE));
        assert!(!input.contains(&long));
    }

    #[tokio::test]
    async fn feedback_is_saved_and_summary_carried_forward() {
        let directory = tempfile::tempdir().expect("tempdir");
        let store = MarkdownFeedbackStore::new(directory.path());
        let sessions = InMemorySessionStore::with_ttl_hours(24);
        let record = session(true);
        let session_id = record.session_id.clone();
        sessions.put(record).await.expect("stored");

        let llm = ScriptedLlm::new().with_clean_classifiers().reply(
            SOLUTION_EVALUATOR,
            Reply::Output(json!({
                "score": 12.0,
                "strengths": [{ "title": "Clear", "description": "Readable" }],
                "improvements": [],
                "summary_for_next_drill": "Practice concurrency"
            })),
        );
        let outcome = evaluate_solution(&runtime(llm), &sessions, &store, &session_id, "fn main() {}")
            .await
            .expect("evaluation succeeds");

        assert_eq!(outcome.feedback.score, 10.0);
        assert!(outcome.feedback_file_path.ends_with("acme_backend_developer.md"));
        assert!(directory.path().join(&outcome.feedback_file_path).exists());

        let updated = sessions.get(&session_id).await.expect("read").expect("session exists");
        assert_eq!(updated.last_feedback_summary.as_deref(), Some("Practice concurrency"));
    }

    #[tokio::test]
    async fn missing_session_drill_and_timeout_map_to_codes() {
        let directory = tempfile::tempdir().expect("tempdir");
        let store = MarkdownFeedbackStore::new(directory.path());
        let sessions = InMemorySessionStore::with_ttl_hours(24);
        let llm = ScriptedLlm::new().with_clean_classifiers().reply(SOLUTION_EVALUATOR, Reply::Hang);
        let runtime = runtime(llm);

        let error = evaluate_solution(&runtime, &sessions, &store, "missing", "x")
            .await
            .expect_err("no session");
        assert_eq!((error.code(), error.status()), ("session_not_found", 404));

        let bare = session(false);
        let bare_id = bare.session_id.clone();
        sessions.put(bare).await.expect("stored");
        let error =
            evaluate_solution(&runtime, &sessions, &store, &bare_id, "x").await.expect_err("no drill");
        assert_eq!((error.code(), error.status()), ("no_drill", 400));

        let ready = session(true);
        let ready_id = ready.session_id.clone();
        sessions.put(ready).await.expect("stored");
        let error =
            evaluate_solution(&runtime, &sessions, &store, &ready_id, "x").await.expect_err("hangs");
        assert!(matches!(error, EvaluationError::Timeout));
        assert_eq!(error.user_message(), "Evaluation timed out. Please try again.");
    }
}
