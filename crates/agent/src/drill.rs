//! Parallel drill generators with an evaluator choosing the winner.

use std::fmt::Write as _;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use hiredrill_core::domain::company::CompanySummary;
use hiredrill_core::domain::drill::{Drill, DrillCandidate, DrillEvaluation, DrillType};
use hiredrill_core::domain::session::SessionRecord;
use hiredrill_core::events::StreamEvent;
use hiredrill_core::sanitize::{sanitize_default, truncate_chars};
use hiredrill_db::session::SessionStore;

use crate::pipeline::{classify, Emitter, FailureMessages, ItemOutcome, PipelineError};
use crate::research::research;
use crate::runtime::AgentRuntime;

pub const DRILL_MESSAGES: FailureMessages = FailureMessages {
    timeout: "Drill generation timed out. Please try again.",
    failure: "Drill generation failed. Please try again.",
};
pub const ALL_GENERATORS_FAILED: &str = "All generators failed. Please try again.";
const REASONING_PREVIEW_CHARS: usize = 100;

/// Everything the generators are told about the candidate's target.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrillRequest {
    pub company_name: String,
    pub role: String,
    pub role_description: Option<String>,
    pub company_summary: Option<CompanySummary>,
    pub previous_feedback: Option<String>,
}

impl DrillRequest {
    pub fn from_session(record: &SessionRecord) -> Self {
        Self {
            company_name: record.company_name.clone(),
            role: record.role.clone(),
            role_description: record.role_description.clone(),
            company_summary: record.research_summary.clone(),
            previous_feedback: record.last_feedback_summary.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrillOutcome {
    pub drill: Drill,
    pub generators_used: Vec<DrillType>,
}

pub fn generator_input(request: &DrillRequest) -> String {
    let mut lines = vec![
        format!("Company: {}", sanitize_default(&request.company_name)),
        format!("Role: {}", sanitize_default(&request.role)),
    ];
    if let Some(description) =
        request.role_description.as_deref().map(sanitize_default).filter(|text| !text.is_empty())
    {
        lines.push(format!("Role Description: {description}"));
    }

    if let Some(summary) = &request.company_summary {
        lines.push("\nCompany Context:".to_string());
        if let Some(industry) = &summary.industry {
            lines.push(format!("Industry: {industry}"));
        }
        lines.push(format!("Description: {}", summary.description));
        if let Some(stack) = summary.tech_stack.as_ref().filter(|stack| !stack.is_empty()) {
            let all: Vec<&str> = stack
                .languages
                .iter()
                .chain(&stack.frameworks)
                .chain(&stack.tools)
                .map(String::as_str)
                .collect();
            lines.push(format!("Tech Stack: {}", all.join(", ")));
        }
        if let Some(culture) = &summary.engineering_culture {
            lines.push(format!("Engineering Culture: {culture}"));
        }
        if let Some(tips) = &summary.interview_tips {
            lines.push(format!("Interview Tips: {tips}"));
        }
    }

    if let Some(feedback) = request.previous_feedback.as_deref().filter(|text| !text.is_empty()) {
        lines.push("\nPrevious Drill Feedback (target these weak areas):".to_string());
        lines.push(feedback.to_string());
    }

    lines.join("\n")
}

pub fn evaluator_input(company: &str, role: &str, candidates: &[DrillCandidate]) -> String {
    let mut out = format!("Company: {company}\nRole: {role}\n\nCANDIDATES TO EVALUATE:\n\n");
    for (index, candidate) in candidates.iter().enumerate() {
        let drill = &candidate.drill;
        let _ = writeln!(out, "--- Candidate {} ({}) ---", index + 1, candidate.generator_type);
        let _ = writeln!(out, "Title: {}", drill.title);
        let _ = writeln!(out, "Type: {}", drill.drill_type);
        let _ = writeln!(out, "Difficulty: {}", drill.difficulty.as_str());
        let _ = writeln!(out, "Description: {}", drill.description);
        let _ = writeln!(out, "Requirements: {}", drill.requirements.join(", "));
        let _ = writeln!(out, "Expected Time: {} minutes", drill.expected_time_minutes);
        let _ = writeln!(out, "Tech Stack: {}", drill.tech_stack.join(", "));
        if let Some(code) = &drill.starter_code {
            let _ = writeln!(out, "Starter Code:\n```\n{code}\n```");
        }
        if !drill.hints.is_empty() {
            let _ = writeln!(out, "Hints: {}", drill.hints.join(", "));
        }
        let _ = writeln!(out, "Company Context: {}", drill.company_context.as_deref().unwrap_or("N/A"));
        let _ = writeln!(out, "Generator Reasoning: {}", candidate.reasoning);
        let _ = writeln!(out, "Generator Confidence: {}", candidate.confidence_score);
        out.push('\n');
    }
    out
}

fn capitalized(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Runs the generators and, when more than one succeeds, the evaluator.
pub async fn generate<T>(
    runtime: &AgentRuntime,
    request: &DrillRequest,
    correlation_id: &str,
    events: &Emitter<T>,
) -> Result<DrillOutcome, PipelineError> {
    let invoker = runtime.invoker();
    let catalog = runtime.catalog();
    let timeout = runtime.settings().drill_timeout;

    events.status("Starting drill generation...").await?;
    let input = generator_input(request);
    let generators: Vec<DrillType> =
        DrillType::ALL.into_iter().take(runtime.settings().generator_count.max(1)).collect();
    events
        .status(format!("Generating {} drill candidates in parallel...", generators.len()))
        .await?;

    let input = input.as_str();
    let mut pending: FuturesUnordered<_> = generators
        .iter()
        .map(|&generator| async move {
            let outcome = invoker
                .run::<DrillCandidate>(catalog.generator(generator), input, correlation_id, timeout)
                .await;
            (generator, outcome)
        })
        .collect();

    let mut candidates: Vec<DrillCandidate> = Vec::new();
    while let Some((generator, outcome)) = pending.next().await {
        let description = generator.description();
        match classify(outcome)? {
            ItemOutcome::Succeeded(candidate) => {
                let candidate = candidate.stamped_by(generator);
                events
                    .send(StreamEvent::Candidate {
                        generator: generator.as_str().to_string(),
                        title: candidate.drill.title.clone(),
                    })
                    .await?;
                events.status(format!("Generated {description}: {}", candidate.drill.title)).await?;
                candidates.push(candidate);
            }
            ItemOutcome::TimedOut => {
                events.status(format!("{} timed out, continuing...", capitalized(description))).await?;
            }
            ItemOutcome::Failed => {
                events.status(format!("{} failed, continuing...", capitalized(description))).await?;
            }
        }
    }
    drop(pending);

    let generators_used = generators;
    if candidates.len() <= 1 {
        let Some(only) = candidates.pop() else {
            return Err(PipelineError::AllFailed(ALL_GENERATORS_FAILED));
        };
        events.status("Only one candidate generated, using it directly.").await?;
        return Ok(DrillOutcome { drill: only.drill, generators_used });
    }

    events.status(format!("Evaluating {} candidates...", candidates.len())).await?;
    let evaluation: DrillEvaluation = invoker
        .run(
            &catalog.drill_evaluator,
            &evaluator_input(&request.company_name, &request.role, &candidates),
            correlation_id,
            timeout,
        )
        .await?
        .ok_or_else(|| PipelineError::EmptyOutput {
            agent: catalog.drill_evaluator.name().to_string(),
        })?;

    let preview = truncate_chars(&evaluation.selection_reasoning, REASONING_PREVIEW_CHARS);
    events.status(format!("Selected: {} - {preview}...", evaluation.selected_generator)).await?;
    Ok(DrillOutcome { drill: evaluation.selected_drill, generators_used })
}

/// Streams drill generation for a request whose company context is already settled.
pub fn drill_stream(
    runtime: Arc<AgentRuntime>,
    request: DrillRequest,
    correlation_id: String,
) -> ReceiverStream<StreamEvent<Drill>> {
    let (events, stream) = Emitter::channel();
    tokio::spawn(async move {
        let outcome = generate(&runtime, &request, &correlation_id, &events).await;
        finish(&events, &correlation_id, outcome.map(|outcome| outcome.drill)).await;
    });
    stream
}

/// Streams drill generation for a session: researches the company first when the session has
/// no summary yet, then stores the summary and the generated drill back into the session.
pub fn session_drill_stream(
    runtime: Arc<AgentRuntime>,
    sessions: Arc<dyn SessionStore>,
    record: SessionRecord,
    correlation_id: String,
) -> ReceiverStream<StreamEvent<Drill>> {
    let (events, stream) = Emitter::channel();
    tokio::spawn(async move {
        let outcome =
            generate_for_session(&runtime, sessions.as_ref(), record, &correlation_id, &events).await;
        finish(&events, &correlation_id, outcome.map(|outcome| outcome.drill)).await;
    });
    stream
}

/// Session-aware generation. Research failures degrade to generation without company context.
pub async fn generate_for_session<T>(
    runtime: &AgentRuntime,
    sessions: &dyn SessionStore,
    mut record: SessionRecord,
    correlation_id: &str,
    events: &Emitter<T>,
) -> Result<DrillOutcome, PipelineError> {
    if record.research_summary.is_none() {
        events.status("Researching company...").await?;
        match research(runtime, &record.company_name, &record.role, correlation_id, events).await {
            Ok(summary) => {
                record.research_summary = Some(summary);
                store(sessions, &record, correlation_id).await;
                events.status("Research complete, generating drill...").await?;
            }
            Err(PipelineError::Disconnected) => return Err(PipelineError::Disconnected),
            Err(error) => {
                tracing::info!(
                    event_name = "pipeline.drill.research_degraded",
                    correlation_id = %correlation_id,
                    error = %error,
                    "research unavailable, generating without company context"
                );
                events.status("Research unavailable, continuing without company context...").await?;
            }
        }
    }

    let outcome = generate(runtime, &DrillRequest::from_session(&record), correlation_id, events).await?;
    record.current_drill = Some(outcome.drill.clone());
    store(sessions, &record, correlation_id).await;
    Ok(outcome)
}

async fn store(sessions: &dyn SessionStore, record: &SessionRecord, correlation_id: &str) {
    if let Err(error) = sessions.put(record.clone()).await {
        tracing::warn!(
            event_name = "session.store.failed",
            correlation_id = %correlation_id,
            error = %error,
            "could not update session"
        );
    }
}

async fn finish(events: &Emitter<Drill>, correlation_id: &str, outcome: Result<Drill, PipelineError>) {
    match outcome {
        Ok(drill) => {
            tracing::info!(
                event_name = "pipeline.drill.completed",
                correlation_id = %correlation_id,
                drill_type = drill.drill_type.as_str(),
                "drill generation completed"
            );
            events.finish(Ok(drill)).await;
        }
        Err(PipelineError::Disconnected) => {}
        Err(error) => {
            tracing::warn!(
                event_name = "pipeline.drill.failed",
                correlation_id = %correlation_id,
                error = %error,
                "drill generation failed"
            );
            events.finish(Err(error.user_message(DRILL_MESSAGES))).await;
        }
    }
}
