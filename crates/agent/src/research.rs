//! Plan, search in parallel, summarize.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;

use hiredrill_core::domain::company::{CompanySummary, SearchPlan};
use hiredrill_core::events::StreamEvent;
use hiredrill_core::sanitize::sanitize_default;

use crate::pipeline::{classify, Emitter, FailureMessages, ItemOutcome, PipelineError};
use crate::runtime::AgentRuntime;

pub const RESEARCH_MESSAGES: FailureMessages = FailureMessages {
    timeout: "Research timed out. Please try again.",
    failure: "Research failed. Please try again.",
};
pub const ALL_SEARCHES_FAILED: &str = "All searches failed. Please try again.";

pub fn planner_input(company: &str, role: &str) -> String {
    format!("Company: {}\nRole: {}", sanitize_default(company), sanitize_default(role))
}

pub fn search_input(query: &str, reason: &str) -> String {
    format!("Search term: {query}\nReason: {reason}")
}

pub fn summarizer_input(company: &str, role: &str, results: &[String]) -> String {
    format!(
        "Company: {}\nRole: {}\n\nResearch:\n{}",
        sanitize_default(company),
        sanitize_default(role),
        results.join("\n\n")
    )
}

/// Streams research progress for one company and role, ending in `complete` or `error`.
pub fn research_stream(
    runtime: Arc<AgentRuntime>,
    company: String,
    role: String,
    correlation_id: String,
) -> ReceiverStream<StreamEvent<CompanySummary>> {
    let (events, stream) = Emitter::channel();
    tokio::spawn(async move {
        let outcome = research(&runtime, &company, &role, &correlation_id, &events).await;
        finish(&events, &correlation_id, outcome).await;
    });
    stream
}

async fn finish(
    events: &Emitter<CompanySummary>,
    correlation_id: &str,
    outcome: Result<CompanySummary, PipelineError>,
) {
    match outcome {
        Ok(summary) => {
            tracing::info!(
                event_name = "pipeline.research.completed",
                correlation_id = %correlation_id,
                company = %summary.name,
                "company research completed"
            );
            events.finish(Ok(summary)).await;
        }
        Err(PipelineError::Disconnected) => {}
        Err(error) => {
            tracing::warn!(
                event_name = "pipeline.research.failed",
                correlation_id = %correlation_id,
                error = %error,
                "company research failed"
            );
            events.finish(Err(error.user_message(RESEARCH_MESSAGES))).await;
        }
    }
}

/// Runs the research stages, emitting status events through `events`. Generic over the
/// consumer's payload so that other pipelines can embed research progress.
pub async fn research<T>(
    runtime: &AgentRuntime,
    company: &str,
    role: &str,
    correlation_id: &str,
    events: &Emitter<T>,
) -> Result<CompanySummary, PipelineError> {
    let invoker = runtime.invoker();
    let catalog = runtime.catalog();
    let timeout = runtime.settings().research_timeout;

    events.status("Planning research strategy...").await?;
    let plan: SearchPlan = invoker
        .run(&catalog.planner, &planner_input(company, role), correlation_id, timeout)
        .await?
        .ok_or_else(|| PipelineError::EmptyOutput { agent: catalog.planner.name().to_string() })?;
    let plan = plan.truncated(runtime.settings().max_searches);
    events.status(format!("Found {} areas to research", plan.searches.len())).await?;

    let total = plan.searches.len();
    let mut searches: FuturesUnordered<_> = plan
        .searches
        .iter()
        .map(|item| async move {
            let input = search_input(&item.query, &item.reason);
            let outcome = invoker.run_raw(&catalog.search, &input, correlation_id, timeout).await;
            (item.reason.as_str(), outcome.map(|output| output.map(search_text)))
        })
        .collect();

    let mut results = Vec::new();
    let mut completed = 0;
    while let Some((reason, outcome)) = searches.next().await {
        completed += 1;
        let message = match classify(outcome)? {
            ItemOutcome::Succeeded(text) => {
                results.push(text);
                format!("Completed ({completed}/{total}): {reason}")
            }
            ItemOutcome::TimedOut => format!("Timed out ({completed}/{total}): {reason}, continuing..."),
            ItemOutcome::Failed => format!("Failed ({completed}/{total}): {reason}, continuing..."),
        };
        events.status(message).await?;
    }
    drop(searches);

    if results.is_empty() {
        return Err(PipelineError::AllFailed(ALL_SEARCHES_FAILED));
    }

    events.status("Analyzing findings...").await?;
    let summary: CompanySummary = invoker
        .run(&catalog.summarizer, &summarizer_input(company, role, &results), correlation_id, timeout)
        .await?
        .ok_or_else(|| PipelineError::EmptyOutput { agent: catalog.summarizer.name().to_string() })?;
    Ok(summary)
}

fn search_text(output: Value) -> String {
    match output {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{planner_input, search_input, summarizer_input};

    #[test]
    fn prompts_follow_the_documented_layout() {
        assert_eq!(
            planner_input("  Acme\n Corp ", "Backend Developer"),
            "Company: Acme Corp\nRole: Backend Developer"
        );
        assert_eq!(search_input("acme stack", "tech"), "Search term: acme stack\nReason: tech");
        assert_eq!(
            summarizer_input("Acme", "QA Engineer", &["one".to_string(), "two".to_string()]),
            "Company: Acme\nRole: QA Engineer\n\nResearch:\none\n\ntwo"
        );
    }
}
