use std::io::{self, Write};
use std::sync::Arc;

use hiredrill_agent::research::research_stream;
use hiredrill_agent::AgentRuntime;
use hiredrill_core::domain::session::UserSelection;

use crate::commands::{
    agent_runtime, async_runtime, load_config, selection, write_events, CommandResult,
};

const COMMAND: &str = "research";

pub fn run(company: &str, role: &str) -> CommandResult {
    let selection = match selection(COMMAND, company, role, None) {
        Ok(selection) => selection,
        Err(failure) => return failure,
    };
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let agents = match agent_runtime(&config, COMMAND) {
        Ok(agents) => agents,
        Err(failure) => return failure,
    };

    runtime.block_on(stream(agents, &selection, &mut io::stdout().lock()))
}

/// Streams company research events as JSON lines into `out`.
pub async fn stream(
    runtime: Arc<AgentRuntime>,
    selection: &UserSelection,
    out: &mut impl Write,
) -> CommandResult {
    tracing::info!(
        event_name = "cli.research.started",
        correlation_id = %selection.session_id,
        company = %selection.company_name,
        "research started"
    );
    let events = research_stream(
        runtime,
        selection.company_name.clone(),
        selection.role.clone(),
        selection.session_id.clone(),
    );
    write_events(COMMAND, events, out).await
}
