use std::io::{self, Write};
use std::sync::Arc;

use hiredrill_agent::drill::session_drill_stream;
use hiredrill_agent::AgentRuntime;
use hiredrill_core::config::AppConfig;
use hiredrill_core::domain::session::{SessionRecord, UserSelection};
use hiredrill_db::InMemorySessionStore;

use crate::commands::{
    agent_runtime, async_runtime, load_config, selection, write_events, CommandResult,
};

const COMMAND: &str = "drill";

pub fn run(company: &str, role: &str, description: Option<&str>) -> CommandResult {
    let selection = match selection(COMMAND, company, role, description) {
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

    runtime.block_on(stream(agents, &config, &selection, &mut io::stdout().lock()))
}

/// Researches the company, then streams drill generation events as JSON lines into `out`.
pub async fn stream(
    runtime: Arc<AgentRuntime>,
    config: &AppConfig,
    selection: &UserSelection,
    out: &mut impl Write,
) -> CommandResult {
    tracing::info!(
        event_name = "cli.drill.started",
        correlation_id = %selection.session_id,
        company = %selection.company_name,
        role = %selection.role,
        "drill generation started"
    );
    let sessions = Arc::new(InMemorySessionStore::with_ttl_hours(config.session.ttl_hours));
    let events = session_drill_stream(
        runtime,
        sessions,
        SessionRecord::from_selection(selection),
        selection.session_id.clone(),
    );
    write_events(COMMAND, events, out).await
}
