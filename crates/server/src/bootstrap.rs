use std::sync::Arc;

use chrono::Duration;
use hiredrill_agent::github::{GitHubClient, GitHubError};
use hiredrill_agent::openai::OpenAiClient;
use hiredrill_agent::scout::ScoutOrchestrator;
use hiredrill_agent::{AgentRuntime, LlmError, TaskRegistry};
use hiredrill_core::config::{AppConfig, ConfigError, LoadOptions};
use hiredrill_db::repositories::STALE_REPOSITORY_DAYS;
use hiredrill_db::{
    connect_with_settings, migrations, DbPool, InMemorySessionStore, MarkdownFeedbackStore,
    ScoutRepository, SqlScoutRepository,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::state::{AppState, SearchGuard};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub sessions: Arc<InMemorySessionStore>,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("github client setup failed: {0}")]
    GitHub(#[source] GitHubError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        provider = ?config.llm.provider,
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let scout_repository: Arc<dyn ScoutRepository> =
        Arc::new(SqlScoutRepository::new(db_pool.clone()));
    match scout_repository.prune_stale_repositories(Duration::days(STALE_REPOSITORY_DAYS)).await {
        Ok(pruned) => info!(
            event_name = "system.bootstrap.repositories_pruned",
            correlation_id = "bootstrap",
            pruned,
            "stale repositories pruned"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.prune_failed",
            correlation_id = "bootstrap",
            error = %error,
            "could not prune stale repositories"
        ),
    }

    let llm = Arc::new(OpenAiClient::from_config(&config.llm)?);
    let runtime = Arc::new(AgentRuntime::new(llm, Arc::new(TaskRegistry::new()), &config));

    let scout = match GitHubClient::new(config.scout.github_token.clone()) {
        Ok(client) => Some(Arc::new(ScoutOrchestrator::new(
            runtime.clone(),
            Arc::new(client),
            scout_repository.clone(),
        ))),
        Err(GitHubError::MissingToken) => {
            warn!(
                event_name = "system.bootstrap.scout_disabled",
                correlation_id = "bootstrap",
                "no github token configured, repository scout is disabled"
            );
            None
        }
        Err(error) => return Err(BootstrapError::GitHub(error)),
    };

    let sessions = Arc::new(InMemorySessionStore::with_ttl_hours(config.session.ttl_hours));
    let state = AppState {
        runtime,
        sessions: sessions.clone(),
        feedback: Arc::new(MarkdownFeedbackStore::new(config.feedback.base_dir.clone())),
        scout_repository,
        scout,
        searches: Arc::new(SearchGuard::new(config.scout.searches_per_hour)),
    };

    Ok(Application { config, db_pool, sessions, state })
}
