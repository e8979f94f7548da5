use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::Request,
    response::Response,
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use hiredrill_agent::github::GitHubError;
use hiredrill_agent::prompts::AgentCatalog;
use hiredrill_agent::scout::{RepoSearch, RepoSource, ScoutOrchestrator};
use hiredrill_agent::scripted::ScriptedLlm;
use hiredrill_agent::{AgentRuntime, PipelineSettings, TaskRegistry};
use hiredrill_core::config::AppConfig;
use hiredrill_core::domain::scout::{RepoMetadata, SearchFilters};
use hiredrill_core::domain::session::SessionRecord;
use hiredrill_db::{
    InMemoryScoutRepository, InMemorySessionStore, MarkdownFeedbackStore, SessionStore,
};

use crate::app;
use crate::state::{AppState, SearchGuard};

/// Repositories served for every search, each with a one-line README.
pub(crate) struct StaticSource {
    repos: Vec<RepoMetadata>,
}

impl StaticSource {
    pub(crate) fn new(repos: Vec<RepoMetadata>) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl RepoSource for StaticSource {
    async fn search(
        &self,
        _filters: &SearchFilters,
        _max_repos: usize,
    ) -> Result<RepoSearch, GitHubError> {
        Ok(RepoSearch { repos: self.repos.clone(), warnings: Vec::new() })
    }

    async fn fetch_readmes(
        &self,
        repos: &[(String, String)],
    ) -> Result<HashMap<String, Option<String>>, GitHubError> {
        Ok(repos
            .iter()
            .map(|(owner, name)| (format!("{owner}/{name}"), Some(format!("# {name}"))))
            .collect())
    }
}

pub(crate) fn repo(id: i64, name: &str) -> RepoMetadata {
    RepoMetadata {
        github_id: id,
        owner: "octo".to_string(),
        name: name.to_string(),
        url: format!("https://github.com/octo/{name}"),
        description: Some("an event store".to_string()),
        primary_language: Some("Rust".to_string()),
        languages: vec!["Rust".to_string()],
        star_count: 250,
        fork_count: 4,
        open_issue_count: 6,
        topics: Vec::new(),
        license: Some("MIT".to_string()),
        pushed_at: None,
        created_at: None,
        good_first_issue_count: 2,
        help_wanted_count: 1,
    }
}

/// Application state over in-memory stores and a scripted model.
pub(crate) struct TestApp {
    pub(crate) state: AppState,
    pub(crate) sessions: Arc<InMemorySessionStore>,
    pub(crate) scout_repository: Arc<InMemoryScoutRepository>,
    feedback_dir: TempDir,
}

impl TestApp {
    pub(crate) fn new(llm: ScriptedLlm) -> Self {
        Self::build(llm, None, 5)
    }

    pub(crate) fn with_scout(llm: ScriptedLlm, source: StaticSource, searches_per_hour: u32) -> Self {
        Self::build(llm, Some(Arc::new(source)), searches_per_hour)
    }

    fn build(llm: ScriptedLlm, source: Option<Arc<dyn RepoSource>>, searches_per_hour: u32) -> Self {
        let config = AppConfig::default();
        let settings = PipelineSettings {
            research_timeout: Duration::from_millis(250),
            drill_timeout: Duration::from_millis(250),
            evaluation_timeout: Duration::from_millis(250),
            analysis_timeout: Duration::from_millis(250),
            ..PipelineSettings::from_config(&config)
        };
        let runtime = Arc::new(AgentRuntime::with_parts(
            Arc::new(llm),
            Arc::new(TaskRegistry::new()),
            AgentCatalog::new(&config.llm, settings.max_searches),
            settings,
        ));
        let sessions = Arc::new(InMemorySessionStore::with_ttl_hours(config.session.ttl_hours));
        let scout_repository = Arc::new(InMemoryScoutRepository::default());
        let feedback_dir = tempfile::tempdir().expect("tempdir");
        let scout = source.map(|source| {
            Arc::new(ScoutOrchestrator::new(runtime.clone(), source, scout_repository.clone()))
        });

        let state = AppState {
            runtime,
            sessions: sessions.clone(),
            feedback: Arc::new(MarkdownFeedbackStore::new(feedback_dir.path())),
            scout_repository: scout_repository.clone(),
            scout,
            searches: Arc::new(SearchGuard::new(searches_per_hour)),
        };
        Self { state, sessions, scout_repository, feedback_dir }
    }

    pub(crate) fn router(&self) -> Router {
        app::api_routes(self.state.clone())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    pub(crate) async fn session(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get(session_id).await.expect("session read")
    }

    pub(crate) fn feedback_dir(&self) -> &Path {
        self.feedback_dir.path()
    }
}

pub(crate) async fn send(router: Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => {
            request.header("content-type", "application/json").body(Body::from(body.to_string()))
        }
        None => request.body(Body::empty()),
    };
    router.oneshot(request.expect("request")).await.expect("response")
}

pub(crate) async fn json_body(response: Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&body).expect("json body")
}
