//! Discover, filter, analyze and persist open-source repositories for a developer profile.

pub mod analysis;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;

use hiredrill_core::domain::scout::{
    visible_results, AnalysisResult, DeveloperProfile, RepoMetadata, RunTotals, ScoutRunStatus,
    ScoutSearchResult, SearchFilters,
};
use hiredrill_core::events::{Phase, StreamEvent};
use hiredrill_core::scout_filter::apply_filters;
use hiredrill_db::{RepositoryError, ScoutRepository};

use crate::github::GitHubError;
use crate::pipeline::{Emitter, PipelineError};
use crate::runtime::AgentRuntime;

use self::analysis::{analyze_batch, batches, BatchError};

pub const NO_REPOSITORIES: &str = "No repositories found. Try broadening your filters.";
pub const ALL_FILTERED: &str = "All repos filtered out. Try adjusting your filters.";
pub const DAILY_LIMIT_REACHED: &str = "Daily analysis limit reached. Try again tomorrow.";
pub const SCOUT_FAILED: &str = "Scout search failed. Please try again.";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepoSearch {
    pub repos: Vec<RepoMetadata>,
    pub warnings: Vec<String>,
}

/// Where candidate repositories and their READMEs come from.
#[async_trait]
pub trait RepoSource: Send + Sync {
    /// Searches up to roughly `max_repos * 2` repositories matching `filters`.
    async fn search(
        &self,
        filters: &SearchFilters,
        max_repos: usize,
    ) -> Result<RepoSearch, GitHubError>;

    /// READMEs keyed by `owner/name`; `None` when a repository has none.
    async fn fetch_readmes(
        &self,
        repos: &[(String, String)],
    ) -> Result<HashMap<String, Option<String>>, GitHubError>;
}

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error(transparent)]
    Source(#[from] GitHubError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("event consumer disconnected")]
    Disconnected,
}

impl From<PipelineError> for ScoutError {
    fn from(_: PipelineError) -> Self {
        Self::Disconnected
    }
}

/// How a search ended when nothing went wrong.
enum Ending {
    Finished(ScoutSearchResult),
    Stopped(&'static str),
    Cancelled,
}

pub struct ScoutOrchestrator {
    runtime: Arc<AgentRuntime>,
    source: Arc<dyn RepoSource>,
    repository: Arc<dyn ScoutRepository>,
}

impl ScoutOrchestrator {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        source: Arc<dyn RepoSource>,
        repository: Arc<dyn ScoutRepository>,
    ) -> Self {
        Self { runtime, source, repository }
    }

    pub fn repository(&self) -> &Arc<dyn ScoutRepository> {
        &self.repository
    }

    pub fn runtime(&self) -> &Arc<AgentRuntime> {
        &self.runtime
    }

    /// Streams one search run. The registry entry for `run_id` is cleaned up when the run ends.
    pub fn search_stream(
        self: Arc<Self>,
        run_id: String,
        filters: SearchFilters,
    ) -> ReceiverStream<StreamEvent<ScoutSearchResult>> {
        let (events, stream) = Emitter::channel();
        tokio::spawn(async move {
            self.run(&run_id, &filters, &events).await;
            self.runtime.registry().cleanup(&run_id);
        });
        stream
    }

    /// Runs the search to its terminal event, recording the run's final status.
    pub async fn run(
        &self,
        run_id: &str,
        filters: &SearchFilters,
        events: &Emitter<ScoutSearchResult>,
    ) {
        let mut totals = RunTotals::default();
        let outcome = self.execute(run_id, filters, events, &mut totals).await;

        let (status, terminal) = match outcome {
            Ok(Ending::Finished(result)) => {
                tracing::info!(
                    event_name = "scout.search.completed",
                    correlation_id = %run_id,
                    status = %result.status,
                    discovered = totals.discovered,
                    filtered = totals.filtered,
                    analyzed = totals.analyzed,
                    "scout search completed"
                );
                events.finish(Ok(result)).await;
                return;
            }
            Ok(Ending::Stopped(message)) => (ScoutRunStatus::Completed, Err(message)),
            Ok(Ending::Cancelled) => {
                tracing::info!(
                    event_name = "scout.search.cancelled",
                    correlation_id = %run_id,
                    "scout search cancelled"
                );
                let _ = events.status("Search cancelled").await;
                (ScoutRunStatus::Cancelled, Ok(cancelled_result(run_id, totals)))
            }
            Err(ScoutError::Disconnected) => {
                self.runtime.registry().cancel_all(run_id);
                self.record(run_id, ScoutRunStatus::Cancelled, totals).await;
                return;
            }
            Err(error) => {
                tracing::error!(
                    event_name = "scout.search.failed",
                    correlation_id = %run_id,
                    error = %error,
                    "scout search failed"
                );
                (ScoutRunStatus::Failed, Err(SCOUT_FAILED))
            }
        };

        self.record(run_id, status, totals).await;
        events.finish(terminal).await;
    }

    async fn record(&self, run_id: &str, status: ScoutRunStatus, totals: RunTotals) {
        if let Err(error) = self.repository.update_run(run_id, status, totals).await {
            tracing::warn!(
                event_name = "scout.run.update_failed",
                correlation_id = %run_id,
                status = %status,
                error = %error,
                "could not record scout run status"
            );
        }
    }

    fn is_cancelled(&self, run_id: &str) -> bool {
        self.runtime.registry().is_cancelled(run_id)
    }

    async fn execute(
        &self,
        run_id: &str,
        filters: &SearchFilters,
        events: &Emitter<ScoutSearchResult>,
        totals: &mut RunTotals,
    ) -> Result<Ending, ScoutError> {
        let settings = self.runtime.settings();

        events.phase(Phase::Discovering, "Searching GitHub...").await?;
        let RepoSearch { repos, mut warnings } = self.discover(filters).await?;
        totals.discovered = count(repos.len());
        events
            .phase(Phase::Discovering, format!("Discovered {} repositories", repos.len()))
            .await?;
        if repos.is_empty() {
            return Ok(Ending::Stopped(NO_REPOSITORIES));
        }
        self.repository.upsert_repositories(&repos).await?;
        if self.is_cancelled(run_id) {
            return Ok(Ending::Cancelled);
        }

        events.phase(Phase::Filtering, "Filtering candidates...").await?;
        let mut filtered = apply_filters(&repos, filters.min_stars, filters.max_stars);
        // Totals report every repo that passed; only the analyzed slice is capped below.
        totals.filtered = count(filtered.len());
        events
            .phase(Phase::Filtering, format!("{} repos passed filters", filtered.len()))
            .await?;
        if filtered.is_empty() {
            return Ok(Ending::Stopped(ALL_FILTERED));
        }
        let since = Utc::now() - chrono::Duration::hours(24);
        let used = self.repository.count_analyses_since(since).await?;
        let allowance = settings.max_daily_analyses.saturating_sub(used) as usize;
        if allowance == 0 {
            tracing::warn!(
                event_name = "scout.daily_limit.reached",
                correlation_id = %run_id,
                used,
                "daily analysis limit reached"
            );
            return Ok(Ending::Stopped(DAILY_LIMIT_REACHED));
        }
        filtered.truncate(settings.max_repos.min(allowance));
        if self.is_cancelled(run_id) {
            return Ok(Ending::Cancelled);
        }

        events
            .phase(Phase::Analyzing, format!("Fetching READMEs for {} repos...", filtered.len()))
            .await?;
        let names: Vec<(String, String)> =
            filtered.iter().map(|repo| (repo.owner.clone(), repo.name.clone())).collect();
        let mut fetched = self.source.fetch_readmes(&names).await?;
        let readmes: Vec<Option<String>> =
            filtered.iter().map(|repo| fetched.remove(&repo.full_name()).flatten()).collect();
        if self.is_cancelled(run_id) {
            return Ok(Ending::Cancelled);
        }

        events.phase(Phase::Analyzing, "Starting AI analysis...").await?;
        let profile = self.profile(filters).await?;
        let Some(results) =
            self.analyze(run_id, &profile, &filtered, &readmes, events, totals).await?
        else {
            return Ok(Ending::Cancelled);
        };

        self.repository.save_analysis_results(run_id, &results).await?;
        totals.analyzed = count(results.len());
        let status = if results.len() < filtered.len() {
            ScoutRunStatus::Partial
        } else {
            ScoutRunStatus::Completed
        };
        self.repository.update_run(run_id, status, *totals).await?;

        warnings.dedup();
        Ok(Ending::Finished(ScoutSearchResult {
            run_id: run_id.to_string(),
            status,
            total_discovered: totals.discovered,
            total_filtered: totals.filtered,
            total_analyzed: totals.analyzed,
            results: visible_results(&results),
            repos: filtered,
            warnings,
        }))
    }

    /// Searches with the given filters, relaxing the topic filter once if nothing matched.
    async fn discover(&self, filters: &SearchFilters) -> Result<RepoSearch, GitHubError> {
        let max_repos = self.runtime.settings().max_repos;
        let mut found = self.source.search(filters, max_repos).await?;
        if !found.repos.is_empty() || filters.topics.is_empty() {
            return Ok(found);
        }

        let relaxed = self.source.search(&filters.without_topics(), max_repos).await?;
        found.warnings.extend(relaxed.warnings);
        if !relaxed.repos.is_empty() {
            found.warnings.push(format!(
                "No repos matched topic filter ({}). Showing results without topic filter \u{2014} \
                 topics still influence AI ranking.",
                filters.topics.join(", ")
            ));
        }
        found.repos = relaxed.repos;
        Ok(found)
    }

    /// The stored profile, or one derived from the search filters when none was saved.
    async fn profile(&self, filters: &SearchFilters) -> Result<DeveloperProfile, RepositoryError> {
        Ok(self.repository.get_profile().await?.map(|stored| stored.profile).unwrap_or_else(|| {
            DeveloperProfile {
                languages: filters.languages.clone(),
                topics: filters.topics.clone(),
                skill_level: Default::default(),
                goals: String::new(),
            }
        }))
    }

    /// Runs every batch concurrently and collects in completion order. Returns `None` when the
    /// run was cancelled, after aborting and draining the remaining batches.
    async fn analyze(
        &self,
        run_id: &str,
        profile: &DeveloperProfile,
        repos: &[RepoMetadata],
        readmes: &[Option<String>],
        events: &Emitter<ScoutSearchResult>,
        totals: &mut RunTotals,
    ) -> Result<Option<Vec<AnalysisResult>>, ScoutError> {
        let batch_size = self.runtime.settings().batch_size;
        let total = repos.len();
        let mut tasks = JoinSet::new();
        for (repo_batch, readme_batch) in
            batches(repos, batch_size).into_iter().zip(batches(readmes, batch_size))
        {
            let runtime = self.runtime.clone();
            let profile = profile.clone();
            let run_id = run_id.to_string();
            tasks.spawn(async move {
                let size = repo_batch.len();
                let outcome =
                    analyze_batch(&runtime, &profile, &repo_batch, &readme_batch, &run_id).await;
                (size, outcome)
            });
        }

        let mut results = Vec::new();
        let mut analyzed = 0;
        while let Some(joined) = tasks.join_next().await {
            if self.is_cancelled(run_id) {
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return Ok(None);
            }

            let message = match joined {
                Ok((_, Ok(batch))) => {
                    analyzed = (analyzed + batch.len()).min(total);
                    results.extend(batch);
                    format!("Analyzed {analyzed}/{total} repos...")
                }
                Ok((size, Err(error))) => {
                    analyzed = (analyzed + size).min(total);
                    log_batch_error(run_id, &error);
                    if error.is_timeout() {
                        format!("Batch timed out ({analyzed}/{total})")
                    } else {
                        format!("Batch failed ({analyzed}/{total})")
                    }
                }
                Err(error) => {
                    tracing::error!(
                        event_name = "scout.batch.panicked",
                        correlation_id = %run_id,
                        error = %error,
                        "analysis batch task did not complete"
                    );
                    format!("Batch failed ({analyzed}/{total})")
                }
            };
            totals.analyzed = count(results.len());
            if let Err(error) = events.phase(Phase::Analyzing, message).await {
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return Err(error.into());
            }
        }

        Ok(Some(results))
    }
}

fn log_batch_error(run_id: &str, error: &BatchError) {
    tracing::warn!(
        event_name = "scout.batch.failed",
        correlation_id = %run_id,
        error = %error,
        "analysis batch degraded"
    );
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn cancelled_result(run_id: &str, totals: RunTotals) -> ScoutSearchResult {
    ScoutSearchResult {
        run_id: run_id.to_string(),
        status: ScoutRunStatus::Cancelled,
        total_discovered: totals.discovered,
        total_filtered: totals.filtered,
        total_analyzed: totals.analyzed,
        results: Vec::new(),
        repos: Vec::new(),
        warnings: Vec::new(),
    }
}
