use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use hiredrill_core::domain::scout::{
    AnalysisResult, DeveloperProfile, RepoMetadata, RunTotals, ScoutRun, ScoutRunStatus,
    ScoutSearchResult, SearchFilters, StoredProfile,
};

pub mod memory;
pub mod scout;

pub use memory::InMemoryScoutRepository;
pub use scout::SqlScoutRepository;

/// Repositories not seen by any search within this window are pruned.
pub const STALE_REPOSITORY_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("search run `{0}` was not found")]
    RunNotFound(String),
}

#[async_trait]
pub trait ScoutRepository: Send + Sync {
    /// Upserts the single default profile.
    async fn save_profile(&self, profile: DeveloperProfile)
        -> Result<StoredProfile, RepositoryError>;

    async fn get_profile(&self) -> Result<Option<StoredProfile>, RepositoryError>;

    /// Creates a `running` run linked to the default profile when one exists.
    async fn create_run(&self, filters: &SearchFilters) -> Result<ScoutRun, RepositoryError>;

    async fn update_run(
        &self,
        run_id: &str,
        status: ScoutRunStatus,
        totals: RunTotals,
    ) -> Result<(), RepositoryError>;

    async fn get_run(&self, run_id: &str) -> Result<Option<ScoutRun>, RepositoryError>;

    async fn upsert_repositories(&self, repos: &[RepoMetadata]) -> Result<(), RepositoryError>;

    /// Results naming a repository that was never upserted are skipped; returns the saved count.
    async fn save_analysis_results(
        &self,
        run_id: &str,
        results: &[AnalysisResult],
    ) -> Result<usize, RepositoryError>;

    async fn get_search_results(
        &self,
        run_id: &str,
    ) -> Result<Option<ScoutSearchResult>, RepositoryError>;

    async fn count_analyses_since(&self, since: DateTime<Utc>) -> Result<u32, RepositoryError>;

    async fn prune_stale_repositories(&self, max_age: Duration) -> Result<u64, RepositoryError>;
}

pub(crate) fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    full_name.split_once('/').filter(|(owner, name)| !owner.is_empty() && !name.is_empty())
}
