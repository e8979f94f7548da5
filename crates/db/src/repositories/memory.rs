use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use hiredrill_core::domain::scout::{
    visible_results, AnalysisResult, DeveloperProfile, RepoMetadata, RunTotals, ScoutRun,
    ScoutRunStatus, ScoutSearchResult, SearchFilters, StoredProfile, DEFAULT_PROFILE_ID,
};

use super::{split_full_name, RepositoryError, ScoutRepository};

#[derive(Clone)]
struct StoredRepo {
    metadata: RepoMetadata,
    last_seen_at: DateTime<Utc>,
}

#[derive(Clone)]
struct StoredAnalysis {
    run_id: String,
    repo_id: i64,
    result: AnalysisResult,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryScoutRepository {
    profile: RwLock<Option<StoredProfile>>,
    runs: RwLock<HashMap<String, ScoutRun>>,
    repos: RwLock<HashMap<i64, StoredRepo>>,
    analyses: RwLock<Vec<StoredAnalysis>>,
}

#[async_trait::async_trait]
impl ScoutRepository for InMemoryScoutRepository {
    async fn save_profile(
        &self,
        profile: DeveloperProfile,
    ) -> Result<StoredProfile, RepositoryError> {
        let now = Utc::now();
        let mut stored = self.profile.write().await;
        let created_at = stored.as_ref().map_or(now, |existing| existing.created_at);
        let record =
            StoredProfile { id: DEFAULT_PROFILE_ID.to_string(), profile, created_at, updated_at: now };
        *stored = Some(record.clone());
        Ok(record)
    }

    async fn get_profile(&self) -> Result<Option<StoredProfile>, RepositoryError> {
        Ok(self.profile.read().await.clone())
    }

    async fn create_run(&self, filters: &SearchFilters) -> Result<ScoutRun, RepositoryError> {
        let profile_id =
            self.profile.read().await.as_ref().map(|profile| profile.id.clone()).unwrap_or_default();
        let now = Utc::now();
        let run = ScoutRun {
            id: Uuid::new_v4().to_string(),
            profile_id,
            filters: filters.clone(),
            status: ScoutRunStatus::Running,
            total_discovered: 0,
            total_filtered: 0,
            total_analyzed: 0,
            created_at: now,
            updated_at: now,
        };
        self.runs.write().await.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn update_run(
        &self,
        run_id: &str,
        status: ScoutRunStatus,
        totals: RunTotals,
    ) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().await;
        let run =
            runs.get_mut(run_id).ok_or_else(|| RepositoryError::RunNotFound(run_id.to_string()))?;
        run.status = status;
        run.total_discovered = totals.discovered;
        run.total_filtered = totals.filtered;
        run.total_analyzed = totals.analyzed;
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<ScoutRun>, RepositoryError> {
        Ok(self.runs.read().await.get(run_id).cloned())
    }

    async fn upsert_repositories(&self, repos: &[RepoMetadata]) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let mut stored = self.repos.write().await;
        for repo in repos {
            stored.insert(repo.github_id, StoredRepo { metadata: repo.clone(), last_seen_at: now });
        }
        Ok(())
    }

    async fn save_analysis_results(
        &self,
        run_id: &str,
        results: &[AnalysisResult],
    ) -> Result<usize, RepositoryError> {
        let repos = self.repos.read().await;
        let mut analyses = self.analyses.write().await;
        let now = Utc::now();
        let mut saved = 0usize;
        for result in results {
            let Some((owner, name)) = split_full_name(&result.repo) else {
                continue;
            };
            let Some(repo_id) = repos
                .values()
                .find(|repo| repo.metadata.owner == owner && repo.metadata.name == name)
                .map(|repo| repo.metadata.github_id)
            else {
                continue;
            };
            analyses.push(StoredAnalysis {
                run_id: run_id.to_string(),
                repo_id,
                result: result.clone(),
                created_at: now,
            });
            saved += 1;
        }
        Ok(saved)
    }

    async fn get_search_results(
        &self,
        run_id: &str,
    ) -> Result<Option<ScoutSearchResult>, RepositoryError> {
        let Some(run) = self.get_run(run_id).await? else {
            return Ok(None);
        };

        let repos = self.repos.read().await;
        let analyses = self.analyses.read().await;
        let joined: Vec<(AnalysisResult, RepoMetadata)> = analyses
            .iter()
            .filter(|analysis| analysis.run_id == run_id)
            .filter_map(|analysis| {
                repos.get(&analysis.repo_id).map(|repo| (analysis.result.clone(), repo.metadata.clone()))
            })
            .collect();

        let all: Vec<AnalysisResult> = joined.iter().map(|(result, _)| result.clone()).collect();
        let results = visible_results(&all);
        let repos = results
            .iter()
            .filter_map(|result| {
                joined
                    .iter()
                    .find(|(_, repo)| repo.full_name() == result.repo)
                    .map(|(_, repo)| repo.clone())
            })
            .collect();

        Ok(Some(ScoutSearchResult {
            run_id: run.id,
            status: run.status,
            total_discovered: run.total_discovered,
            total_filtered: run.total_filtered,
            total_analyzed: run.total_analyzed,
            results,
            repos,
            warnings: Vec::new(),
        }))
    }

    async fn count_analyses_since(&self, since: DateTime<Utc>) -> Result<u32, RepositoryError> {
        let analyses = self.analyses.read().await;
        let count = analyses.iter().filter(|analysis| analysis.created_at >= since).count();
        u32::try_from(count)
            .map_err(|_| RepositoryError::Decode(format!("analysis count overflow: {count}")))
    }

    async fn prune_stale_repositories(&self, max_age: Duration) -> Result<u64, RepositoryError> {
        let cutoff = Utc::now() - max_age;
        let mut repos = self.repos.write().await;
        let stale: Vec<i64> = repos
            .iter()
            .filter(|(_, repo)| repo.last_seen_at < cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            repos.remove(id);
        }
        self.analyses.write().await.retain(|analysis| !stale.contains(&analysis.repo_id));
        Ok(stale.len() as u64)
    }
}
