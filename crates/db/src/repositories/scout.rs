use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use hiredrill_core::domain::scout::{
    visible_results, AnalysisResult, DeveloperProfile, RepoMetadata, RunTotals, ScoutRun,
    ScoutRunStatus, ScoutSearchResult, SearchFilters, SkillLevel, StoredProfile,
    DEFAULT_PROFILE_ID,
};

use super::{split_full_name, RepositoryError, ScoutRepository};
use crate::DbPool;

pub struct SqlScoutRepository {
    pool: DbPool,
}

impl SqlScoutRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ScoutRepository for SqlScoutRepository {
    async fn save_profile(
        &self,
        profile: DeveloperProfile,
    ) -> Result<StoredProfile, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO developer_profiles (
                id,
                languages_json,
                topics_json,
                skill_level,
                goals,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                languages_json = excluded.languages_json,
                topics_json = excluded.topics_json,
                skill_level = excluded.skill_level,
                goals = excluded.goals,
                updated_at = excluded.updated_at",
        )
        .bind(DEFAULT_PROFILE_ID)
        .bind(encode_json("languages_json", &profile.languages)?)
        .bind(encode_json("topics_json", &profile.topics)?)
        .bind(profile.skill_level.as_str())
        .bind(&profile.goals)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_profile().await?.ok_or_else(|| {
            RepositoryError::Decode("profile vanished immediately after upsert".to_string())
        })
    }

    async fn get_profile(&self) -> Result<Option<StoredProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, languages_json, topics_json, skill_level, goals, created_at, updated_at
             FROM developer_profiles
             WHERE id = ?",
        )
        .bind(DEFAULT_PROFILE_ID)
        .fetch_optional(&self.pool)
        .await?;

        row.map(profile_from_row).transpose()
    }

    async fn create_run(&self, filters: &SearchFilters) -> Result<ScoutRun, RepositoryError> {
        let profile_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM developer_profiles WHERE id = ?")
                .bind(DEFAULT_PROFILE_ID)
                .fetch_optional(&self.pool)
                .await?;

        let now = Utc::now();
        let run = ScoutRun {
            id: Uuid::new_v4().to_string(),
            profile_id: profile_id.clone().unwrap_or_default(),
            filters: filters.clone(),
            status: ScoutRunStatus::Running,
            total_discovered: 0,
            total_filtered: 0,
            total_analyzed: 0,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO search_runs (
                id,
                profile_id,
                filters_json,
                status,
                total_discovered,
                total_filtered,
                total_analyzed,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, 0, 0, 0, ?, ?)",
        )
        .bind(&run.id)
        .bind(profile_id.as_deref())
        .bind(encode_json("filters_json", &run.filters)?)
        .bind(run.status.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(run)
    }

    async fn update_run(
        &self,
        run_id: &str,
        status: ScoutRunStatus,
        totals: RunTotals,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE search_runs
             SET status = ?,
                 total_discovered = ?,
                 total_filtered = ?,
                 total_analyzed = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(i64::from(totals.discovered))
        .bind(i64::from(totals.filtered))
        .bind(i64::from(totals.analyzed))
        .bind(Utc::now().to_rfc3339())
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::RunNotFound(run_id.to_string()));
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<ScoutRun>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                profile_id,
                filters_json,
                status,
                total_discovered,
                total_filtered,
                total_analyzed,
                created_at,
                updated_at
             FROM search_runs
             WHERE id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(run_from_row).transpose()
    }

    async fn upsert_repositories(&self, repos: &[RepoMetadata]) -> Result<(), RepositoryError> {
        if repos.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for repo in repos {
            sqlx::query(
                "INSERT INTO repositories (
                    github_id,
                    owner,
                    name,
                    url,
                    description,
                    primary_language,
                    languages_json,
                    star_count,
                    fork_count,
                    open_issue_count,
                    topics_json,
                    license,
                    pushed_at,
                    created_at,
                    good_first_issue_count,
                    help_wanted_count,
                    last_seen_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(github_id) DO UPDATE SET
                    owner = excluded.owner,
                    name = excluded.name,
                    url = excluded.url,
                    description = excluded.description,
                    primary_language = excluded.primary_language,
                    languages_json = excluded.languages_json,
                    star_count = excluded.star_count,
                    fork_count = excluded.fork_count,
                    open_issue_count = excluded.open_issue_count,
                    topics_json = excluded.topics_json,
                    license = excluded.license,
                    pushed_at = excluded.pushed_at,
                    created_at = excluded.created_at,
                    good_first_issue_count = excluded.good_first_issue_count,
                    help_wanted_count = excluded.help_wanted_count,
                    last_seen_at = excluded.last_seen_at",
            )
            .bind(repo.github_id)
            .bind(&repo.owner)
            .bind(&repo.name)
            .bind(&repo.url)
            .bind(repo.description.as_deref())
            .bind(repo.primary_language.as_deref())
            .bind(encode_json("languages_json", &repo.languages)?)
            .bind(i64::from(repo.star_count))
            .bind(i64::from(repo.fork_count))
            .bind(i64::from(repo.open_issue_count))
            .bind(encode_json("topics_json", &repo.topics)?)
            .bind(repo.license.as_deref())
            .bind(repo.pushed_at.map(|value| value.to_rfc3339()))
            .bind(repo.created_at.map(|value| value.to_rfc3339()))
            .bind(i64::from(repo.good_first_issue_count))
            .bind(i64::from(repo.help_wanted_count))
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn save_analysis_results(
        &self,
        run_id: &str,
        results: &[AnalysisResult],
    ) -> Result<usize, RepositoryError> {
        if results.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let mut saved = 0usize;
        let mut tx = self.pool.begin().await?;
        for result in results {
            let Some((owner, name)) = split_full_name(&result.repo) else {
                continue;
            };
            let repo_id: Option<i64> = sqlx::query_scalar(
                "SELECT github_id FROM repositories WHERE owner = ? AND name = ? LIMIT 1",
            )
            .bind(owner)
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(repo_id) = repo_id else {
                continue;
            };

            sqlx::query(
                "INSERT INTO analysis_results (
                    run_id,
                    repo_id,
                    fit_score,
                    reason,
                    contributions_json,
                    reject,
                    reject_reason,
                    created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(run_id)
            .bind(repo_id)
            .bind(result.fit_score)
            .bind(&result.reason)
            .bind(encode_json("contributions_json", &result.contributions)?)
            .bind(i64::from(result.reject))
            .bind(result.reject_reason.as_deref())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            saved += 1;
        }
        tx.commit().await?;

        Ok(saved)
    }

    async fn get_search_results(
        &self,
        run_id: &str,
    ) -> Result<Option<ScoutSearchResult>, RepositoryError> {
        let Some(run) = self.get_run(run_id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT
                a.fit_score,
                a.reason,
                a.contributions_json,
                a.reject,
                a.reject_reason,
                r.github_id,
                r.owner,
                r.name,
                r.url,
                r.description,
                r.primary_language,
                r.languages_json,
                r.star_count,
                r.fork_count,
                r.open_issue_count,
                r.topics_json,
                r.license,
                r.pushed_at,
                r.created_at,
                r.good_first_issue_count,
                r.help_wanted_count
             FROM analysis_results a
             JOIN repositories r ON r.github_id = a.repo_id
             WHERE a.run_id = ?
             ORDER BY a.fit_score DESC, a.id ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        let mut repos = Vec::with_capacity(rows.len());
        for row in rows {
            let repo = repo_from_row(&row)?;
            results.push(AnalysisResult {
                repo: repo.full_name(),
                fit_score: row.try_get("fit_score")?,
                reason: row.try_get("reason")?,
                contributions: decode_json("contributions_json", row.try_get("contributions_json")?)?,
                reject: row.try_get::<i64, _>("reject")? != 0,
                reject_reason: row.try_get("reject_reason")?,
            });
            repos.push(repo);
        }

        let results = visible_results(&results);
        repos.retain(|repo| results.iter().any(|result| result.repo == repo.full_name()));

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
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM analysis_results WHERE created_at >= ?")
                .bind(since.to_rfc3339())
                .fetch_one(&self.pool)
                .await?;
        parse_u32("count", count)
    }

    async fn prune_stale_repositories(&self, max_age: Duration) -> Result<u64, RepositoryError> {
        let cutoff = Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM repositories WHERE last_seen_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn profile_from_row(row: SqliteRow) -> Result<StoredProfile, RepositoryError> {
    let skill_raw = row.try_get::<String, _>("skill_level")?;
    let skill_level = skill_raw
        .parse::<SkillLevel>()
        .map_err(|_| RepositoryError::Decode(format!("unknown skill level `{skill_raw}`")))?;

    Ok(StoredProfile {
        id: row.try_get("id")?,
        profile: DeveloperProfile {
            languages: decode_json("languages_json", row.try_get("languages_json")?)?,
            topics: decode_json("topics_json", row.try_get("topics_json")?)?,
            skill_level,
            goals: row.try_get("goals")?,
        },
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn run_from_row(row: SqliteRow) -> Result<ScoutRun, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = status_raw
        .parse::<ScoutRunStatus>()
        .map_err(|_| RepositoryError::Decode(format!("unknown run status `{status_raw}`")))?;

    Ok(ScoutRun {
        id: row.try_get("id")?,
        profile_id: row.try_get::<Option<String>, _>("profile_id")?.unwrap_or_default(),
        filters: decode_json("filters_json", row.try_get("filters_json")?)?,
        status,
        total_discovered: parse_u32("total_discovered", row.try_get("total_discovered")?)?,
        total_filtered: parse_u32("total_filtered", row.try_get("total_filtered")?)?,
        total_analyzed: parse_u32("total_analyzed", row.try_get("total_analyzed")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn repo_from_row(row: &SqliteRow) -> Result<RepoMetadata, RepositoryError> {
    Ok(RepoMetadata {
        github_id: row.try_get("github_id")?,
        owner: row.try_get("owner")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        description: row.try_get("description")?,
        primary_language: row.try_get("primary_language")?,
        languages: decode_json("languages_json", row.try_get("languages_json")?)?,
        star_count: parse_u32("star_count", row.try_get("star_count")?)?,
        fork_count: parse_u32("fork_count", row.try_get("fork_count")?)?,
        open_issue_count: parse_u32("open_issue_count", row.try_get("open_issue_count")?)?,
        topics: decode_json("topics_json", row.try_get("topics_json")?)?,
        license: row.try_get("license")?,
        pushed_at: parse_optional_timestamp("pushed_at", row.try_get("pushed_at")?)?,
        created_at: parse_optional_timestamp("created_at", row.try_get("created_at")?)?,
        good_first_issue_count: parse_u32(
            "good_first_issue_count",
            row.try_get("good_first_issue_count")?,
        )?,
        help_wanted_count: parse_u32("help_wanted_count", row.try_get("help_wanted_count")?)?,
    })
}

fn encode_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("could not encode `{column}`: {error}")))
}

fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: String,
) -> Result<T, RepositoryError> {
    serde_json::from_str(&value)
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use hiredrill_core::domain::scout::{
        AnalysisResult, DeveloperProfile, RepoMetadata, RunTotals, ScoutRunStatus, SearchFilters,
        SkillLevel,
    };

    use super::SqlScoutRepository;
    use crate::repositories::{RepositoryError, ScoutRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_repo(id: i64, name: &str) -> RepoMetadata {
        RepoMetadata {
            github_id: id,
            owner: "octo".to_string(),
            name: name.to_string(),
            url: format!("https://github.com/octo/{name}"),
            description: Some("fast things".to_string()),
            primary_language: Some("Rust".to_string()),
            languages: vec!["Rust".to_string(), "Shell".to_string()],
            star_count: 420,
            fork_count: 12,
            open_issue_count: 30,
            topics: vec!["cli".to_string()],
            license: Some("MIT".to_string()),
            pushed_at: Some(Utc::now()),
            created_at: None,
            good_first_issue_count: 3,
            help_wanted_count: 1,
        }
    }

    fn analysis(repo: &str, score: f64, reject: bool) -> AnalysisResult {
        AnalysisResult {
            repo: repo.to_string(),
            fit_score: score,
            reason: "matches profile".to_string(),
            contributions: vec!["docs".to_string()],
            reject,
            reject_reason: reject.then(|| "archived upstream".to_string()),
        }
    }

    #[tokio::test]
    async fn profile_upsert_keeps_single_default_row() {
        let pool = setup_pool().await;
        let repo = SqlScoutRepository::new(pool.clone());

        assert!(repo.get_profile().await.expect("get profile").is_none());

        let mut profile = DeveloperProfile {
            languages: vec!["Rust".to_string()],
            topics: vec!["databases".to_string()],
            skill_level: SkillLevel::Beginner,
            goals: "first contribution".to_string(),
        };
        let first = repo.save_profile(profile.clone()).await.expect("save profile");
        assert_eq!(first.id, "default");

        profile.skill_level = SkillLevel::Advanced;
        let second = repo.save_profile(profile.clone()).await.expect("update profile");
        assert_eq!(second.profile, profile);
        assert_eq!(second.created_at, first.created_at);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM developer_profiles")
            .fetch_one(&pool)
            .await
            .expect("count profiles");
        assert_eq!(count, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn run_lifecycle_and_results_join() {
        let pool = setup_pool().await;
        let repo = SqlScoutRepository::new(pool.clone());

        let filters = SearchFilters { languages: vec!["Rust".to_string()], ..SearchFilters::default() };
        let run = repo.create_run(&filters).await.expect("create run");
        assert_eq!(run.status, ScoutRunStatus::Running);

        repo.upsert_repositories(&[sample_repo(1, "alpha"), sample_repo(2, "beta")])
            .await
            .expect("upsert repos");
        let saved = repo
            .save_analysis_results(
                &run.id,
                &[
                    analysis("octo/alpha", 6.0, false),
                    analysis("octo/beta", 9.0, false),
                    analysis("octo/ghost", 10.0, false),
                ],
            )
            .await
            .expect("save analysis");
        assert_eq!(saved, 2, "unknown repos are skipped");

        repo.update_run(
            &run.id,
            ScoutRunStatus::Completed,
            RunTotals { discovered: 2, filtered: 2, analyzed: 2 },
        )
        .await
        .expect("update run");

        let stored = repo.get_run(&run.id).await.expect("get run").expect("run exists");
        assert_eq!(stored.filters, filters);
        assert_eq!(stored.total_analyzed, 2);

        let results =
            repo.get_search_results(&run.id).await.expect("load results").expect("run exists");
        assert_eq!(results.status, ScoutRunStatus::Completed);
        let order: Vec<_> = results.results.iter().map(|result| result.repo.as_str()).collect();
        assert_eq!(order, ["octo/beta", "octo/alpha"]);
        assert_eq!(results.repos.len(), 2);
        assert_eq!(results.repos[0].languages, vec!["Rust".to_string(), "Shell".to_string()]);
        pool.close().await;
    }

    #[tokio::test]
    async fn rejected_results_are_hidden_but_counted() {
        let pool = setup_pool().await;
        let repo = SqlScoutRepository::new(pool.clone());
        let run = repo.create_run(&SearchFilters::default()).await.expect("create run");
        let before = Utc::now() - Duration::seconds(5);

        repo.upsert_repositories(&[sample_repo(7, "gamma")]).await.expect("upsert");
        repo.save_analysis_results(&run.id, &[analysis("octo/gamma", 8.0, true)])
            .await
            .expect("save analysis");

        let results = repo.get_search_results(&run.id).await.expect("load").expect("run exists");
        assert!(results.results.is_empty());
        assert_eq!(repo.count_analyses_since(before).await.expect("count"), 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn updating_unknown_run_is_reported() {
        let pool = setup_pool().await;
        let repo = SqlScoutRepository::new(pool.clone());

        let error = repo
            .update_run("missing", ScoutRunStatus::Failed, RunTotals::default())
            .await
            .expect_err("unknown run must fail");
        assert!(matches!(error, RepositoryError::RunNotFound(ref id) if id == "missing"));
        assert!(repo.get_search_results("missing").await.expect("load").is_none());
        pool.close().await;
    }

    #[tokio::test]
    async fn prune_removes_repositories_not_seen_recently() {
        let pool = setup_pool().await;
        let repo = SqlScoutRepository::new(pool.clone());
        repo.upsert_repositories(&[sample_repo(1, "old"), sample_repo(2, "fresh")])
            .await
            .expect("upsert");

        let stale = (Utc::now() - Duration::days(45)).to_rfc3339();
        sqlx::query("UPDATE repositories SET last_seen_at = ? WHERE github_id = 1")
            .bind(stale)
            .execute(&pool)
            .await
            .expect("age repository");

        let pruned = repo.prune_stale_repositories(Duration::days(30)).await.expect("prune");
        assert_eq!(pruned, 1);
        pool.close().await;
    }
}
