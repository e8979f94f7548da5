use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const MAX_GOALS_CHARS: usize = 500;
pub const DEFAULT_PROFILE_ID: &str = "default";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl SkillLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl FromStr for SkillLevel {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => {
                Err(DomainError::UnknownValue { kind: "skill level", value: other.to_string() })
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeveloperProfile {
    pub languages: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub skill_level: SkillLevel,
    #[serde(default)]
    pub goals: String,
}

impl DeveloperProfile {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.languages.iter().all(|language| language.trim().is_empty()) {
            return Err(DomainError::InvalidSelection {
                field: "languages",
                message: "at least one language is required".to_string(),
            });
        }
        if self.goals.chars().count() > MAX_GOALS_CHARS {
            return Err(DomainError::InvalidSelection {
                field: "goals",
                message: format!("goals must be at most {MAX_GOALS_CHARS} characters"),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default = "default_min_stars")]
    pub min_stars: u32,
    #[serde(default = "default_max_stars")]
    pub max_stars: u32,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub min_activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub license: Option<String>,
}

fn default_min_stars() -> u32 {
    10
}

fn default_max_stars() -> u32 {
    50_000
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            languages: Vec::new(),
            min_stars: default_min_stars(),
            max_stars: default_max_stars(),
            topics: Vec::new(),
            min_activity_date: None,
            license: None,
        }
    }
}

impl SearchFilters {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.min_stars > self.max_stars {
            return Err(DomainError::InvalidSelection {
                field: "min_stars",
                message: "min_stars must be less than or equal to max_stars".to_string(),
            });
        }
        Ok(())
    }

    pub fn without_topics(&self) -> Self {
        Self { topics: Vec::new(), ..self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub github_id: i64,
    pub owner: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub primary_language: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    pub star_count: u32,
    pub fork_count: u32,
    pub open_issue_count: u32,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub good_first_issue_count: u32,
    #[serde(default)]
    pub help_wanted_count: u32,
}

impl RepoMetadata {
    /// `owner/name`, the key analysis results refer to.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    /// Repository in `owner/name` form.
    pub repo: String,
    #[schemars(range(min = 0.0, max = 10.0))]
    pub fit_score: f64,
    pub reason: String,
    #[serde(default)]
    pub contributions: Vec<String>,
    #[serde(default)]
    pub reject: bool,
    #[serde(default)]
    pub reject_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RepoAnalysisBatch {
    pub results: Vec<AnalysisResult>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoutRunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    Partial,
}

impl ScoutRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Partial => "partial",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for ScoutRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoutRunStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "partial" => Ok(Self::Partial),
            other => {
                Err(DomainError::UnknownValue { kind: "run status", value: other.to_string() })
            }
        }
    }
}

/// The developer profile as stored, with its bookkeeping columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub id: String,
    pub profile: DeveloperProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub discovered: u32,
    pub filtered: u32,
    pub analyzed: u32,
}

/// Persisted bookkeeping for one scout search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoutRun {
    pub id: String,
    pub profile_id: String,
    pub filters: SearchFilters,
    pub status: ScoutRunStatus,
    pub total_discovered: u32,
    pub total_filtered: u32,
    pub total_analyzed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoutSearchResult {
    pub run_id: String,
    pub status: ScoutRunStatus,
    pub total_discovered: u32,
    pub total_filtered: u32,
    pub total_analyzed: u32,
    pub results: Vec<AnalysisResult>,
    #[serde(default)]
    pub repos: Vec<RepoMetadata>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Non-rejected results ordered by descending fit score.
pub fn visible_results(results: &[AnalysisResult]) -> Vec<AnalysisResult> {
    let mut visible: Vec<AnalysisResult> =
        results.iter().filter(|result| !result.reject).cloned().collect();
    visible.sort_by(|left, right| right.fit_score.total_cmp(&left.fit_score));
    visible
}

#[cfg(test)]
mod tests {
    use super::{visible_results, AnalysisResult, DeveloperProfile, SearchFilters, SkillLevel};

    fn result(repo: &str, score: f64, reject: bool) -> AnalysisResult {
        AnalysisResult {
            repo: repo.to_string(),
            fit_score: score,
            reason: "reason".to_string(),
            contributions: Vec::new(),
            reject,
            reject_reason: None,
        }
    }

    #[test]
    fn filters_default_star_range() {
        let filters: SearchFilters = serde_json::from_str("{}").expect("empty filters parse");
        assert_eq!(filters.min_stars, 10);
        assert_eq!(filters.max_stars, 50_000);
        assert!(filters.validate().is_ok());
    }

    #[test]
    fn inverted_star_range_is_rejected() {
        let filters = SearchFilters { min_stars: 500, max_stars: 20, ..SearchFilters::default() };
        assert!(filters.validate().is_err());
    }

    #[test]
    fn profile_requires_a_language_and_bounded_goals() {
        let mut profile = DeveloperProfile {
            languages: vec!["rust".to_string()],
            topics: Vec::new(),
            skill_level: SkillLevel::Beginner,
            goals: "learn async".to_string(),
        };
        assert!(profile.validate().is_ok());

        profile.goals = "x".repeat(501);
        assert!(profile.validate().is_err());

        profile.goals.clear();
        profile.languages.clear();
        assert!(profile.validate().is_err());
    }

    #[test]
    fn visible_results_drop_rejects_and_sort_by_score() {
        let visible = visible_results(&[
            result("a/low", 3.0, false),
            result("a/rejected", 9.5, true),
            result("a/high", 8.0, false),
        ]);

        let repos: Vec<_> = visible.iter().map(|entry| entry.repo.as_str()).collect();
        assert_eq!(repos, ["a/high", "a/low"]);
    }
}
