//! Batched repository analysis through the repo analyst agent.

use std::fmt::Write as _;

use thiserror::Error;

use hiredrill_core::domain::scout::{AnalysisResult, DeveloperProfile, RepoAnalysisBatch, RepoMetadata};
use hiredrill_core::sanitize::truncate_chars;

use crate::invoke::AgentError;
use crate::runtime::AgentRuntime;

pub const README_MAX_CHARS: usize = 16_000;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("repos and readmes must have the same length: {repos} vs {readmes}")]
    LengthMismatch { repos: usize, readmes: usize },
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl BatchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Agent(error) if error.is_timeout())
    }
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or("N/A")
}

pub fn batch_input(
    profile: &DeveloperProfile,
    repos: &[RepoMetadata],
    readmes: &[Option<String>],
) -> Result<String, BatchError> {
    if repos.len() != readmes.len() {
        return Err(BatchError::LengthMismatch { repos: repos.len(), readmes: readmes.len() });
    }

    let mut out = String::from("DEVELOPER PROFILE:\n");
    let _ = writeln!(out, "Languages: {}", profile.languages.join(", "));
    let _ = writeln!(out, "Topics: {}", profile.topics.join(", "));
    let _ = writeln!(out, "Skill Level: {}", profile.skill_level.as_str());
    let _ = writeln!(out, "Goals: {}", profile.goals);
    out.push_str("\nREPOSITORIES TO ANALYZE:\n");

    for (repo, readme) in repos.iter().zip(readmes) {
        let pushed_at = repo.pushed_at.map(|at| at.to_rfc3339());
        let _ = writeln!(out, "\n--- {} ---", repo.full_name());
        let _ = writeln!(out, "URL: {}", repo.url);
        let _ = writeln!(out, "Description: {}", or_na(repo.description.as_deref()));
        let _ = writeln!(out, "Primary Language: {}", or_na(repo.primary_language.as_deref()));
        let _ = writeln!(out, "Languages: {}", repo.languages.join(", "));
        let _ = writeln!(out, "Stars: {}", repo.star_count);
        let _ = writeln!(out, "Open Issues: {}", repo.open_issue_count);
        let _ = writeln!(out, "Good First Issues: {}", repo.good_first_issue_count);
        let _ = writeln!(out, "Help Wanted: {}", repo.help_wanted_count);
        let _ = writeln!(out, "Topics: {}", repo.topics.join(", "));
        let _ = writeln!(out, "License: {}", or_na(repo.license.as_deref()));
        let _ = writeln!(out, "Last Pushed: {}", or_na(pushed_at.as_deref()));
        match readme.as_deref().filter(|text| !text.is_empty()) {
            Some(text) => {
                let _ = writeln!(out, "README (excerpt):\n{}", truncate_chars(text, README_MAX_CHARS));
            }
            None => out.push_str("README: Not available\n"),
        }
    }

    Ok(out.trim_end().to_string())
}

/// Splits `items` into consecutive batches of at most `size`.
pub fn batches<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// Analyzes one batch. An agent that finishes without output yields no results.
pub async fn analyze_batch(
    runtime: &AgentRuntime,
    profile: &DeveloperProfile,
    repos: &[RepoMetadata],
    readmes: &[Option<String>],
    correlation_id: &str,
) -> Result<Vec<AnalysisResult>, BatchError> {
    let input = batch_input(profile, repos, readmes)?;
    let output: Option<RepoAnalysisBatch> = runtime
        .invoker()
        .run(
            &runtime.catalog().repo_analyst,
            &input,
            correlation_id,
            runtime.settings().analysis_timeout,
        )
        .await?;
    Ok(output.map(|batch| batch.results).unwrap_or_default())
}
