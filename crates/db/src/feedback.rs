//! Markdown persistence for solution feedback.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use thiserror::Error;

use hiredrill_core::domain::evaluation::SolutionFeedback;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("could not write feedback file `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Clone, Debug)]
pub struct FeedbackRecord {
    pub company_name: String,
    pub role: String,
    pub drill_title: String,
    pub feedback: SolutionFeedback,
    pub timestamp: DateTime<Local>,
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Persists the record and returns its location relative to the store root.
    async fn save(&self, record: &FeedbackRecord) -> Result<String, FeedbackError>;
}

/// Writes `<base>/<dd-mm-yyyy_hh-mm>/<company>_<role>.md`, suffixing `_1`, `_2`, ... on
/// collisions.
pub struct MarkdownFeedbackStore {
    base_dir: PathBuf,
}

impl MarkdownFeedbackStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[async_trait]
impl FeedbackStore for MarkdownFeedbackStore {
    async fn save(&self, record: &FeedbackRecord) -> Result<String, FeedbackError> {
        let directory = record.timestamp.format("%d-%m-%Y_%H-%M").to_string();
        let stem = format!(
            "{}_{}",
            sanitize_filename(&record.company_name),
            sanitize_filename(&record.role)
        );
        let parent = self.base_dir.join(&directory);

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|source| FeedbackError::Write { path: parent.clone(), source })?;

        let file_name = unique_file_name(&parent, &stem).await;
        let path = parent.join(&file_name);
        tokio::fs::write(&path, format_feedback_markdown(record))
            .await
            .map_err(|source| FeedbackError::Write { path: path.clone(), source })?;

        tracing::info!(
            event_name = "feedback.saved",
            path = %path.display(),
            score = record.feedback.score,
            "saved solution feedback"
        );
        Ok(format!("{directory}/{file_name}"))
    }
}

async fn unique_file_name(parent: &Path, stem: &str) -> String {
    let mut candidate = format!("{stem}.md");
    let mut counter = 1u32;
    while tokio::fs::try_exists(parent.join(&candidate)).await.unwrap_or(false) {
        candidate = format!("{stem}_{counter}.md");
        counter += 1;
    }
    candidate
}

/// Lowercases, maps anything outside `[A-Za-z0-9_-]` to `_`, collapses runs of `_` and trims them.
pub fn sanitize_filename(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        let mapped = if ch.is_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' };
        if mapped == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(mapped);
    }
    sanitized.trim_matches('_').to_string()
}

pub fn format_feedback_markdown(record: &FeedbackRecord) -> String {
    let feedback = &record.feedback;
    let mut out = String::new();

    let _ = writeln!(out, "# Feedback: {}", record.drill_title);
    out.push('\n');
    let _ = writeln!(out, "**Company:** {}", record.company_name);
    let _ = writeln!(out, "**Role:** {}", record.role);
    let _ = writeln!(out, "**Date:** {}", record.timestamp.format("%Y-%m-%d %H:%M"));
    let _ = writeln!(out, "**Score:** {}/10 ({})", feedback.score, feedback.score_label());
    out.push_str("\n---\n\n## Strengths\n\n");

    if feedback.strengths.is_empty() {
        out.push_str("_No specific strengths noted._\n\n");
    }
    for strength in &feedback.strengths {
        let _ = write!(out, "### {}\n\n{}\n\n", strength.title, strength.description);
    }

    out.push_str("---\n\n## Areas for Improvement\n\n");
    if feedback.improvements.is_empty() {
        out.push_str("_No specific improvements noted._\n\n");
    }
    for improvement in &feedback.improvements {
        let _ = write!(
            out,
            "### {}\n\n{}\n\n**Suggestion:** {}\n\n",
            improvement.title, improvement.description, improvement.suggestion
        );
    }

    out.push_str("---\n\n## Summary for Next Practice\n\n");
    out.push_str(&feedback.summary_for_next_drill);
    out.push('\n');
    out
}
