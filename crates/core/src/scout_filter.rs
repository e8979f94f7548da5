//! Pure filtering and ranking of discovered repositories.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::scout::RepoMetadata;

const TUTORIAL_PATTERN: &str = r"(?i)\bawesome[-_]|\btutorial\b|\blearn[-_]|\bcheatsheet\b|\bcourse\b|\binterview[-_]prep\b|\bcurated\s+list\b|\bcoding[-_]challenge\b";

fn tutorial_regex() -> Option<&'static Regex> {
    static TUTORIAL: OnceLock<Option<Regex>> = OnceLock::new();
    TUTORIAL.get_or_init(|| Regex::new(TUTORIAL_PATTERN).ok()).as_ref()
}

pub fn is_tutorial_or_awesome_list(repo: &RepoMetadata) -> bool {
    let text = format!("{} {}", repo.name, repo.description.as_deref().unwrap_or_default());
    tutorial_regex().is_some_and(|regex| regex.is_match(&text))
}

pub fn has_open_issues(repo: &RepoMetadata) -> bool {
    repo.open_issue_count > 0
}

/// Contribution-friendliness score; the maximum is 45.
pub fn contribution_score(repo: &RepoMetadata) -> f64 {
    f64::from(repo.good_first_issue_count.min(10)) * 2.0
        + f64::from(repo.help_wanted_count.min(10)) * 1.5
        + f64::from(repo.open_issue_count.min(100)) * 0.1
}

/// Drops tutorials, issue-less repos and out-of-range star counts, then sorts by
/// descending contribution score. Ties keep discovery order.
pub fn apply_filters(repos: &[RepoMetadata], min_stars: u32, max_stars: u32) -> Vec<RepoMetadata> {
    let mut filtered: Vec<RepoMetadata> = repos
        .iter()
        .filter(|repo| !is_tutorial_or_awesome_list(repo))
        .filter(|repo| has_open_issues(repo))
        .filter(|repo| (min_stars..=max_stars).contains(&repo.star_count))
        .cloned()
        .collect();
    filtered.sort_by(|left, right| contribution_score(right).total_cmp(&contribution_score(left)));
    filtered
}
