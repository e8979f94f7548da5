//! GitHub GraphQL client for repository discovery and README retrieval.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rand::Rng;
use regex::Regex;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use hiredrill_core::domain::scout::{RepoMetadata, SearchFilters};
use hiredrill_core::sanitize::truncate_chars;

use crate::scout::analysis::README_MAX_CHARS;
use crate::scout::{RepoSearch, RepoSource};

pub const GRAPHQL_URL: &str = "https://api.github.com/graphql";
pub const PAGE_SIZE: usize = 100;
pub const README_BATCH_SIZE: usize = 20;
pub const DEFAULT_ACTIVITY_DAYS: i64 = 180;
pub const RESULT_CAP: u64 = 1_000;
pub const RATE_LIMIT_FLOOR: u64 = 100;

pub const INCOMPLETE_RESULTS_WARNING: &str =
    "Results may be incomplete (GitHub caps at 1,000). Try narrowing your filters.";
pub const RATE_LIMIT_WARNING: &str = "GitHub rate limit approaching. Returning partial results.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAYS: [Duration; 3] =
    [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];
const MAX_ATTEMPTS: usize = 3;

const SEARCH_QUERY: &str = r#"
query($q: String!, $first: Int!, $after: String) {
  search(query: $q, type: REPOSITORY, first: $first, after: $after) {
    repositoryCount
    pageInfo { hasNextPage endCursor }
    nodes {
      ... on Repository {
        databaseId
        owner { login }
        name
        url
        description
        primaryLanguage { name }
        languages(first: 10) { nodes { name } }
        stargazerCount
        forkCount
        issues(states: OPEN) { totalCount }
        repositoryTopics(first: 20) { nodes { topic { name } } }
        licenseInfo { spdxId }
        pushedAt
        createdAt
        goodFirstIssues: issues(states: OPEN, labels: ["good first issue"]) { totalCount }
        helpWantedIssues: issues(states: OPEN, labels: ["help wanted"]) { totalCount }
      }
    }
  }
  rateLimit { remaining resetAt }
}
"#;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("a GitHub token is required for repository search")]
    MissingToken,
    #[error("GitHub rejected the token (401)")]
    Unauthorized,
    #[error("GitHub returned status {status}")]
    Status { status: u16 },
    #[error("GitHub request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("GitHub GraphQL errors: {0}")]
    GraphQl(String),
    #[error("could not decode GitHub response: {0}")]
    Decode(String),
}

pub struct GitHubClient {
    http: reqwest::Client,
    token: SecretString,
    endpoint: String,
    retry_delays: [Duration; 3],
}

impl GitHubClient {
    pub fn new(token: Option<SecretString>) -> Result<Self, GitHubError> {
        let token = token
            .filter(|token| !token.expose_secret().trim().is_empty())
            .ok_or(GitHubError::MissingToken)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("hiredrill/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, token, endpoint: GRAPHQL_URL.to_string(), retry_delays: RETRY_DELAYS })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry_delays(mut self, delays: [Duration; 3]) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Posts one GraphQL document, retrying gateway errors with jittered backoff.
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, GitHubError> {
        let body = json!({ "query": query, "variables": variables });
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(&self.endpoint)
                .bearer_auth(self.token.expose_secret())
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return Err(GitHubError::Unauthorized);
            }
            if is_retryable(status) && attempt + 1 < MAX_ATTEMPTS {
                let delay = jittered(self.retry_delays[attempt]);
                tracing::warn!(
                    event_name = "github.request.retry",
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying GitHub request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                return Err(GitHubError::Status { status: status.as_u16() });
            }

            let payload: Value =
                response.json().await.map_err(|error| GitHubError::Decode(error.to_string()))?;
            if let Some(errors) = payload.get("errors").filter(|errors| !errors.is_null()) {
                return Err(GitHubError::GraphQl(errors.to_string()));
            }
            return Ok(payload.get("data").cloned().unwrap_or(Value::Null));
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status, StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE)
}

fn jittered(delay: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.0..=0.5);
    delay + delay.mul_f64(jitter)
}

#[async_trait]
impl RepoSource for GitHubClient {
    async fn search(
        &self,
        filters: &SearchFilters,
        max_repos: usize,
    ) -> Result<RepoSearch, GitHubError> {
        let query = build_search_query(filters, Utc::now().date_naive());
        let limit = max_repos.saturating_mul(2);
        let mut found = RepoSearch::default();
        let mut cursor: Option<String> = None;

        loop {
            let data = self
                .execute(SEARCH_QUERY, json!({ "q": query, "first": PAGE_SIZE, "after": cursor }))
                .await?;
            let page = parse_search_page(&data)?;

            if page.repository_count >= RESULT_CAP
                && !found.warnings.iter().any(|warning| warning == INCOMPLETE_RESULTS_WARNING)
            {
                found.warnings.push(INCOMPLETE_RESULTS_WARNING.to_string());
            }
            found.repos.extend(page.repos);

            if page.rate_limit_remaining.is_some_and(|remaining| remaining < RATE_LIMIT_FLOOR) {
                tracing::warn!(
                    event_name = "github.rate_limit.low",
                    remaining = page.rate_limit_remaining,
                    "GitHub rate limit nearly exhausted"
                );
                found.warnings.push(RATE_LIMIT_WARNING.to_string());
                break;
            }
            if !page.has_next_page || found.repos.len() >= limit {
                break;
            }
            cursor = page.end_cursor;
        }

        found.repos.truncate(limit.max(1));
        tracing::info!(
            event_name = "github.search.completed",
            discovered = found.repos.len(),
            "GitHub repository search completed"
        );
        Ok(found)
    }

    async fn fetch_readmes(
        &self,
        repos: &[(String, String)],
    ) -> Result<HashMap<String, Option<String>>, GitHubError> {
        let mut readmes = HashMap::with_capacity(repos.len());
        let valid: Vec<&(String, String)> = repos
            .iter()
            .filter(|(owner, name)| {
                let ok = is_valid_name(owner) && is_valid_name(name);
                if !ok {
                    readmes.insert(format!("{owner}/{name}"), None);
                }
                ok
            })
            .collect();

        for chunk in valid.chunks(README_BATCH_SIZE) {
            let data = self.execute(&readme_query(chunk), json!({})).await?;
            for (index, (owner, name)) in chunk.iter().enumerate() {
                let text = data
                    .get(format!("repo_{index}"))
                    .and_then(|repo| repo.get("object"))
                    .and_then(|object| object.get("text"))
                    .and_then(Value::as_str)
                    .map(|text| truncate_chars(text, README_MAX_CHARS).to_string());
                readmes.insert(format!("{owner}/{name}"), text);
            }
        }
        Ok(readmes)
    }
}

/// GitHub search qualifiers for `filters`, space separated.
pub fn build_search_query(filters: &SearchFilters, today: NaiveDate) -> String {
    let mut parts: Vec<String> =
        filters.languages.iter().map(|language| format!("language:{language}")).collect();
    parts.push(format!("stars:{}..{}", filters.min_stars, filters.max_stars));
    let since = filters
        .min_activity_date
        .unwrap_or_else(|| today - chrono::Duration::days(DEFAULT_ACTIVITY_DAYS));
    parts.push(format!("pushed:>={}", since.format("%Y-%m-%d")));
    parts.extend(filters.topics.iter().map(|topic| format!("topic:{topic}")));
    if let Some(license) = filters.license.as_deref().filter(|license| !license.is_empty()) {
        parts.push(format!("license:{license}"));
    }
    parts.push("archived:false".to_string());
    parts.push("fork:false".to_string());
    parts.join(" ")
}

fn name_regex() -> Option<&'static Regex> {
    static NAME: OnceLock<Option<Regex>> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[a-zA-Z0-9._-]+$").ok()).as_ref()
}

/// Owner and repository names are interpolated into GraphQL, so only plain names pass.
pub fn is_valid_name(value: &str) -> bool {
    name_regex().is_some_and(|regex| regex.is_match(value))
}

fn readme_query(repos: &[&(String, String)]) -> String {
    let mut query = String::from("query {\n");
    for (index, (owner, name)) in repos.iter().enumerate() {
        query.push_str(&format!(
            "  repo_{index}: repository(owner: \"{owner}\", name: \"{name}\") {{\n    \
             object(expression: \"HEAD:README.md\") {{ ... on Blob {{ text }} }}\n  }}\n"
        ));
    }
    query.push_str("  rateLimit { remaining resetAt }\n}");
    query
}

#[derive(Debug, Default)]
pub struct SearchPage {
    pub repository_count: u64,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
    pub rate_limit_remaining: Option<u64>,
    pub repos: Vec<RepoMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    search: SearchConnection,
    #[serde(default)]
    rate_limit: Option<RateLimit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchConnection {
    repository_count: u64,
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct RateLimit {
    remaining: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    database_id: i64,
    owner: Login,
    name: String,
    url: String,
    description: Option<String>,
    primary_language: Option<Named>,
    languages: Option<Nodes<Named>>,
    stargazer_count: u32,
    fork_count: u32,
    issues: Option<Count>,
    repository_topics: Option<Nodes<TopicNode>>,
    license_info: Option<License>,
    pushed_at: Option<chrono::DateTime<Utc>>,
    created_at: Option<chrono::DateTime<Utc>>,
    good_first_issues: Option<Count>,
    help_wanted_issues: Option<Count>,
}

#[derive(Deserialize)]
struct Login {
    login: String,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Count {
    total_count: u32,
}

#[derive(Deserialize)]
struct TopicNode {
    topic: Named,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct License {
    spdx_id: Option<String>,
}

impl From<RepoNode> for RepoMetadata {
    fn from(node: RepoNode) -> Self {
        Self {
            github_id: node.database_id,
            owner: node.owner.login,
            name: node.name,
            url: node.url,
            description: node.description,
            primary_language: node.primary_language.map(|language| language.name),
            languages: node
                .languages
                .map(|languages| languages.nodes.into_iter().map(|language| language.name).collect())
                .unwrap_or_default(),
            star_count: node.stargazer_count,
            fork_count: node.fork_count,
            open_issue_count: node.issues.map_or(0, |count| count.total_count),
            topics: node
                .repository_topics
                .map(|topics| topics.nodes.into_iter().map(|node| node.topic.name).collect())
                .unwrap_or_default(),
            license: node.license_info.and_then(|license| license.spdx_id),
            pushed_at: node.pushed_at,
            created_at: node.created_at,
            good_first_issue_count: node.good_first_issues.map_or(0, |count| count.total_count),
            help_wanted_count: node.help_wanted_issues.map_or(0, |count| count.total_count),
        }
    }
}

/// Decodes one search page. Nodes that are not repositories (empty objects) are skipped.
pub fn parse_search_page(data: &Value) -> Result<SearchPage, GitHubError> {
    let decoded: SearchData = serde_json::from_value(data.clone())
        .map_err(|error| GitHubError::Decode(error.to_string()))?;
    let repos = decoded
        .search
        .nodes
        .into_iter()
        .filter(|node| node.get("databaseId").is_some_and(|id| !id.is_null()))
        .map(|node| {
            serde_json::from_value::<RepoNode>(node)
                .map(RepoMetadata::from)
                .map_err(|error| GitHubError::Decode(error.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SearchPage {
        repository_count: decoded.search.repository_count,
        has_next_page: decoded.search.page_info.has_next_page,
        end_cursor: decoded.search.page_info.end_cursor,
        rate_limit_remaining: decoded.rate_limit.map(|limit| limit.remaining),
        repos,
    })
}
