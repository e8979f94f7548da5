use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hiredrill_core::config::AppConfig;
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use crate::commands::{load_config, CommandResult};

const COMMAND: &str = "config";

/// One rendered setting: dotted key, display value and the env vars that can set it.
struct Setting {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Setting {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    CommandResult { exit_code: 0, output: render(&config) }
}

pub fn render(config: &AppConfig) -> String {
    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(config) {
        let source =
            field_source(setting.key, setting.env_keys, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", setting.key, setting.value));
    }
    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let database = &config.database;
    let llm = &config.llm;
    let agents = &config.agents;
    let scout = &config.scout;
    let server = &config.server;

    vec![
        Setting::new("database.url", &database.url, &["HIREDRILL_DATABASE_URL"]),
        Setting::new(
            "database.max_connections",
            database.max_connections.to_string(),
            &["HIREDRILL_DATABASE_MAX_CONNECTIONS"],
        ),
        Setting::new(
            "database.timeout_secs",
            database.timeout_secs.to_string(),
            &["HIREDRILL_DATABASE_TIMEOUT_SECS"],
        ),
        Setting::new("llm.provider", format!("{:?}", llm.provider), &["HIREDRILL_LLM_PROVIDER"]),
        Setting::new(
            "llm.api_key",
            redact_secret(llm.api_key.as_ref()),
            &["HIREDRILL_LLM_API_KEY"],
        ),
        Setting::new(
            "llm.base_url",
            llm.base_url.as_deref().unwrap_or("<unset>"),
            &["HIREDRILL_LLM_BASE_URL"],
        ),
        Setting::new("llm.model", &llm.model, &["HIREDRILL_LLM_MODEL"]),
        Setting::new(
            "llm.guardrail_model",
            &llm.guardrail_model,
            &["HIREDRILL_LLM_GUARDRAIL_MODEL"],
        ),
        Setting::new(
            "llm.request_timeout_secs",
            llm.request_timeout_secs.to_string(),
            &["HIREDRILL_LLM_REQUEST_TIMEOUT_SECS"],
        ),
        Setting::new(
            "llm.max_retries",
            llm.max_retries.to_string(),
            &["HIREDRILL_LLM_MAX_RETRIES"],
        ),
        Setting::new("llm.web_search", llm.web_search.to_string(), &["HIREDRILL_LLM_WEB_SEARCH"]),
        Setting::new(
            "agents.research_timeout_secs",
            agents.research_timeout_secs.to_string(),
            &["HIREDRILL_AGENTS_RESEARCH_TIMEOUT_SECS"],
        ),
        Setting::new(
            "agents.drill_timeout_secs",
            agents.drill_timeout_secs.to_string(),
            &["HIREDRILL_AGENTS_DRILL_TIMEOUT_SECS"],
        ),
        Setting::new(
            "agents.evaluation_timeout_secs",
            agents.evaluation_timeout_secs.to_string(),
            &["HIREDRILL_AGENTS_EVALUATION_TIMEOUT_SECS"],
        ),
        Setting::new(
            "agents.max_searches",
            agents.max_searches.to_string(),
            &["HIREDRILL_AGENTS_MAX_SEARCHES"],
        ),
        Setting::new(
            "agents.generator_count",
            agents.generator_count.to_string(),
            &["HIREDRILL_AGENTS_GENERATOR_COUNT"],
        ),
        Setting::new(
            "scout.github_token",
            redact_secret(scout.github_token.as_ref()),
            &["HIREDRILL_SCOUT_GITHUB_TOKEN", "GITHUB_TOKEN"],
        ),
        Setting::new(
            "scout.max_repos",
            scout.max_repos.to_string(),
            &["HIREDRILL_SCOUT_MAX_REPOS"],
        ),
        Setting::new(
            "scout.batch_size",
            scout.batch_size.to_string(),
            &["HIREDRILL_SCOUT_BATCH_SIZE"],
        ),
        Setting::new(
            "scout.analysis_timeout_secs",
            scout.analysis_timeout_secs.to_string(),
            &["HIREDRILL_SCOUT_ANALYSIS_TIMEOUT_SECS"],
        ),
        Setting::new(
            "scout.max_daily_analyses",
            scout.max_daily_analyses.to_string(),
            &["HIREDRILL_SCOUT_MAX_DAILY_ANALYSES"],
        ),
        Setting::new(
            "scout.searches_per_hour",
            scout.searches_per_hour.to_string(),
            &["HIREDRILL_SCOUT_SEARCHES_PER_HOUR"],
        ),
        Setting::new(
            "session.ttl_hours",
            config.session.ttl_hours.to_string(),
            &["HIREDRILL_SESSION_TTL_HOURS"],
        ),
        Setting::new(
            "feedback.base_dir",
            config.feedback.base_dir.display().to_string(),
            &["HIREDRILL_FEEDBACK_BASE_DIR"],
        ),
        Setting::new(
            "server.bind_address",
            &server.bind_address,
            &["HIREDRILL_SERVER_BIND_ADDRESS"],
        ),
        Setting::new("server.port", server.port.to_string(), &["HIREDRILL_SERVER_PORT"]),
        Setting::new(
            "server.cors_origins",
            server.cors_origins.join(","),
            &["HIREDRILL_SERVER_CORS_ORIGINS"],
        ),
        Setting::new(
            "server.graceful_shutdown_secs",
            server.graceful_shutdown_secs.to_string(),
            &["HIREDRILL_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Setting::new(
            "logging.level",
            &config.logging.level,
            &["HIREDRILL_LOGGING_LEVEL", "HIREDRILL_LOG_LEVEL"],
        ),
        Setting::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["HIREDRILL_LOGGING_FORMAT", "HIREDRILL_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["hiredrill.toml", "config/hiredrill.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps a recognizable vendor prefix (`sk-`, `ghp_`) and hides the rest.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.find(['-', '_']) {
        Some(index) if index <= 4 => format!("{}***", &trimmed[..=index]),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_keep_only_their_prefix() {
        let key = SecretString::from("sk-live-abcdef".to_string());
        assert_eq!(redact_secret(Some(&key)), "sk-***");
        let token = SecretString::from("ghp_abcdef".to_string());
        assert_eq!(redact_secret(Some(&token)), "ghp_***");
        let opaque = SecretString::from("abcdefghijkl".to_string());
        assert_eq!(redact_secret(Some(&opaque)), "<redacted>");
        assert_eq!(redact_secret(None), "<unset>");
    }

    #[test]
    fn dotted_paths_resolve_in_toml_documents() {
        let doc: toml::Value = "[llm]\nmodel = \"gpt-4.1\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
