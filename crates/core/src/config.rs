use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub agents: AgentsConfig,
    pub scout: ScoutConfig,
    pub session: SessionConfig,
    pub feedback: FeedbackConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    /// Model used by the guardrail classifier agents.
    pub guardrail_model: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    /// Bind the hosted web search tool to research agents when the provider supports it.
    pub web_search: bool,
}

/// Per-stage timeouts and fan-out widths for the agent pipelines.
#[derive(Clone, Debug)]
pub struct AgentsConfig {
    pub research_timeout_secs: u64,
    pub drill_timeout_secs: u64,
    pub evaluation_timeout_secs: u64,
    /// Upper bound on search plan entries executed per research run.
    pub max_searches: usize,
    /// Number of drill generators launched per round (1..=3).
    pub generator_count: usize,
}

#[derive(Clone, Debug)]
pub struct ScoutConfig {
    pub github_token: Option<SecretString>,
    pub max_repos: usize,
    pub batch_size: usize,
    pub analysis_timeout_secs: u64,
    pub max_daily_analyses: u32,
    pub searches_per_hour: u32,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub ttl_hours: u64,
}

#[derive(Clone, Debug)]
pub struct FeedbackConfig {
    pub base_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Gemini,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub generator_count: Option<usize>,
    pub github_token: Option<String>,
    pub feedback_base_dir: Option<PathBuf>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("`{path}` is not valid hiredrill TOML: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` does not exist")]
    MissingConfigFile(PathBuf),
    #[error("placeholder `${{{var}}}` refers to an unset environment variable")]
    UnsetPlaceholder { var: String },
    #[error("`${{` placeholder is missing its closing `}}`")]
    UnterminatedPlaceholder,
    #[error("`{key}` has an unusable value `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://hiredrill.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                guardrail_model: "gpt-4o-mini".to_string(),
                request_timeout_secs: 120,
                max_retries: 2,
                web_search: true,
            },
            agents: AgentsConfig {
                research_timeout_secs: 60,
                drill_timeout_secs: 120,
                evaluation_timeout_secs: 120,
                max_searches: 2,
                generator_count: 3,
            },
            scout: ScoutConfig {
                github_token: None,
                max_repos: 50,
                batch_size: 5,
                analysis_timeout_secs: 120,
                max_daily_analyses: 200,
                searches_per_hour: 5,
            },
            session: SessionConfig { ttl_hours: 24 },
            feedback: FeedbackConfig { base_dir: PathBuf::from("docs/drills/feedbacks") },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                cors_origins: vec!["http://localhost:3000".to_string()],
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmProvider {
    /// OpenAI-compatible chat completions root for the provider.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn supports_web_search(self) -> bool {
        matches!(self, Self::OpenAi)
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn web_search_enabled(&self) -> bool {
        self.web_search && self.provider.supports_web_search()
    }
}

impl AgentsConfig {
    pub fn research_timeout(&self) -> Duration {
        Duration::from_secs(self.research_timeout_secs)
    }

    pub fn drill_timeout(&self) -> Duration {
        Duration::from_secs(self.drill_timeout_secs)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }
}

impl ScoutConfig {
    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|gemini|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("hiredrill.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(guardrail_model) = llm.guardrail_model {
                self.llm.guardrail_model = guardrail_model;
            }
            if let Some(request_timeout_secs) = llm.request_timeout_secs {
                self.llm.request_timeout_secs = request_timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
            if let Some(web_search) = llm.web_search {
                self.llm.web_search = web_search;
            }
        }

        if let Some(agents) = patch.agents {
            if let Some(value) = agents.research_timeout_secs {
                self.agents.research_timeout_secs = value;
            }
            if let Some(value) = agents.drill_timeout_secs {
                self.agents.drill_timeout_secs = value;
            }
            if let Some(value) = agents.evaluation_timeout_secs {
                self.agents.evaluation_timeout_secs = value;
            }
            if let Some(value) = agents.max_searches {
                self.agents.max_searches = value;
            }
            if let Some(value) = agents.generator_count {
                self.agents.generator_count = value;
            }
        }

        if let Some(scout) = patch.scout {
            if let Some(github_token_value) = scout.github_token {
                self.scout.github_token = Some(secret_value(github_token_value));
            }
            if let Some(value) = scout.max_repos {
                self.scout.max_repos = value;
            }
            if let Some(value) = scout.batch_size {
                self.scout.batch_size = value;
            }
            if let Some(value) = scout.analysis_timeout_secs {
                self.scout.analysis_timeout_secs = value;
            }
            if let Some(value) = scout.max_daily_analyses {
                self.scout.max_daily_analyses = value;
            }
            if let Some(value) = scout.searches_per_hour {
                self.scout.searches_per_hour = value;
            }
        }

        if let Some(session) = patch.session {
            if let Some(ttl_hours) = session.ttl_hours {
                self.session.ttl_hours = ttl_hours;
            }
        }

        if let Some(feedback) = patch.feedback {
            if let Some(base_dir) = feedback.base_dir {
                self.feedback.base_dir = base_dir;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(cors_origins) = server.cors_origins {
                self.server.cors_origins = cors_origins;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HIREDRILL_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("HIREDRILL_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("HIREDRILL_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("HIREDRILL_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HIREDRILL_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("HIREDRILL_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HIREDRILL_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("HIREDRILL_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("HIREDRILL_LLM_GUARDRAIL_MODEL") {
            self.llm.guardrail_model = value;
        }
        if let Some(value) = read_env("HIREDRILL_LLM_REQUEST_TIMEOUT_SECS") {
            self.llm.request_timeout_secs =
                parse_u64("HIREDRILL_LLM_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("HIREDRILL_LLM_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_LLM_WEB_SEARCH") {
            self.llm.web_search = parse_bool("HIREDRILL_LLM_WEB_SEARCH", &value)?;
        }

        if let Some(value) = read_env("HIREDRILL_AGENTS_RESEARCH_TIMEOUT_SECS") {
            self.agents.research_timeout_secs =
                parse_u64("HIREDRILL_AGENTS_RESEARCH_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_AGENTS_DRILL_TIMEOUT_SECS") {
            self.agents.drill_timeout_secs =
                parse_u64("HIREDRILL_AGENTS_DRILL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_AGENTS_EVALUATION_TIMEOUT_SECS") {
            self.agents.evaluation_timeout_secs =
                parse_u64("HIREDRILL_AGENTS_EVALUATION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_AGENTS_MAX_SEARCHES") {
            self.agents.max_searches = parse_usize("HIREDRILL_AGENTS_MAX_SEARCHES", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_AGENTS_GENERATOR_COUNT") {
            self.agents.generator_count = parse_usize("HIREDRILL_AGENTS_GENERATOR_COUNT", &value)?;
        }

        let github_token =
            read_env("HIREDRILL_SCOUT_GITHUB_TOKEN").or_else(|| read_env("GITHUB_TOKEN"));
        if let Some(value) = github_token {
            self.scout.github_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("HIREDRILL_SCOUT_MAX_REPOS") {
            self.scout.max_repos = parse_usize("HIREDRILL_SCOUT_MAX_REPOS", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_SCOUT_BATCH_SIZE") {
            self.scout.batch_size = parse_usize("HIREDRILL_SCOUT_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_SCOUT_ANALYSIS_TIMEOUT_SECS") {
            self.scout.analysis_timeout_secs =
                parse_u64("HIREDRILL_SCOUT_ANALYSIS_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_SCOUT_MAX_DAILY_ANALYSES") {
            self.scout.max_daily_analyses =
                parse_u32("HIREDRILL_SCOUT_MAX_DAILY_ANALYSES", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_SCOUT_SEARCHES_PER_HOUR") {
            self.scout.searches_per_hour = parse_u32("HIREDRILL_SCOUT_SEARCHES_PER_HOUR", &value)?;
        }

        if let Some(value) = read_env("HIREDRILL_SESSION_TTL_HOURS") {
            self.session.ttl_hours = parse_u64("HIREDRILL_SESSION_TTL_HOURS", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_FEEDBACK_BASE_DIR") {
            self.feedback.base_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("HIREDRILL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HIREDRILL_SERVER_PORT") {
            self.server.port = parse_u16("HIREDRILL_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("HIREDRILL_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = value
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
        if let Some(value) = read_env("HIREDRILL_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HIREDRILL_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("HIREDRILL_LOGGING_LEVEL").or_else(|| read_env("HIREDRILL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HIREDRILL_LOGGING_FORMAT").or_else(|| read_env("HIREDRILL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(generator_count) = overrides.generator_count {
            self.agents.generator_count = generator_count;
        }
        if let Some(github_token) = overrides.github_token {
            self.scout.github_token = Some(secret_value(github_token));
        }
        if let Some(feedback_base_dir) = overrides.feedback_base_dir {
            self.feedback.base_dir = feedback_base_dir;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_agents(&self.agents)?;
        validate_scout(&self.scout)?;
        validate_session(&self.session)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

const CONFIG_CANDIDATES: [&str; 2] = ["hiredrill.toml", "config/hiredrill.toml"];

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => CONFIG_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.into(), source })?;
    toml::from_str(&interpolate_env_vars(&text)?)
        .map_err(|source| ConfigError::ParseFile { path: path.into(), source })
}

/// Expands `${VAR}` placeholders from the process environment.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let placeholder = &rest[start + 2..];
        let end = placeholder.find('}').ok_or(ConfigError::UnterminatedPlaceholder)?;
        let var = placeholder[..end].trim();
        let value =
            env::var(var).map_err(|_| ConfigError::UnsetPlaceholder { var: var.to_string() })?;
        output.push_str(&value);
        rest = &placeholder[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.request_timeout_secs == 0 || llm.request_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.request_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.model.trim().is_empty() || llm.guardrail_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model and llm.guardrail_model must not be empty".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Gemini => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/gemini providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {}
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_agents(agents: &AgentsConfig) -> Result<(), ConfigError> {
    let timeouts = [
        ("agents.research_timeout_secs", agents.research_timeout_secs),
        ("agents.drill_timeout_secs", agents.drill_timeout_secs),
        ("agents.evaluation_timeout_secs", agents.evaluation_timeout_secs),
    ];
    for (key, value) in timeouts {
        if value == 0 || value > 600 {
            return Err(ConfigError::Validation(format!("{key} must be in range 1..=600")));
        }
    }

    if agents.max_searches == 0 || agents.max_searches > 10 {
        return Err(ConfigError::Validation(
            "agents.max_searches must be in range 1..=10".to_string(),
        ));
    }

    if agents.generator_count == 0 || agents.generator_count > 3 {
        return Err(ConfigError::Validation(
            "agents.generator_count must be in range 1..=3".to_string(),
        ));
    }

    Ok(())
}

fn validate_scout(scout: &ScoutConfig) -> Result<(), ConfigError> {
    if scout.max_repos == 0 || scout.max_repos > 500 {
        return Err(ConfigError::Validation("scout.max_repos must be in range 1..=500".to_string()));
    }

    if scout.batch_size == 0 {
        return Err(ConfigError::Validation(
            "scout.batch_size must be greater than zero".to_string(),
        ));
    }

    if scout.analysis_timeout_secs == 0 || scout.analysis_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "scout.analysis_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if scout.max_daily_analyses == 0 || scout.searches_per_hour == 0 {
        return Err(ConfigError::Validation(
            "scout.max_daily_analyses and scout.searches_per_hour must be greater than zero"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.ttl_hours == 0 {
        return Err(ConfigError::Validation(
            "session.ttl_hours must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if let Some(origin) = server
        .cors_origins
        .iter()
        .find(|origin| !origin.starts_with("http://") && !origin.starts_with("https://"))
    {
        return Err(ConfigError::Validation(format!(
            "server.cors_origins entry `{origin}` must start with http:// or https://"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    agents: Option<AgentsPatch>,
    scout: Option<ScoutPatch>,
    session: Option<SessionPatch>,
    feedback: Option<FeedbackPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    guardrail_model: Option<String>,
    request_timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    web_search: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentsPatch {
    research_timeout_secs: Option<u64>,
    drill_timeout_secs: Option<u64>,
    evaluation_timeout_secs: Option<u64>,
    max_searches: Option<usize>,
    generator_count: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ScoutPatch {
    github_token: Option<String>,
    max_repos: Option<usize>,
    batch_size: Option<usize>,
    analysis_timeout_secs: Option<u64>,
    max_daily_analyses: Option<u32>,
    searches_per_hour: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    ttl_hours: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FeedbackPatch {
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    cors_origins: Option<Vec<String>>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        interpolate_env_vars, AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_HIREDRILL_LLM_KEY", "sk-from-env");
        env::set_var("TEST_HIREDRILL_GITHUB_TOKEN", "ghp-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("hiredrill.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${TEST_HIREDRILL_LLM_KEY}"

[scout]
github_token = "${TEST_HIREDRILL_GITHUB_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "llm api key should be loaded from environment",
            )?;
            ensure(
                config.scout.github_token.as_ref().map(|token| token.expose_secret())
                    == Some("ghp-from-env"),
                "github token should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_HIREDRILL_LLM_KEY", "TEST_HIREDRILL_GITHUB_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HIREDRILL_LLM_API_KEY", "sk-test");
        env::set_var("HIREDRILL_LOG_LEVEL", "warn");
        env::set_var("HIREDRILL_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["HIREDRILL_LLM_API_KEY", "HIREDRILL_LOG_LEVEL", "HIREDRILL_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HIREDRILL_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("HIREDRILL_LLM_API_KEY", "sk-from-env");
        env::set_var("HIREDRILL_AGENTS_GENERATOR_COUNT", "2");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("hiredrill.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[llm]
api_key = "sk-from-file"

[agents]
generator_count = 1
research_timeout_secs = 45

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "env api key should win over file and defaults",
            )?;
            ensure(config.agents.generator_count == 2, "env generator count should win over file")?;
            ensure(
                config.agents.research_timeout_secs == 45,
                "file research timeout should win over default",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "HIREDRILL_DATABASE_URL",
            "HIREDRILL_LLM_API_KEY",
            "HIREDRILL_AGENTS_GENERATOR_COUNT",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HIREDRILL_LLM_API_KEY", "sk-test");
        env::set_var("HIREDRILL_AGENTS_GENERATOR_COUNT", "4");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("agents.generator_count")
            );
            ensure(has_message, "validation failure should mention agents.generator_count")
        })();

        clear_vars(&["HIREDRILL_LLM_API_KEY", "HIREDRILL_AGENTS_GENERATOR_COUNT"]);
        result
    }

    #[test]
    fn hosted_provider_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["HIREDRILL_LLM_API_KEY", "HIREDRILL_LLM_PROVIDER"]);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected missing api key to fail validation".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("llm.api_key")),
            "validation failure should mention llm.api_key",
        )?;

        let ollama = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::Ollama),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("ollama config should not need a key: {err}"))?;
        ensure(
            ollama.llm.effective_base_url() == "http://localhost:11434/v1",
            "ollama should default to the local endpoint",
        )?;
        ensure(!ollama.llm.web_search_enabled(), "web search is unavailable on ollama")
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HIREDRILL_LLM_API_KEY", "sk-test");
        env::set_var("HIREDRILL_SCOUT_BATCH_SIZE", "lots");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override to fail".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "HIREDRILL_SCOUT_BATCH_SIZE", "error should name the env key")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["HIREDRILL_LLM_API_KEY", "HIREDRILL_SCOUT_BATCH_SIZE"]);
        result
    }

    #[test]
    fn missing_required_file_is_reported() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("absent.toml");

        let result = AppConfig::load(LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            ..LoadOptions::default()
        });

        match result {
            Err(ConfigError::MissingConfigFile(reported)) => {
                ensure(reported == path, "missing file error should carry the requested path")
            }
            _ => Err("expected missing config file error".to_string()),
        }
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HIREDRILL_LLM_API_KEY", "sk-secret-value");
        env::set_var("HIREDRILL_SCOUT_GITHUB_TOKEN", "ghp-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let rendered = format!("{config:?}");

            ensure(!rendered.contains("sk-secret-value"), "api key must not appear in debug")?;
            ensure(!rendered.contains("ghp-secret-value"), "github token must not appear in debug")
        })();

        clear_vars(&["HIREDRILL_LLM_API_KEY", "HIREDRILL_SCOUT_GITHUB_TOKEN"]);
        result
    }

    #[test]
    fn broken_placeholders_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["TEST_HIREDRILL_UNSET_VAR"]);

        ensure(
            matches!(
                interpolate_env_vars("token = \"${TEST_HIREDRILL_UNSET_VAR}\""),
                Err(ConfigError::UnsetPlaceholder { ref var }) if var == "TEST_HIREDRILL_UNSET_VAR"
            ),
            "unset variables should be named in the error",
        )?;
        ensure(
            matches!(interpolate_env_vars("model = \"${OPEN"), Err(ConfigError::UnterminatedPlaceholder)),
            "a placeholder without `}` should be rejected",
        )?;
        ensure(
            interpolate_env_vars("port = 8080").ok().as_deref() == Some("port = 8080"),
            "text without placeholders passes through",
        )
    }
}
