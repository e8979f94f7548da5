use std::env;
use std::sync::{Arc, Mutex, OnceLock};

use hiredrill_agent::prompts::{
    CODING_GENERATOR, DEBUGGING_GENERATOR, DESIGN_GENERATOR, PLANNER, SEARCH, SUMMARIZER,
};
use hiredrill_agent::scripted::{Reply, ScriptedLlm};
use hiredrill_agent::{AgentRuntime, TaskRegistry};
use hiredrill_cli::commands::{config, doctor, drill, migrate, research, selection};
use hiredrill_core::config::AppConfig;
use serde_json::{json, Value};

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("hiredrill.db");
    let url = format!("sqlite://{}", db_path.display());

    with_env(&[("HIREDRILL_LLM_PROVIDER", "ollama"), ("HIREDRILL_DATABASE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
    assert!(db_path.exists(), "migrate should create the sqlite file");
}

#[test]
fn migrate_returns_config_failure_without_api_key() {
    with_env(&[("HIREDRILL_LLM_PROVIDER", "openai")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("llm.api_key"));
    });
}

#[test]
fn doctor_reports_every_check_as_json() {
    with_env(
        &[("HIREDRILL_LLM_PROVIDER", "ollama"), ("HIREDRILL_DATABASE_URL", "sqlite::memory:")],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 0, "expected passing doctor: {}", result.output);

            let report: Value = serde_json::from_str(&result.output).expect("doctor json");
            assert_eq!(report["overall_status"], "pass");
            let statuses: Vec<(String, String)> = report["checks"]
                .as_array()
                .expect("checks")
                .iter()
                .map(|check| {
                    (
                        check["name"].as_str().unwrap_or_default().to_string(),
                        check["status"].as_str().unwrap_or_default().to_string(),
                    )
                })
                .collect();
            assert_eq!(
                statuses,
                vec![
                    ("config_validation".to_string(), "pass".to_string()),
                    ("llm_credentials".to_string(), "pass".to_string()),
                    ("github_token".to_string(), "skipped".to_string()),
                    ("database_connectivity".to_string(), "pass".to_string()),
                ]
            );
        },
    );
}

#[test]
fn doctor_fails_and_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("HIREDRILL_LLM_PROVIDER", "gemini")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] database_connectivity:"));
    });
}

#[test]
fn config_output_attributes_sources_and_redacts_secrets() {
    with_env(
        &[
            ("HIREDRILL_LLM_API_KEY", "sk-secret-value"),
            ("GITHUB_TOKEN", "ghp_secret_value"),
            ("HIREDRILL_SERVER_PORT", "9100"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let output = result.output;
            assert!(output.contains("- llm.api_key = sk-*** (source: env (HIREDRILL_LLM_API_KEY))"));
            assert!(output.contains("- scout.github_token = ghp_*** (source: env (GITHUB_TOKEN))"));
            assert!(output.contains("- server.port = 9100 (source: env (HIREDRILL_SERVER_PORT))"));
            assert!(output.contains("- session.ttl_hours = 24 (source: default)"));
            assert!(!output.contains("secret"));
        },
    );
}

#[test]
fn invalid_role_is_rejected_before_any_agent_runs() {
    let failure = selection("drill", "Acme", "astronaut", None).expect_err("invalid role");
    assert_eq!(failure.exit_code, 4);

    let payload = parse_payload(&failure.output);
    assert_eq!(payload["error_class"], "invalid_input");
    assert_eq!(payload["message"], "Role 'astronaut' is not valid");
}

#[tokio::test]
async fn research_streams_json_lines_until_complete() {
    let llm = ScriptedLlm::new()
        .with_clean_classifiers()
        .reply(
            PLANNER,
            Reply::Output(json!({ "searches": [{ "reason": "stack", "query": "acme engineering" }] })),
        )
        .reply(SEARCH, Reply::Output(json!("Acme writes Rust.")))
        .reply(
            SUMMARIZER,
            Reply::Output(json!({ "name": "Acme", "description": "Payments." })),
        );
    let selection = selection("research", "Acme", "backend_developer", None).expect("selection");

    let mut out = Vec::new();
    let result = research::stream(runtime(llm), &selection, &mut out).await;
    assert_eq!(result.exit_code, 0, "{}", result.output);

    let events = json_lines(&out);
    assert!(events.len() > 1, "expected progress before the result");
    assert!(events[..events.len() - 1].iter().all(|event| event["type"] == "status"));
    let last = events.last().expect("terminal event");
    assert_eq!(last["type"], "complete");
    assert_eq!(last["data"]["name"], "Acme");
}

#[tokio::test]
async fn research_failure_ends_in_an_error_line() {
    let llm = ScriptedLlm::new().with_clean_classifiers().reply(PLANNER, Reply::Empty);
    let selection = selection("research", "Acme", "backend_developer", None).expect("selection");

    let mut out = Vec::new();
    let result = research::stream(runtime(llm), &selection, &mut out).await;
    assert_eq!(result.exit_code, 5);
    assert_eq!(parse_payload(&result.output)["error_class"], "pipeline");
    assert_eq!(json_lines(&out).last().expect("terminal event")["type"], "error");
}

#[tokio::test]
async fn drill_continues_without_research_and_completes() {
    let llm = ScriptedLlm::new()
        .with_clean_classifiers()
        .reply(PLANNER, Reply::Empty)
        .reply(
            CODING_GENERATOR,
            Reply::Output(json!({
                "drill": {
                    "title": "Idempotent payments API",
                    "type": "coding",
                    "difficulty": "medium",
                    "description": "Build it",
                    "requirements": ["retries are safe"],
                    "expected_time_minutes": 45
                },
                "generator_type": "coding",
                "reasoning": "fits",
                "confidence_score": 0.8
            })),
        )
        .reply(DEBUGGING_GENERATOR, Reply::Empty)
        .reply(DESIGN_GENERATOR, Reply::Empty);
    let selection =
        selection("drill", "Acme", "backend_developer", Some("payments platform")).expect("selection");

    let mut out = Vec::new();
    let result = drill::stream(runtime(llm), &AppConfig::default(), &selection, &mut out).await;
    assert_eq!(result.exit_code, 0, "{}", result.output);

    let events = json_lines(&out);
    assert!(events.iter().any(|event| event["message"]
        == "Research unavailable, continuing without company context..."));
    let last = events.last().expect("terminal event");
    assert_eq!(last["type"], "complete");
    assert_eq!(last["data"]["title"], "Idempotent payments API");
}

fn runtime(llm: ScriptedLlm) -> Arc<AgentRuntime> {
    Arc::new(AgentRuntime::new(Arc::new(llm), Arc::new(TaskRegistry::new()), &AppConfig::default()))
}

fn json_lines(out: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(out)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(last_line(output)).expect("command output should be valid json")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "HIREDRILL_DATABASE_URL",
        "HIREDRILL_DATABASE_MAX_CONNECTIONS",
        "HIREDRILL_DATABASE_TIMEOUT_SECS",
        "HIREDRILL_LLM_PROVIDER",
        "HIREDRILL_LLM_API_KEY",
        "HIREDRILL_LLM_BASE_URL",
        "HIREDRILL_LLM_MODEL",
        "HIREDRILL_LLM_GUARDRAIL_MODEL",
        "HIREDRILL_LLM_REQUEST_TIMEOUT_SECS",
        "HIREDRILL_LLM_MAX_RETRIES",
        "HIREDRILL_LLM_WEB_SEARCH",
        "HIREDRILL_AGENTS_GENERATOR_COUNT",
        "HIREDRILL_SCOUT_GITHUB_TOKEN",
        "GITHUB_TOKEN",
        "HIREDRILL_SESSION_TTL_HOURS",
        "HIREDRILL_FEEDBACK_BASE_DIR",
        "HIREDRILL_SERVER_BIND_ADDRESS",
        "HIREDRILL_SERVER_PORT",
        "HIREDRILL_SERVER_CORS_ORIGINS",
        "HIREDRILL_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "HIREDRILL_LOGGING_LEVEL",
        "HIREDRILL_LOGGING_FORMAT",
        "HIREDRILL_LOG_LEVEL",
        "HIREDRILL_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
