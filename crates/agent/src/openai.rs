//! Streaming client for OpenAI-compatible chat completions endpoints.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use hiredrill_core::config::{LlmConfig, LlmProvider};
use hiredrill_core::sanitize::truncate_chars;

use crate::llm::{AgentStream, LlmClient, LlmError, StreamSender};
use crate::spec::{AgentSpec, OutputSchema, ToolBinding};

const BASE_BACKOFF: Duration = Duration::from_secs(1);
const ERROR_BODY_CHARS: usize = 400;

pub struct OpenAiClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    endpoint: String,
    default_model: String,
    max_retries: u32,
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_none() && config.provider != LlmProvider::Ollama {
            return Err(LlmError::Request(format!(
                "an api key is required for the {:?} provider",
                config.provider
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| LlmError::Request(error.to_string()))?;
        let endpoint =
            format!("{}/chat/completions", config.effective_base_url().trim_end_matches('/'));
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                api_key: config.api_key.clone(),
                endpoint,
                default_model: config.model.clone(),
                max_retries: config.max_retries,
            }),
        })
    }
}

impl LlmClient for OpenAiClient {
    fn run_streamed(&self, spec: &AgentSpec, input: &str) -> AgentStream {
        let body = request_body(spec, input, &self.inner.default_model);
        let output = spec.output().clone();
        let inner = self.inner.clone();
        let (sender, stream) = AgentStream::channel(spec.name());

        tokio::spawn(async move {
            let result = tokio::select! {
                () = sender.cancelled() => return,
                result = inner.complete(&body, &sender) => result,
            };
            match result.and_then(|text| final_value(&output, &text)) {
                Ok(value) => sender.finish(value).await,
                Err(error) => sender.fail(error).await,
            }
        });
        stream
    }
}

impl Inner {
    /// Sends the request, retrying throttling and server errors, then accumulates the streamed
    /// content deltas.
    async fn complete(&self, body: &Value, sender: &StreamSender) -> Result<String, LlmError> {
        let mut attempt = 0;
        let response = loop {
            let mut request = self.http.post(&self.endpoint).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key.expose_secret());
            }
            let response =
                request.send().await.map_err(|error| LlmError::Request(error.to_string()))?;
            let status = response.status();
            if status.is_success() {
                break response;
            }

            let message = response.text().await.unwrap_or_default();
            if is_retryable(status) && attempt < self.max_retries {
                let delay = backoff(attempt);
                tracing::warn!(
                    event_name = "llm.request.retry",
                    agent = %sender.handle().agent(),
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying llm request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            return Err(LlmError::Status {
                status: status.as_u16(),
                message: truncate_chars(&message, ERROR_BODY_CHARS).to_string(),
            });
        };

        let mut text = String::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|error| LlmError::Request(error.to_string()))?;
            pending.extend_from_slice(&chunk);
            while let Some(newline) = pending.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line))? {
                    SseLine::Delta(delta) => {
                        sender.delta(delta.as_str()).await;
                        text.push_str(&delta);
                    }
                    SseLine::Done => return Ok(text),
                    SseLine::Skip => {}
                }
            }
        }
        Ok(text)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(attempt: u32) -> Duration {
    let base = BASE_BACKOFF.saturating_mul(2u32.saturating_pow(attempt));
    base + base.mul_f64(rand::thread_rng().gen_range(0.0..=0.5))
}

pub(crate) fn request_body(spec: &AgentSpec, input: &str, default_model: &str) -> Value {
    let mut body = json!({
        "model": spec.model().unwrap_or(default_model),
        "stream": true,
        "messages": [
            { "role": "system", "content": spec.instructions() },
            { "role": "user", "content": input }
        ]
    });
    if let Some(object) = body.as_object_mut() {
        if let OutputSchema::Json { name, schema } = spec.output() {
            object.insert(
                "response_format".to_string(),
                json!({
                    "type": "json_schema",
                    "json_schema": { "name": name, "schema": schema, "strict": false }
                }),
            );
        }
        if spec.tools().contains(&ToolBinding::WebSearch) {
            object.insert("web_search_options".to_string(), json!({}));
        }
    }
    body
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine {
    Delta(String),
    Done,
    Skip,
}

pub(crate) fn parse_sse_line(line: &str) -> Result<SseLine, LlmError> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    let event: Value =
        serde_json::from_str(data).map_err(|error| LlmError::Decode(error.to_string()))?;
    if let Some(error) = event.get("error") {
        return Err(LlmError::Request(error.to_string()));
    }
    Ok(event
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map_or(SseLine::Skip, |content| SseLine::Delta(content.to_string())))
}

/// Turns the accumulated text into the run's final output. Blank text means no output.
pub(crate) fn final_value(output: &OutputSchema, text: &str) -> Result<Option<Value>, LlmError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    match output {
        OutputSchema::Text => Ok(Some(Value::String(text.to_string()))),
        OutputSchema::Json { name, .. } => {
            let body = strip_code_fence(text);
            serde_json::from_str(body)
                .map(Some)
                .map_err(|error| LlmError::Decode(format!("{name}: {error}")))
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    text.strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(text, str::trim)
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use hiredrill_core::config::{AppConfig, LlmProvider};
    use hiredrill_core::domain::company::SearchPlan;

    use super::{final_value, parse_sse_line, request_body, OpenAiClient, SseLine};
    use crate::llm::LlmError;
    use crate::spec::{AgentSpec, OutputSchema, ToolBinding};

    #[test]
    fn structured_specs_request_a_json_schema() {
        let spec = AgentSpec::new("Planner", "plan", OutputSchema::json::<SearchPlan>("search_plan"))
            .with_model("gpt-4.1");
        let body = request_body(&spec, "Company: Acme", "gpt-4o-mini");

        assert_eq!(body["model"], "gpt-4.1");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["content"], "plan");
        assert_eq!(body["messages"][1]["content"], "Company: Acme");
        assert_eq!(body["response_format"]["json_schema"]["name"], "search_plan");
        assert!(body.get("web_search_options").is_none());

        let search = AgentSpec::new("Search", "search", OutputSchema::Text)
            .with_tool(ToolBinding::WebSearch);
        let body = request_body(&search, "q", "gpt-4o-mini");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert!(body.get("response_format").is_none());
        assert_eq!(body["web_search_options"], json!({}));
    }

    #[test]
    fn sse_lines_yield_content_deltas() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            Ok(SseLine::Delta("Hel".to_string()))
        );
        assert_eq!(parse_sse_line(r#"data: {"choices":[{"delta":{}}]}"#), Ok(SseLine::Skip));
        assert_eq!(parse_sse_line("data: [DONE]\n"), Ok(SseLine::Done));
        assert_eq!(parse_sse_line(": keep-alive"), Ok(SseLine::Skip));
        assert!(matches!(parse_sse_line("data: {broken"), Err(LlmError::Decode(_))));
    }

    #[test]
    fn final_output_follows_the_schema() {
        assert_eq!(final_value(&OutputSchema::Text, "  notes \n"), Ok(Some(json!("notes"))));
        assert_eq!(final_value(&OutputSchema::Text, "   "), Ok(None));

        let schema = OutputSchema::json::<SearchPlan>("search_plan");
        assert_eq!(
            final_value(&schema, "```json\n{\"searches\": []}\n```"),
            Ok(Some(json!({"searches": []})))
        );
        assert!(matches!(final_value(&schema, "not json"), Err(LlmError::Decode(_))));
    }

    #[test]
    fn hosted_providers_need_a_key() {
        let mut config = AppConfig::default().llm;
        assert!(OpenAiClient::from_config(&config).is_err());

        config.api_key = Some(SecretString::from("sk-test"));
        assert!(OpenAiClient::from_config(&config).is_ok());

        config.api_key = None;
        config.provider = LlmProvider::Ollama;
        assert!(OpenAiClient::from_config(&config).is_ok());
    }
}
