//! Two-tier content guardrails applied at every agent boundary.
//!
//! Tier one is a fixed, ordered list of case-insensitive patterns checked synchronously.
//! Tier two only runs when a cheap heuristic flags the text, and asks a classifier agent for a
//! verdict. Tier one decides alone for literal matches; tier two is best-effort.

use std::sync::{Arc, OnceLock};

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use hiredrill_core::domain::guardrail::{InjectionVerdictOutput, LeakageVerdictOutput};

use crate::llm::{LlmClient, LlmError};
use crate::spec::AgentSpec;

pub const SAFE_INPUT_MESSAGE: &str =
    "Unable to process this request. Please provide a valid company name and role.";
pub const SAFE_OUTPUT_MESSAGE: &str =
    "Research completed but results could not be displayed. Please try again.";

pub const INJECTION_PATTERNS: &[&str] = &[
    // instruction override
    r"ignore\s+(all\s+)?(previous|prior|above)\s+(instructions?|prompts?|rules?|guidelines?)",
    r"disregard\s+(all\s+)?(previous|prior|above)\s+(instructions?|prompts?|rules?|guidelines?)",
    r"forget\s+(all\s+)?(previous|prior|above)\s+(instructions?|prompts?|rules?|guidelines?)",
    r"override\s+(all\s+)?(previous|prior|above)\s+(instructions?|prompts?|rules?|guidelines?)",
    // system prompt extraction
    r"(show|print|display|reveal|tell|share|output|give)\s+(me\s+)?(your|the)\s+(system\s+)?(prompt|instructions?|rules?|guidelines?)",
    r"what\s+(are|is)\s+(your|the)\s+(system\s+)?(prompt|instructions?|rules?|guidelines?)",
    r"repeat\s+(your|the)\s+(system\s+)?(prompt|instructions?|configuration)",
    // secret extraction
    r"(show|print|display|reveal|tell|share|output|give)\s+(me\s+)?(the\s+)?(api\s*key|secret|token|password|credential)",
    r"what\s+(is|are)\s+(the\s+)?(api\s*key|secret|token|password|credential)",
    r"(access|read|show|print|display)\s+(the\s+)?\.env",
    r"(what|show|print).+(in|from|inside)\s+(the\s+)?\.env",
    r"environment\s+variable",
    r"OPENAI_API_KEY",
    r"ANTHROPIC_API_KEY",
    // persona hijack
    r"(you\s+are|act\s+as|pretend\s+to\s+be|roleplay\s+as)\s+(now\s+)?(a\s+)?(different|new|another)",
    r"(switch|change)\s+(to\s+)?(a\s+)?(new|different)\s+(mode|role|persona)",
    r"jailbreak",
    r"DAN\s+mode",
    // delimiter injection
    r"</?system>",
    r"\[/?INST\]",
    r"```(system|instructions?|prompt)",
    r"---\s*(system|instructions?|prompt)",
    // code execution
    r"(execute|run|eval)\s+(this\s+)?(code|script|command)",
    r"import\s+os|subprocess|exec\(",
];

pub const LEAKAGE_PATTERNS: &[&str] = &[
    r"sk-proj-[A-Za-z0-9_-]{20,}",
    r"sk-[A-Za-z0-9]{20,}",
    r"sk-ant-[A-Za-z0-9_-]{20,}",
    r"AIzaSy[A-Za-z0-9_-]{33}",
    r"gsk_[A-Za-z0-9]{20,}",
    r#"[A-Za-z0-9_]*(api[_-]?key|apikey|secret[_-]?key|access[_-]?token)\s*[=:]\s*['"]?[A-Za-z0-9_-]{20,}"#,
    r"Bearer\s+[A-Za-z0-9_.-]{20,}",
    r"Authorization:\s*(Bearer\s+)?[A-Za-z0-9_.-]{20,}",
    r#"(OPENAI_API_KEY|ANTHROPIC_API_KEY|API_KEY|SECRET_KEY|ACCESS_TOKEN)\s*=\s*['"]?[A-Za-z0-9_-]{10,}"#,
    r"AKIA[0-9A-Z]{16}",
    r#"aws_secret_access_key\s*=\s*['"]?[A-Za-z0-9/+=]{40}"#,
    r"(postgres|mysql|mongodb)://[^:]+:[^@]+@",
    r"eyJ[A-Za-z0-9_-]{10,}\.eyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{20,}",
    r"-----BEGIN\s+(RSA\s+)?PRIVATE\s+KEY-----",
];

const SUSPICIOUS_MARKERS: &[&str] = &["```", "{{", "}}", "<%", "%>", "${", "$("];
const SUSPICIOUS_WORDS: &[&str] = &[
    "instruction",
    "prompt",
    "system",
    "ignore",
    "override",
    "forget",
    "pretend",
    "roleplay",
    "execute",
    "eval",
];
const SECRET_KEYWORDS: &[&str] = &[
    "api_key",
    "apikey",
    "api-key",
    "secret",
    "token",
    "password",
    "credential",
    "bearer",
    "authorization",
    "private_key",
    "access_key",
    ".env",
    "environ",
];
const MAX_PLAIN_INPUT_CHARS: usize = 500;
const MAX_PLAIN_INPUT_NEWLINES: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }

    /// Generic message shown to users instead of any detail about the check.
    pub fn safe_message(self) -> &'static str {
        match self {
            Self::Input => SAFE_INPUT_MESSAGE,
            Self::Output => SAFE_OUTPUT_MESSAGE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Pattern,
    Classifier,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Tripwire { direction: Direction, tier: Tier, reason: String },
}

impl GuardrailDecision {
    pub fn is_tripwire(&self) -> bool {
        matches!(self, Self::Tripwire { .. })
    }
}

fn compile_all(patterns: &'static [&'static str]) -> Vec<(&'static str, Regex)> {
    patterns
        .iter()
        .filter_map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .ok()
                .map(|regex| (*pattern, regex))
        })
        .collect()
}

fn injection_regexes() -> &'static [(&'static str, Regex)] {
    static COMPILED: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| compile_all(INJECTION_PATTERNS))
}

fn leakage_regexes() -> &'static [(&'static str, Regex)] {
    static COMPILED: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| compile_all(LEAKAGE_PATTERNS))
}

fn opaque_token() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[A-Za-z0-9_-]{32,}").ok()).as_ref()
}

fn env_assignment() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[A-Z_]+=\S+").ok()).as_ref()
}

fn first_match(
    patterns: &'static [(&'static str, Regex)],
    text: &str,
) -> Option<&'static str> {
    patterns.iter().find(|(_, regex)| regex.is_match(text)).map(|(pattern, _)| *pattern)
}

/// First injection pattern matching `text`, in list order.
pub fn match_injection(text: &str) -> Option<&'static str> {
    first_match(injection_regexes(), text)
}

/// First leakage pattern matching `text`, in list order.
pub fn match_leakage(text: &str) -> Option<&'static str> {
    first_match(leakage_regexes(), text)
}

pub fn needs_injection_review(text: &str) -> bool {
    if text.chars().count() > MAX_PLAIN_INPUT_CHARS {
        return true;
    }
    if text.matches('\n').count() > MAX_PLAIN_INPUT_NEWLINES {
        return true;
    }
    if SUSPICIOUS_MARKERS.iter().any(|marker| text.contains(marker)) {
        return true;
    }
    let lowered = text.to_lowercase();
    SUSPICIOUS_WORDS.iter().any(|word| lowered.contains(word))
}

pub fn needs_leakage_review(text: &str) -> bool {
    let lowered = text.to_lowercase();
    if SECRET_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        return true;
    }
    if opaque_token().is_some_and(|regex| regex.is_match(text)) {
        return true;
    }
    env_assignment().is_some_and(|regex| regex.is_match(text))
}

/// Synchronous tier-one check.
pub fn check_patterns(text: &str, direction: Direction) -> GuardrailDecision {
    let matched = match direction {
        Direction::Input => match_injection(text),
        Direction::Output => match_leakage(text),
    };
    match matched {
        Some(pattern) => GuardrailDecision::Tripwire {
            direction,
            tier: Tier::Pattern,
            reason: pattern.to_string(),
        },
        None => GuardrailDecision::Allow,
    }
}

pub struct GuardrailEngine {
    llm: Arc<dyn LlmClient>,
    injection_classifier: AgentSpec,
    leakage_classifier: AgentSpec,
}

impl GuardrailEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        injection_classifier: AgentSpec,
        leakage_classifier: AgentSpec,
    ) -> Self {
        Self { llm, injection_classifier, leakage_classifier }
    }

    pub async fn check(
        &self,
        text: &str,
        direction: Direction,
    ) -> Result<GuardrailDecision, LlmError> {
        let decision = check_patterns(text, direction);
        if decision.is_tripwire() {
            tracing::warn!(
                event_name = "guardrail.pattern.tripped",
                direction = direction.as_str(),
                "guardrail pattern matched"
            );
            return Ok(decision);
        }

        let escalate = match direction {
            Direction::Input => needs_injection_review(text),
            Direction::Output => needs_leakage_review(text),
        };
        if !escalate {
            return Ok(GuardrailDecision::Allow);
        }

        let decision = self.classify(text, direction).await?;
        if decision.is_tripwire() {
            tracing::warn!(
                event_name = "guardrail.classifier.tripped",
                direction = direction.as_str(),
                "guardrail classifier flagged content"
            );
        }
        Ok(decision)
    }

    async fn classify(
        &self,
        text: &str,
        direction: Direction,
    ) -> Result<GuardrailDecision, LlmError> {
        let spec = match direction {
            Direction::Input => &self.injection_classifier,
            Direction::Output => &self.leakage_classifier,
        };
        let mut stream = self.llm.run_streamed(spec, text);
        let Some(output) = stream.final_output().await? else {
            return Ok(GuardrailDecision::Allow);
        };

        let (tripped, reason) = match direction {
            Direction::Input => {
                let verdict: InjectionVerdictOutput = decode_verdict(output)?;
                (verdict.is_injection, verdict.matched_pattern.unwrap_or(verdict.reasoning))
            }
            Direction::Output => {
                let verdict: LeakageVerdictOutput = decode_verdict(output)?;
                (verdict.has_leakage, verdict.leaked_type.unwrap_or(verdict.reasoning))
            }
        };

        Ok(if tripped {
            GuardrailDecision::Tripwire { direction, tier: Tier::Classifier, reason }
        } else {
            GuardrailDecision::Allow
        })
    }
}

fn decode_verdict<T: serde::de::DeserializeOwned>(output: Value) -> Result<T, LlmError> {
    serde_json::from_value(output).map_err(|error| LlmError::Decode(error.to_string()))
}
