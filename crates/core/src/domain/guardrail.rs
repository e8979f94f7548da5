use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structured output of the prompt-injection classifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InjectionVerdictOutput {
    pub is_injection: bool,
    pub reasoning: String,
    #[serde(default)]
    pub matched_pattern: Option<String>,
}

/// Structured output of the secret-leakage classifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LeakageVerdictOutput {
    pub has_leakage: bool,
    pub reasoning: String,
    #[serde(default)]
    pub leaked_type: Option<String>,
}
