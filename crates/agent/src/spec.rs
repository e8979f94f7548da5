use schemars::JsonSchema;
use serde_json::Value;

/// Shape of an agent's final output.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputSchema {
    /// Free text; the final output is a JSON string.
    Text,
    /// Structured output validated against a JSON schema.
    Json { name: &'static str, schema: Value },
}

impl OutputSchema {
    pub fn json<T: JsonSchema>(name: &'static str) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self::Json { name, schema }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Json { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolBinding {
    /// Provider-hosted web search.
    WebSearch,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GuardrailSet {
    pub input: bool,
    pub output: bool,
}

impl GuardrailSet {
    pub const NONE: Self = Self { input: false, output: false };
    pub const BOTH: Self = Self { input: true, output: true };
    pub const OUTPUT_ONLY: Self = Self { input: false, output: true };
}

/// Immutable description of one agent. Built once and shared by every invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentSpec {
    name: String,
    instructions: String,
    model: Option<String>,
    output: OutputSchema,
    tools: Vec<ToolBinding>,
    guardrails: GuardrailSet,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>, output: OutputSchema) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: None,
            output,
            tools: Vec::new(),
            guardrails: GuardrailSet::NONE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tool(mut self, tool: ToolBinding) -> Self {
        if !self.tools.contains(&tool) {
            self.tools.push(tool);
        }
        self
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailSet) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// `None` means the client's configured default model.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn output(&self) -> &OutputSchema {
        &self.output
    }

    pub fn tools(&self) -> &[ToolBinding] {
        &self.tools
    }

    pub fn guardrails(&self) -> GuardrailSet {
        self.guardrails
    }
}
