use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One entry of a research plan produced by the planner agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchQuery {
    /// Why this search matters for the interview.
    pub reason: String,
    pub query: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchPlan {
    pub searches: Vec<SearchQuery>,
}

impl SearchPlan {
    /// Keeps at most `max` entries, in plan order.
    pub fn truncated(mut self, max: usize) -> Self {
        self.searches.truncate(max);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TechStack {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl TechStack {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty() && self.frameworks.is_empty() && self.tools.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompanySummary {
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    pub description: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub tech_stack: Option<TechStack>,
    #[serde(default)]
    pub engineering_culture: Option<String>,
    #[serde(default)]
    pub recent_news: Vec<String>,
    #[serde(default)]
    pub interview_tips: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::{CompanySummary, SearchPlan, SearchQuery};

    #[test]
    fn plan_truncation_keeps_leading_entries() {
        let plan = SearchPlan {
            searches: (0..4)
                .map(|index| SearchQuery {
                    reason: format!("reason {index}"),
                    query: format!("query {index}"),
                })
                .collect(),
        };

        let truncated = plan.truncated(2);
        assert_eq!(truncated.searches.len(), 2);
        assert_eq!(truncated.searches[1].query, "query 1");
    }

    #[test]
    fn summary_tolerates_missing_optional_fields() {
        let summary: CompanySummary =
            serde_json::from_str(r#"{"name":"Acme","description":"Rockets"}"#)
                .expect("minimal summary should deserialize");

        assert_eq!(summary.name, "Acme");
        assert!(summary.tech_stack.is_none());
        assert!(summary.recent_news.is_empty());
    }
}
