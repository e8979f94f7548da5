use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const MAX_SUMMARY_CHARS: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Strength {
    pub title: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Improvement {
    pub title: String,
    pub description: String,
    pub suggestion: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SolutionFeedback {
    #[schemars(range(min = 0.0, max = 10.0))]
    pub score: f64,
    #[serde(default)]
    pub strengths: Vec<Strength>,
    #[serde(default)]
    pub improvements: Vec<Improvement>,
    /// Short note carried into the next drill generation round.
    pub summary_for_next_drill: String,
}

impl SolutionFeedback {
    pub fn normalized(mut self) -> Self {
        self.score = if self.score.is_finite() { self.score.clamp(0.0, 10.0) } else { 0.0 };
        if self.summary_for_next_drill.chars().count() > MAX_SUMMARY_CHARS {
            self.summary_for_next_drill =
                self.summary_for_next_drill.chars().take(MAX_SUMMARY_CHARS).collect();
        }
        self
    }

    pub fn score_label(&self) -> &'static str {
        if self.score >= 7.0 {
            "Good"
        } else if self.score >= 5.0 {
            "Adequate"
        } else {
            "Needs Improvement"
        }
    }
}
