use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::company::TechStack;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DrillType {
    Coding,
    Debugging,
    SystemDesign,
}

impl DrillType {
    /// Generator launch order; a round with `n` generators uses the first `n`.
    pub const ALL: [DrillType; 3] = [Self::Coding, Self::Debugging, Self::SystemDesign];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coding => "coding",
            Self::Debugging => "debugging",
            Self::SystemDesign => "system_design",
        }
    }

    /// Human label used in progress messages.
    pub fn description(self) -> &'static str {
        match self {
            Self::Coding => "coding challenge",
            Self::Debugging => "debugging scenario",
            Self::SystemDesign => "system design problem",
        }
    }
}

impl fmt::Display for DrillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Drill {
    pub title: String,
    #[serde(rename = "type")]
    pub drill_type: DrillType,
    pub difficulty: Difficulty,
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub starter_code: Option<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[schemars(range(min = 5, max = 120))]
    pub expected_time_minutes: u32,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub company_context: Option<String>,
}

impl Drill {
    pub const MIN_MINUTES: u32 = 5;
    pub const MAX_MINUTES: u32 = 120;

    /// Clamps model-reported values into the documented ranges.
    pub fn normalized(mut self) -> Self {
        self.expected_time_minutes =
            self.expected_time_minutes.clamp(Self::MIN_MINUTES, Self::MAX_MINUTES);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DrillCandidate {
    pub drill: Drill,
    pub generator_type: DrillType,
    pub reasoning: String,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub confidence_score: f64,
}

impl DrillCandidate {
    /// Stamps the producing generator and clamps the confidence into `[0, 1]`.
    pub fn stamped_by(mut self, generator: DrillType) -> Self {
        self.generator_type = generator;
        self.confidence_score = if self.confidence_score.is_finite() {
            self.confidence_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.drill = self.drill.normalized();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CandidateEvaluation {
    pub generator_type: DrillType,
    pub relevance_score: f64,
    pub difficulty_appropriateness: f64,
    pub company_fit_score: f64,
    pub overall_score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DrillEvaluation {
    pub selected_drill: Drill,
    pub selected_generator: DrillType,
    pub selection_reasoning: String,
    #[serde(default)]
    pub evaluations: Vec<CandidateEvaluation>,
}
