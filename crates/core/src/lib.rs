pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod sanitize;
pub mod scout_filter;

pub use domain::company::{CompanySummary, SearchPlan, SearchQuery, TechStack};
pub use domain::drill::{
    CandidateEvaluation, Difficulty, Drill, DrillCandidate, DrillEvaluation, DrillType,
};
pub use domain::evaluation::{Improvement, SolutionFeedback, Strength};
pub use domain::guardrail::{InjectionVerdictOutput, LeakageVerdictOutput};
pub use domain::scout::{
    AnalysisResult, DeveloperProfile, RepoAnalysisBatch, RepoMetadata, RunTotals, ScoutRun,
    ScoutRunStatus, ScoutSearchResult, SearchFilters, SkillLevel, StoredProfile,
};
pub use domain::session::{SessionRecord, UserSelection, UserSelectionRequest};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use events::{Phase, StreamEvent};
