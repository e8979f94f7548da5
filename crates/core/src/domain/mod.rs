pub mod company;
pub mod drill;
pub mod evaluation;
pub mod guardrail;
pub mod scout;
pub mod session;
