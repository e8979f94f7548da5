//! Agent orchestration for HireDrill.
//!
//! Every model call goes through one chokepoint, [`invoke::AgentInvoker`], which applies the
//! input and output guardrails, bounds the call with a timeout and registers the run with the
//! [`registry::TaskRegistry`] so that it can be cancelled by id. The pipelines built on top of it
//! stream ordered [`hiredrill_core::StreamEvent`]s:
//!
//! - [`research`]: plan, parallel web searches, summary;
//! - [`drill`]: parallel drill generators followed by a single evaluator;
//! - [`scout`]: GitHub discovery, filtering and batched repository analysis;
//! - [`evaluation`]: scoring a submitted solution.
//!
//! Fan-out stages degrade per item on timeout or failure; a guardrail tripwire always aborts the
//! whole pipeline with a fixed user-facing message.

pub mod drill;
pub mod evaluation;
pub mod github;
pub mod guardrails;
pub mod invoke;
pub mod llm;
pub mod openai;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod research;
pub mod runtime;
pub mod scout;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;
pub mod spec;

pub use invoke::{AgentError, AgentInvoker};
pub use llm::{AgentStream, LlmClient, LlmError};
pub use registry::TaskRegistry;
pub use runtime::{AgentRuntime, PipelineSettings};
