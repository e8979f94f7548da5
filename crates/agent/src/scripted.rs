//! Deterministic [`LlmClient`] for tests.
//!
//! Each agent name gets a queue of scripted replies; the last reply repeats once the queue is
//! down to one entry. Unscripted agents fail.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};

use crate::llm::{AgentStream, LlmClient, LlmError};
use crate::prompts::{INJECTION_CLASSIFIER, LEAKAGE_CLASSIFIER};
use crate::spec::AgentSpec;

#[derive(Clone, Debug)]
pub enum Reply {
    Output(Value),
    /// Sleeps, then replies. Cancellation during the sleep ends the run.
    Delayed(Duration, Value),
    /// Never finishes unless cancelled.
    Hang,
    Fail(LlmError),
    Empty,
}

#[derive(Default)]
struct ScriptState {
    replies: HashMap<String, VecDeque<Reply>>,
    calls: HashMap<String, usize>,
    inputs: HashMap<String, Vec<String>>,
}

#[derive(Default)]
pub struct ScriptedLlm {
    state: Mutex<ScriptState>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifiers that always clear content, so heuristic escalation never trips a test.
    pub fn with_clean_classifiers(self) -> Self {
        self.reply(
            INJECTION_CLASSIFIER,
            Reply::Output(json!({"is_injection": false, "reasoning": "benign"})),
        )
        .reply(LEAKAGE_CLASSIFIER, Reply::Output(json!({"has_leakage": false, "reasoning": "clean"})))
    }

    pub fn reply(self, agent: &str, reply: Reply) -> Self {
        self.lock().replies.entry(agent.to_string()).or_default().push_back(reply);
        self
    }

    pub fn calls(&self, agent: &str) -> usize {
        self.lock().calls.get(agent).copied().unwrap_or(0)
    }

    pub fn inputs(&self, agent: &str) -> Vec<String> {
        self.lock().inputs.get(agent).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_reply(&self, agent: &str, input: &str) -> Option<Reply> {
        let mut state = self.lock();
        *state.calls.entry(agent.to_string()).or_default() += 1;
        state.inputs.entry(agent.to_string()).or_default().push(input.to_string());
        let queue = state.replies.get_mut(agent)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl LlmClient for ScriptedLlm {
    fn run_streamed(&self, spec: &AgentSpec, input: &str) -> AgentStream {
        let Some(reply) = self.next_reply(spec.name(), input) else {
            return AgentStream::failed(
                spec.name(),
                LlmError::Request(format!("no scripted reply for {}", spec.name())),
            );
        };

        let (sender, stream) = AgentStream::channel(spec.name());
        tokio::spawn(async move {
            match reply {
                Reply::Output(value) => {
                    sender.delta("...").await;
                    sender.finish(Some(value)).await;
                }
                Reply::Delayed(delay, value) => {
                    tokio::select! {
                        () = sender.cancelled() => return,
                        () = tokio::time::sleep(delay) => {}
                    }
                    sender.finish(Some(value)).await;
                }
                Reply::Hang => sender.cancelled().await,
                Reply::Fail(error) => sender.fail(error).await,
                Reply::Empty => sender.finish(None).await,
            }
        });
        stream
    }
}
