//! The language-model seam: a client starts a streamed agent run and hands back an
//! [`AgentStream`] immediately; the run's [`RunHandle`] is what the task registry holds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::spec::AgentSpec;

const STREAM_BUFFER: usize = 64;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),
    #[error("llm provider returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm stream closed before a final output")]
    StreamClosed,
    #[error("llm run was cancelled")]
    Cancelled,
}

pub trait LlmClient: Send + Sync {
    /// Starts a streamed run of `spec` over `input`. Must be called from within a tokio runtime;
    /// the work happens on a spawned task and the stream is returned before it begins.
    fn run_streamed(&self, spec: &AgentSpec, input: &str) -> AgentStream;
}

/// Anything the task registry can cancel.
pub trait Cancellable: Send + Sync {
    fn handle_id(&self) -> Uuid;
    fn is_complete(&self) -> bool;
    fn cancel(&self);
}

#[derive(Debug)]
pub struct RunHandle {
    id: Uuid,
    agent: String,
    complete: AtomicBool,
    token: CancellationToken,
}

impl RunHandle {
    pub fn new(agent: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            agent: agent.into(),
            complete: AtomicBool::new(false),
            token: CancellationToken::new(),
        })
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn mark_complete(&self) {
        self.complete.store(true, Ordering::SeqCst);
    }
}

impl Cancellable for RunHandle {
    fn handle_id(&self) -> Uuid {
        self.id
    }

    fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        if !self.is_complete() {
            self.token.cancel();
        }
    }
}

#[derive(Debug)]
pub enum StreamItem {
    /// Incremental text; consumers that only want the final output discard these.
    Delta(String),
    Final(Option<Value>),
    Failed(LlmError),
}

/// Consumer side of a streamed run. Dropping an unfinished stream cancels the run.
pub struct AgentStream {
    handle: Arc<RunHandle>,
    events: mpsc::Receiver<StreamItem>,
}

/// Producer side of a streamed run, owned by the client implementation.
pub struct StreamSender {
    handle: Arc<RunHandle>,
    tx: mpsc::Sender<StreamItem>,
}

impl AgentStream {
    pub fn channel(agent: impl Into<String>) -> (StreamSender, AgentStream) {
        let handle = RunHandle::new(agent);
        let (tx, events) = mpsc::channel(STREAM_BUFFER);
        (StreamSender { handle: handle.clone(), tx }, AgentStream { handle, events })
    }

    /// A stream that has already failed, for clients that reject a run before starting it.
    pub fn failed(agent: impl Into<String>, error: LlmError) -> AgentStream {
        let (sender, stream) = Self::channel(agent);
        sender.handle.mark_complete();
        let _ = sender.tx.try_send(StreamItem::Failed(error));
        stream
    }

    pub fn handle(&self) -> Arc<RunHandle> {
        self.handle.clone()
    }

    /// Drains the stream to its terminal item. Deltas are discarded.
    pub async fn final_output(&mut self) -> Result<Option<Value>, LlmError> {
        let token = self.handle.token.clone();
        loop {
            let item = tokio::select! {
                biased;
                item = self.events.recv() => item,
                () = token.cancelled() => {
                    self.handle.mark_complete();
                    return Err(LlmError::Cancelled);
                }
            };
            match item {
                Some(StreamItem::Delta(_)) => continue,
                Some(StreamItem::Final(output)) => {
                    self.handle.mark_complete();
                    return Ok(output);
                }
                Some(StreamItem::Failed(error)) => {
                    self.handle.mark_complete();
                    return Err(error);
                }
                None => {
                    self.handle.mark_complete();
                    return Err(if token.is_cancelled() {
                        LlmError::Cancelled
                    } else {
                        LlmError::StreamClosed
                    });
                }
            }
        }
    }
}

impl Drop for AgentStream {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

impl StreamSender {
    pub fn handle(&self) -> &Arc<RunHandle> {
        &self.handle
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// Resolves once the run is cancelled by the consumer, the registry or a timeout.
    pub async fn cancelled(&self) {
        self.handle.token.cancelled().await;
    }

    /// Returns false once the consumer has gone away.
    pub async fn delta(&self, text: impl Into<String>) -> bool {
        self.tx.send(StreamItem::Delta(text.into())).await.is_ok()
    }

    pub async fn finish(self, output: Option<Value>) {
        self.handle.mark_complete();
        let _ = self.tx.send(StreamItem::Final(output)).await;
    }

    pub async fn fail(self, error: LlmError) {
        self.handle.mark_complete();
        let _ = self.tx.send(StreamItem::Failed(error)).await;
    }
}
