use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use hiredrill_core::domain::session::SessionRecord;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Per-session state keyed by session id. Expired records read as absent.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError>;
    async fn put(&self, record: SessionRecord) -> Result<(), SessionError>;
}

const MAX_TTL_HOURS: i64 = 24 * 365 * 10;

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), ttl }
    }

    pub fn with_ttl_hours(hours: u64) -> Self {
        let hours = i64::try_from(hours).unwrap_or(i64::MAX).min(MAX_TTL_HOURS);
        Self::new(Duration::hours(hours))
    }

    /// Drops expired records; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let ttl = self.ttl;
        sessions.retain(|_, record| !is_expired(record, ttl));
        before - sessions.len()
    }
}

fn is_expired(record: &SessionRecord, ttl: Duration) -> bool {
    Utc::now() - record.created_at >= ttl
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).filter(|record| !is_expired(record, self.ttl)).cloned())
    }

    async fn put(&self, record: SessionRecord) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(record.session_id.clone(), record);
        Ok(())
    }
}
