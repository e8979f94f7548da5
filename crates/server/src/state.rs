use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use hiredrill_agent::scout::ScoutOrchestrator;
use hiredrill_agent::AgentRuntime;
use hiredrill_db::{FeedbackStore, ScoutRepository, SessionStore};

pub const SEARCH_WINDOW: Duration = Duration::from_secs(3600);
pub const SEARCH_ALREADY_RUNNING: &str =
    "A search is already running. Please wait for it to complete.";

/// Shared handles for every API route.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub sessions: Arc<dyn SessionStore>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub scout_repository: Arc<dyn ScoutRepository>,
    /// Absent when no GitHub token is configured.
    pub scout: Option<Arc<ScoutOrchestrator>>,
    pub searches: Arc<SearchGuard>,
}

#[derive(Default)]
struct GuardState {
    hits: HashMap<IpAddr, Vec<Instant>>,
    active: HashSet<String>,
}

/// Per-client search rate limit plus the set of runs currently streaming.
pub struct SearchGuard {
    limit: usize,
    window: Duration,
    state: Mutex<GuardState>,
}

impl SearchGuard {
    pub fn new(searches_per_hour: u32) -> Self {
        Self::with_window(searches_per_hour, SEARCH_WINDOW)
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self { limit: limit as usize, window, state: Mutex::new(GuardState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rejects a new search while another one streams or when `client` is over its hourly limit.
    pub fn check(&self, client: IpAddr) -> Result<(), String> {
        let mut state = self.lock();
        if !state.active.is_empty() {
            return Err(SEARCH_ALREADY_RUNNING.to_string());
        }
        let window = self.window;
        let hits = state.hits.entry(client).or_default();
        hits.retain(|at| at.elapsed() < window);
        if hits.len() >= self.limit {
            return Err(format!(
                "Rate limit exceeded. Maximum {} searches per hour.",
                self.limit
            ));
        }
        Ok(())
    }

    pub fn record(&self, client: IpAddr) {
        self.lock().hits.entry(client).or_default().push(Instant::now());
    }

    /// Marks `run_id` as streaming; false if it already is.
    pub fn begin(&self, run_id: &str) -> bool {
        self.lock().active.insert(run_id.to_string())
    }

    pub fn end(&self, run_id: &str) -> bool {
        self.lock().active.remove(run_id)
    }

    pub fn is_active(&self, run_id: &str) -> bool {
        self.lock().active.contains(run_id)
    }
}

/// Releases a run's active slot when its event stream is dropped.
pub struct ActiveSearch {
    guard: Arc<SearchGuard>,
    run_id: String,
}

impl ActiveSearch {
    pub fn begin(guard: Arc<SearchGuard>, run_id: &str) -> Option<Self> {
        guard.begin(run_id).then(|| Self { guard, run_id: run_id.to_string() })
    }
}

impl Drop for ActiveSearch {
    fn drop(&mut self) {
        self.guard.end(&self.run_id);
    }
}
