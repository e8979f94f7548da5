//! Correlation-scoped bookkeeping for in-flight agent runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::llm::Cancellable;

#[derive(Default)]
struct RegistryState {
    active: HashMap<String, Vec<Arc<dyn Cancellable>>>,
    cancelled: HashSet<String>,
}

/// Maps a correlation id to its in-flight runs so that a whole unit of work can be torn down at
/// once. The lock is never held across an await or while cancelling a handle.
#[derive(Default)]
pub struct TaskRegistry {
    state: Mutex<RegistryState>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false when the id is already cancelled; the handle is then cancelled and not kept.
    pub fn register(&self, correlation_id: &str, handle: Arc<dyn Cancellable>) -> bool {
        {
            let mut state = self.lock();
            if !state.cancelled.contains(correlation_id) {
                let handles = state.active.entry(correlation_id.to_string()).or_default();
                if !handles.iter().any(|existing| existing.handle_id() == handle.handle_id()) {
                    handles.push(handle);
                }
                return true;
            }
        }
        handle.cancel();
        false
    }

    pub fn unregister(&self, correlation_id: &str, handle_id: Uuid) {
        let mut state = self.lock();
        if let Some(handles) = state.active.get_mut(correlation_id) {
            handles.retain(|handle| handle.handle_id() != handle_id);
            if handles.is_empty() {
                state.active.remove(correlation_id);
            }
        }
    }

    /// Marks the id cancelled and cancels every incomplete handle. Returns how many were cancelled.
    pub fn cancel_all(&self, correlation_id: &str) -> usize {
        let handles = {
            let mut state = self.lock();
            state.cancelled.insert(correlation_id.to_string());
            state.active.remove(correlation_id).unwrap_or_default()
        };

        let mut cancelled = 0;
        for handle in handles {
            if !handle.is_complete() {
                handle.cancel();
                cancelled += 1;
            }
        }
        tracing::info!(
            event_name = "registry.cancel_all",
            correlation_id = %correlation_id,
            cancelled,
            "cancelled in-flight agent runs"
        );
        cancelled
    }

    pub fn is_cancelled(&self, correlation_id: &str) -> bool {
        self.lock().cancelled.contains(correlation_id)
    }

    /// Forgets the id entirely so that it can be reused.
    pub fn cleanup(&self, correlation_id: &str) {
        let handles = {
            let mut state = self.lock();
            state.cancelled.remove(correlation_id);
            state.active.remove(correlation_id).unwrap_or_default()
        };
        for handle in handles.into_iter().filter(|handle| !handle.is_complete()) {
            handle.cancel();
        }
    }

    pub fn active_count(&self, correlation_id: &str) -> usize {
        self.lock().active.get(correlation_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use uuid::Uuid;

    use super::TaskRegistry;
    use crate::llm::Cancellable;

    #[derive(Default)]
    struct FakeHandle {
        id: Uuid,
        complete: AtomicBool,
        cancels: AtomicUsize,
    }

    impl FakeHandle {
        fn new() -> Arc<Self> {
            Arc::new(Self { id: Uuid::new_v4(), ..Self::default() })
        }

        fn completed() -> Arc<Self> {
            let handle = Self::new();
            handle.complete.store(true, Ordering::SeqCst);
            handle
        }

        fn cancels(&self) -> usize {
            self.cancels.load(Ordering::SeqCst)
        }
    }

    impl Cancellable for FakeHandle {
        fn handle_id(&self) -> Uuid {
            self.id
        }

        fn is_complete(&self) -> bool {
            self.complete.load(Ordering::SeqCst)
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn register_is_deduplicated_and_unregister_idempotent() {
        let registry = TaskRegistry::new();
        let handle = FakeHandle::new();

        assert!(registry.register("req-1", handle.clone()));
        assert!(registry.register("req-1", handle.clone()));
        assert_eq!(registry.active_count("req-1"), 1);

        registry.unregister("req-1", handle.id);
        registry.unregister("req-1", handle.id);
        registry.unregister("unknown", handle.id);
        assert_eq!(registry.active_count("req-1"), 0);
    }

    #[test]
    fn cancel_all_skips_completed_handles() {
        let registry = TaskRegistry::new();
        let pending = FakeHandle::new();
        let done = FakeHandle::completed();
        registry.register("req-2", pending.clone());
        registry.register("req-2", done.clone());

        assert_eq!(registry.cancel_all("req-2"), 1);
        assert_eq!(pending.cancels(), 1);
        assert_eq!(done.cancels(), 0);
        assert!(registry.is_cancelled("req-2"));
        assert_eq!(registry.active_count("req-2"), 0);
    }

    #[test]
    fn registering_under_a_cancelled_id_cancels_immediately() {
        let registry = TaskRegistry::new();
        assert_eq!(registry.cancel_all("req-3"), 0);

        let late = FakeHandle::new();
        assert!(!registry.register("req-3", late.clone()));
        assert_eq!(late.cancels(), 1);
        assert_eq!(registry.active_count("req-3"), 0);
    }

    #[test]
    fn cleanup_resets_the_id() {
        let registry = TaskRegistry::new();
        let stale = FakeHandle::new();
        registry.register("req-4", stale.clone());
        registry.cancel_all("req-4");
        registry.cleanup("req-4");

        assert!(!registry.is_cancelled("req-4"));
        let fresh = FakeHandle::new();
        assert!(registry.register("req-4", fresh.clone()));
        assert_eq!(fresh.cancels(), 0);

        registry.cleanup("req-4");
        assert_eq!(fresh.cancels(), 1);
        assert_eq!(registry.active_count("req-4"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_register_and_unregister_lose_nothing() {
        let registry = Arc::new(TaskRegistry::new());
        let mut tasks = Vec::new();
        for worker in 0..10 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let mut kept = Vec::new();
                for round in 0..10 {
                    let handle = FakeHandle::new();
                    registry.register("shared", handle.clone());
                    if (worker + round) % 2 == 0 {
                        registry.unregister("shared", handle.id);
                    } else {
                        kept.push(handle);
                    }
                    tokio::task::yield_now().await;
                }
                kept
            }));
        }

        let mut kept = Vec::new();
        for task in tasks {
            kept.extend(task.await.expect("worker finishes"));
        }
        assert_eq!(registry.active_count("shared"), kept.len());
        assert_eq!(kept.len(), 50);

        assert_eq!(registry.cancel_all("shared"), 50);
        assert!(kept.iter().all(|handle| handle.cancels() == 1));
    }
}
