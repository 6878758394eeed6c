//! Node-wide busy lock (`spec.md` §3, §5). Deliberately a single
//! `Option<BusyState>` guarded by one mutex, not a per-session semaphore
//! map — a node runs exactly one turn at a time, full stop, mirroring the
//! single-worker-process model the orchestration layer assumes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct BusyState {
    pub session_key: String,
    pub task_preview: String,
    pub started_at: DateTime<Utc>,
}

impl BusyState {
    pub fn running_time_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

pub struct BusyLock {
    state: Mutex<Option<BusyState>>,
}

impl BusyLock {
    pub fn new() -> Arc<Self> {
        Arc::new(BusyLock { state: Mutex::new(None) })
    }

    /// Try to acquire the lock for `session_key`. Returns `None` if the
    /// node is already busy — the caller (the `/api/chat` handler) turns
    /// that into a 503 rather than blocking.
    pub fn try_acquire(self: &Arc<Self>, session_key: String, task_preview: String) -> Option<BusyGuard> {
        let mut guard = self.state.lock();
        if guard.is_some() {
            return None;
        }
        *guard = Some(BusyState {
            session_key,
            task_preview,
            started_at: Utc::now(),
        });
        Some(BusyGuard { lock: self.clone() })
    }

    pub fn peek(&self) -> Option<BusyState> {
        self.state.lock().clone()
    }
}

impl Default for BusyLock {
    fn default() -> Self {
        BusyLock { state: Mutex::new(None) }
    }
}

/// RAII guard releasing the lock when the turn finishes (success, error,
/// or cancellation — `drop` runs in all three cases).
pub struct BusyGuard {
    lock: Arc<BusyLock>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        *self.lock.state.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_while_held() {
        let lock = BusyLock::new();
        let _guard = lock.try_acquire("s1".into(), "task".into()).unwrap();
        assert!(lock.try_acquire("s2".into(), "other".into()).is_none());
    }

    #[test]
    fn dropping_the_guard_releases_the_lock() {
        let lock = BusyLock::new();
        {
            let _guard = lock.try_acquire("s1".into(), "task".into()).unwrap();
            assert!(lock.peek().is_some());
        }
        assert!(lock.peek().is_none());
        assert!(lock.try_acquire("s2".into(), "other".into()).is_some());
    }

    #[test]
    fn peek_reports_the_held_session() {
        let lock = BusyLock::new();
        let _guard = lock.try_acquire("s1".into(), "doing a thing".into()).unwrap();
        let state = lock.peek().unwrap();
        assert_eq!(state.session_key, "s1");
        assert_eq!(state.task_preview, "doing a thing");
    }
}
