//! Cancellation channel: a single-producer/single-consumer mailbox per
//! session (`spec.md` §4.4, §9). Modeled as a bounded single-slot mailbox
//! with non-blocking try-send (`cancel`) and try-receive (`take`); the
//! guard is a pure function over a `CancelToken`, no thread-local state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use swarm_domain::error::{Error, Result};

#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    /// Post a `CANCEL` signal (non-blocking try-send: there is only one
    /// slot, and posting twice before it is read is a no-op).
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Drain the channel, returning whether a `CANCEL` was pending. Used by
    /// the guard, which must consult-and-clear atomically so a single
    /// posted cancellation aborts exactly one in-flight run.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The guard function called before every model invocation and every tool
/// invocation (`spec.md` §4.4). Raises `Error::Cancelled` if a `CANCEL` was
/// pending, draining it in the process.
pub fn check_cancellation(token: &CancelToken) -> Result<()> {
    if token.take() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Per-node table of per-session cancellation tokens.
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        CancelMap {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the token for `session_key`, resetting any stale
    /// pending signal — called once at the start of a session run.
    pub fn register(&self, session_key: &str) -> CancelToken {
        let mut tokens = self.tokens.lock();
        let token = tokens.entry(session_key.to_string()).or_insert_with(CancelToken::new);
        token.take(); // clear any stale signal from a prior run
        token.clone()
    }

    /// Post `CANCEL` to `session_key`'s channel. Returns `true` if a
    /// session with that key was running (had a registered token).
    pub fn post(&self, session_key: &str) -> bool {
        let tokens = self.tokens.lock();
        if let Some(token) = tokens.get(session_key) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn remove(&self, session_key: &str) {
        self.tokens.lock().remove(session_key);
    }
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_then_take_observes_and_clears() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.take());
        assert!(!token.take(), "a second take must observe no pending signal");
    }

    #[test]
    fn guard_raises_cancelled_exactly_once() {
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(check_cancellation(&token), Err(Error::Cancelled)));
        assert!(check_cancellation(&token).is_ok());
    }

    #[test]
    fn map_post_to_unknown_session_returns_false() {
        let map = CancelMap::new();
        assert!(!map.post("nope"));
    }

    #[test]
    fn map_register_then_post_then_take_roundtrips() {
        let map = CancelMap::new();
        let token = map.register("s1");
        assert!(map.post("s1"));
        assert!(token.take());
    }

    #[test]
    fn register_clears_a_stale_signal_from_a_prior_run() {
        let map = CancelMap::new();
        let token = map.register("s1");
        token.cancel();
        let token_again = map.register("s1");
        assert!(!token_again.is_cancelled());
    }
}
