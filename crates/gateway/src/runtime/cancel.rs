//! Per-session cancellation tokens with group fan-out.
//!
//! Each running turn gets a `CancelToken`. Calling `cancel()` on it signals
//! the runtime to stop the current turn cleanly.
//!
//! **Groups** support cascading cancellation: when a parent turn is
//! cancelled, all children registered in its group are cancelled too. The
//! sub-agent scheduler registers child session keys in the parent's group.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A cancellation token checked by the runtime loop before every provider
/// call and every skill invocation.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Tracks active cancellation tokens per session key, with group support
/// for cascading parent→child cancellation.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
    /// group key (parent session) → set of child session keys.
    groups: Mutex<HashMap<String, HashSet<String>>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new cancel token for a session.
    pub fn register(&self, session_key: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens
            .lock()
            .insert(session_key.to_owned(), token.clone());
        token
    }

    /// Cancel a running turn for a session, cascading to all children in
    /// the session's cancel group. Returns true if a token was found.
    pub fn cancel(&self, session_key: &str) -> bool {
        let found = if let Some(token) = self.tokens.lock().get(session_key) {
            token.cancel();
            true
        } else {
            false
        };

        if let Some(children) = self.groups.lock().get(session_key) {
            let tokens = self.tokens.lock();
            for child_key in children {
                if let Some(child_token) = tokens.get(child_key) {
                    child_token.cancel();
                }
            }
        }

        found
    }

    /// Remove the token for a session (called when a turn completes).
    pub fn remove(&self, session_key: &str) {
        self.tokens.lock().remove(session_key);
        self.groups.lock().remove(session_key);
    }

    /// Check if a session has an active (running) turn.
    pub fn is_running(&self, session_key: &str) -> bool {
        self.tokens.lock().contains_key(session_key)
    }

    /// Register a child session key in a parent's cancel group.
    pub fn add_to_group(&self, parent_key: &str, child_key: &str) {
        self.groups
            .lock()
            .entry(parent_key.to_owned())
            .or_default()
            .insert(child_key.to_owned());
    }

    /// Remove a child from a parent's cancel group.
    pub fn remove_from_group(&self, parent_key: &str, child_key: &str) {
        let mut groups = self.groups.lock();
        if let Some(children) = groups.get_mut(parent_key) {
            children.remove(child_key);
            if children.is_empty() {
                groups.remove(parent_key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clone_shares_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn register_and_cancel() {
        let map = CancelMap::new();
        let token = map.register("s1");
        assert!(map.is_running("s1"));
        assert!(map.cancel("s1"));
        assert!(token.is_cancelled());
        map.remove("s1");
        assert!(!map.is_running("s1"));
        assert!(!map.cancel("s1"));
    }

    #[test]
    fn cancel_cascades_to_group() {
        let map = CancelMap::new();
        let parent = map.register("parent");
        let child = map.register("subagent:r1");
        map.add_to_group("parent", "subagent:r1");

        map.cancel("parent");
        assert!(parent.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn removed_child_is_not_cascaded() {
        let map = CancelMap::new();
        map.register("p");
        let child = map.register("c");
        map.add_to_group("p", "c");
        map.remove_from_group("p", "c");
        map.cancel("p");
        assert!(!child.is_cancelled());
    }
}
