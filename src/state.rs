//! Shared gateway state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the process-wide storage area, which plays the role of one browser
//! origin: every websocket connection joins its poll's whiteboard through its
//! own `tab()` handle, so connections fan out to each other exactly as
//! sibling tabs would.
//!
//! A participant id may be live at most once per poll. Two connections with
//! the same id would share one heartbeat key, and whichever closed first
//! would erase the other's presence. `claim_session` enforces this; the
//! returned `SessionClaim` releases the slot on drop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::ChannelConfig;
use crate::keys;
use crate::storage::LocalStore;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;

/// Clone is required by Axum; all fields are Arc-backed or `Copy`.
#[derive(Clone)]
pub struct AppState {
    pub store: LocalStore,
    pub config: ChannelConfig,
    /// Live `(poll, participant)` pairs, keyed by heartbeat key.
    sessions: Arc<Mutex<HashSet<String>>>,
}

impl AppState {
    #[must_use]
    pub fn new(store: LocalStore, config: ChannelConfig) -> Self {
        Self { store, config, sessions: Arc::new(Mutex::new(HashSet::new())) }
    }

    /// Fresh tab handle for one connection.
    #[must_use]
    pub fn tab(&self) -> LocalStore {
        self.store.tab()
    }

    /// Reserve `participant_id` in `poll_id`. `None` if it is already live.
    #[must_use]
    pub fn claim_session(&self, poll_id: &str, participant_id: &str) -> Option<SessionClaim> {
        let key = keys::heartbeat_key(poll_id, participant_id);
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if !sessions.insert(key.clone()) {
            return None;
        }
        Some(SessionClaim { sessions: Arc::clone(&self.sessions), key })
    }
}

/// Held for the lifetime of one websocket connection.
pub struct SessionClaim {
    sessions: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.key);
    }
}
