//! Round-robin cursor.
//!
//! Remembers, per tier, the id of the server that received the last
//! successful assignment. The cursor only moves after a commit succeeds;
//! selection itself never mutates it.

use std::collections::HashMap;
use std::sync::Mutex;

use hostpool_state::{ServerId, Tier};

/// Per-tier rotation state for the round-robin strategy.
#[derive(Debug, Default)]
pub struct RoundRobinCursors {
    last: Mutex<HashMap<Tier, ServerId>>,
}

impl RoundRobinCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the last server assigned in `tier`, if any.
    pub fn position(&self, tier: Tier) -> Option<ServerId> {
        self.lock().get(&tier).cloned()
    }

    /// Record a successful assignment to `server_id`.
    pub fn advance(&self, tier: Tier, server_id: &str) {
        self.lock().insert(tier, server_id.to_string());
    }

    /// Forget the rotation for a tier.
    pub fn reset(&self, tier: Tier) {
        self.lock().remove(&tier);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Tier, ServerId>> {
        // A poisoned cursor map still holds valid ids.
        self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
