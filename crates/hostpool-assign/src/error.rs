//! Assignment engine error types.

use std::time::Duration;

use thiserror::Error;

use hostpool_state::{StateError, Tier};

/// Errors that can occur while provisioning or releasing assignments.
///
/// "No eligible server" is not an error; see `ProvisionOutcome::NoEligibleServer`.
#[derive(Debug, Error)]
pub enum AssignError {
    #[error("server {0} is at capacity")]
    CapacityExceeded(String),

    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("invalid rule configuration for tier {tier}: {reason}")]
    InvalidRuleConfiguration { tier: Tier, reason: String },

    #[error("assignment rule for tier {0} is disabled")]
    RuleDisabled(Tier),

    #[error("request timed out after {0:?}")]
    RequestTimedOut(Duration),

    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("assignment not found: {0}")]
    AssignmentNotFound(String),

    #[error("assignment already released: {0}")]
    AlreadyReleased(String),

    #[error("server {server_id} still hosts {teams} team(s)")]
    ServerNotDrained { server_id: String, teams: u32 },

    #[error("invalid request transition: {0}")]
    InvalidTransition(String),

    #[error("state store error: {0}")]
    State(StateError),

    #[error("runtime error: {0}")]
    Runtime(#[from] anyhow::Error),
}

impl AssignError {
    /// Races lost at commit time; the whole pipeline may be rerun.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssignError::CapacityExceeded(_) | AssignError::ConcurrentModification(_)
        )
    }
}

impl From<StateError> for AssignError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::CapacityExceeded { server_id, .. } => AssignError::CapacityExceeded(server_id),
            other => AssignError::State(other),
        }
    }
}

pub type AssignResult<T> = Result<T, AssignError>;
