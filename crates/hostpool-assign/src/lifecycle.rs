//! Provisioning request state machine.
//!
//! ```text
//! Requested → Filtering → Ranking → Committing → Active → Released
//!     └──────────┴───────────┴──────────┴──→ Rejected
//! ```
//!
//! Nothing is written before `Committing`; a request dropped earlier leaves
//! no trace. `Active` and `Rejected` end a request; only `release` moves an
//! `Active` assignment on.

use hostpool_state::AssignmentStatus;
use serde::{Deserialize, Serialize};

use crate::error::{AssignError, AssignResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    Requested,
    Filtering,
    Ranking,
    Committing,
    Active,
    Rejected,
    Released,
}

impl RequestPhase {
    pub fn can_transition_to(self, next: RequestPhase) -> bool {
        use RequestPhase::*;
        matches!(
            (self, next),
            (Requested, Filtering)
                | (Filtering, Ranking)
                | (Ranking, Committing)
                | (Committing, Active)
                | (Requested | Filtering | Ranking | Committing, Rejected)
                | (Active, Released)
        )
    }

    /// Move to `next`, refusing transitions the machine does not allow.
    pub fn transition(self, next: RequestPhase) -> AssignResult<RequestPhase> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AssignError::InvalidTransition(format!("{self:?} -> {next:?}")))
        }
    }
}

impl From<AssignmentStatus> for RequestPhase {
    fn from(status: AssignmentStatus) -> Self {
        match status {
            AssignmentStatus::Active => RequestPhase::Active,
            AssignmentStatus::Released => RequestPhase::Released,
        }
    }
}
