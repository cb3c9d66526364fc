//! hostpool-assign: turns a team's provisioning request into a committed
//! assignment.
//!
//! # Pipeline
//!
//! ```text
//! provision(team, tier, resource)
//!   → read_pool(tier)          one read snapshot
//!   → filter + select          hostpool-placement, lock free
//!   → transaction::commit      one redb write txn, re-validates live state
//!   → DeploymentTrigger        after commit; failures only logged
//! ```
//!
//! Lost commit races are retried on a fresh snapshot. Release, offboarding,
//! drain and decommission go through the same transaction module so the
//! per-server team count has exactly one writer path.

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod stats;
pub mod transaction;
pub mod trigger;

pub use engine::{AssignmentEngine, DrainReport, Preview, ProvisionOutcome, resolve_rule};
pub use error::{AssignError, AssignResult};
pub use lifecycle::RequestPhase;
pub use stats::PoolStats;
pub use trigger::{DeployRequest, DeploymentTrigger, LogTrigger};
