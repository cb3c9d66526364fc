//! hostpool placement: capacity filtering and server selection.
//!
//! This crate decides *where* a team goes. It never writes state: every
//! function works on snapshots read from `hostpool-state`, so filters and
//! strategies can run unsynchronized across concurrent requests. Committing
//! the choice is `hostpool-assign`'s job.
//!
//! # Components
//!
//! - **`filter`**: Capacity filter (status, team cap, min spec, thresholds, cost)
//! - **`strategy`**: Assignment strategies (lowest-usage, round-robin, region, dedicated)
//! - **`cursor`**: Per-tier round-robin cursor

pub mod cursor;
pub mod filter;
pub mod strategy;

pub use cursor::RoundRobinCursors;
pub use filter::{FilterContext, Rejection, check, filter, min_spec_satisfiable, team_cap};
pub use strategy::{Selection, select};
