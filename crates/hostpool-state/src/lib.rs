//! hostpool-state: embedded state store for hostpool.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the per-tier server pools (the registry), the versioned
//! assignment rules, and the assignment journal.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Rules use composite keys (`{tier}:{version}`) so a prefix scan returns
//! every version of a tier in order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across threads and async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{PoolView, StateStore, WriteScope, epoch_secs};
pub use types::*;
