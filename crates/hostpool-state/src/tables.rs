//! redb table definitions for the hostpool state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Servers keyed by `{server_id}`.
pub const SERVERS: TableDefinition<&str, &[u8]> = TableDefinition::new("servers");

/// Assignment rules keyed by `{tier}:{version:010}` so a prefix scan yields versions in order.
pub const RULES: TableDefinition<&str, &[u8]> = TableDefinition::new("rules");

/// Assignments keyed by `{assignment_id}`.
pub const ASSIGNMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("assignments");

/// Monotonic counters (assignment sequence).
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");
