//! StateStore: redb-backed persistence for server pools, rules and assignments.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. Reads
//! run in a single MVCC read transaction, so every listing is a
//! point-in-time snapshot. redb serializes write transactions; the
//! [`WriteScope`] handed out by [`StateStore::transact`] is therefore the
//! compare-and-swap point for `assigned_team_count`.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const ASSIGNMENT_SEQ: &str = "assignment_seq";

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Everything the filter needs about one tier, read in one transaction.
#[derive(Debug, Clone)]
pub struct PoolView {
    pub tier: Tier,
    /// Servers of the tier ordered by id.
    pub servers: Vec<Server>,
    /// Latest rule version, if the tier was ever configured.
    pub rule: Option<AssignmentRule>,
    /// Active assignments of the tier.
    pub assignments: Vec<Assignment>,
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(SERVERS).map_err(map_err!(Table))?;
        txn.open_table(RULES).map_err(map_err!(Table))?;
        txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run `f` inside one write transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`; on `Err` it is
    /// aborted and nothing `f` wrote becomes visible.
    pub fn transact<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteScope<'_>) -> Result<T, E>,
        E: From<StateError>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = {
            let mut scope = WriteScope { txn: &txn };
            f(&mut scope)
        };
        match outcome {
            Ok(value) => {
                txn.commit().map_err(map_err!(Transaction))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    warn!(error = %abort, "failed to abort write transaction");
                }
                Err(e)
            }
        }
    }

    // ── Servers ────────────────────────────────────────────────────

    /// Register a new server.
    ///
    /// Fails with [`StateError::AlreadyExists`] if the id is taken; an
    /// existing record, and its team count, is never replaced.
    pub fn insert_server(&self, server: &Server) -> StateResult<()> {
        if server.id.is_empty() {
            return Err(StateError::Invalid("server id must not be empty".to_string()));
        }
        if !server.hourly_cost.is_finite() || server.hourly_cost < 0.0 {
            return Err(StateError::Invalid(format!(
                "server {} hourly_cost must be a non-negative number",
                server.id
            )));
        }
        if server.assigned_team_count > server.max_team_count {
            return Err(StateError::Invalid(format!(
                "server {} holds {} teams but allows {}",
                server.id, server.assigned_team_count, server.max_team_count
            )));
        }
        self.transact(|scope| {
            if scope.get_server(&server.id)?.is_some() {
                return Err(StateError::AlreadyExists(format!("server {}", server.id)));
            }
            scope.put_server(server)
        })?;
        debug!(server = %server.id, tier = %server.tier, "server registered");
        Ok(())
    }

    /// Get a server by ID.
    pub fn get_server(&self, server_id: &str) -> StateResult<Option<Server>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVERS).map_err(map_err!(Table))?;
        match table.get(server_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Point-in-time list of a tier's servers, ordered by id.
    pub fn list_servers(&self, tier: Tier) -> StateResult<Vec<Server>> {
        Ok(self
            .list_all_servers()?
            .into_iter()
            .filter(|s| s.tier == tier)
            .collect())
    }

    /// List every server, ordered by id.
    pub fn list_all_servers(&self) -> StateResult<Vec<Server>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Change a server's status.
    pub fn set_server_status(&self, server_id: &str, status: ServerStatus) -> StateResult<Server> {
        self.transact(|scope| scope.set_status(server_id, status))
    }

    /// Adjust a server's team count by `delta`.
    ///
    /// Fails with [`StateError::CapacityExceeded`] if the result would exceed
    /// `max_team_count`.
    pub fn record_assignment(&self, server_id: &str, delta: i32) -> StateResult<Server> {
        self.transact(|scope| scope.adjust_team_count(server_id, delta))
    }

    /// Apply a utilization sample. Returns false if the sample is older than
    /// the one already held (last writer by sample time wins).
    pub fn refresh_utilization(
        &self,
        server_id: &str,
        sample: &UtilizationSample,
    ) -> StateResult<bool> {
        let usage = sample.utilization();
        if !usage.is_valid() {
            return Err(StateError::Invalid(format!(
                "utilization sample for {server_id} outside [0, 100]"
            )));
        }
        self.transact(|scope| {
            let mut server = scope.require_server(server_id)?;
            if sample.timestamp < server.sampled_at {
                debug!(server = %server_id, sample = sample.timestamp, held = server.sampled_at, "stale utilization sample ignored");
                return Ok(false);
            }
            if sample.timestamp == server.sampled_at && server.utilization == usage {
                return Ok(true);
            }
            server.utilization = usage;
            server.sampled_at = sample.timestamp;
            scope.touch_and_put(&mut server)?;
            Ok(true)
        })
    }

    // ── Rules ──────────────────────────────────────────────────────

    /// Validate and store `rule` as the tier's next version.
    pub fn put_rule(&self, rule: &AssignmentRule) -> StateResult<AssignmentRule> {
        rule.validate().map_err(StateError::Invalid)?;
        let stored = self.transact(|scope| {
            let latest = scope.active_rule(rule.tier)?.map_or(0, |r| r.version);
            let mut next = rule.clone();
            next.version = latest + 1;
            next.updated_at = epoch_secs();
            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            let mut table = scope.txn.open_table(RULES).map_err(map_err!(Table))?;
            table
                .insert(next.table_key().as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            Ok::<_, StateError>(next)
        })?;
        debug!(tier = %stored.tier, version = stored.version, "assignment rule stored");
        Ok(stored)
    }

    /// The latest rule version for a tier.
    pub fn get_active_rule(&self, tier: Tier) -> StateResult<Option<AssignmentRule>> {
        Ok(self.list_rule_versions(tier)?.pop())
    }

    /// All rule versions for a tier, oldest first.
    pub fn list_rule_versions(&self, tier: Tier) -> StateResult<Vec<AssignmentRule>> {
        let prefix = format!("{}:", tier.as_str());
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RULES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                results.push(decode(value.value())?);
            }
        }
        Ok(results)
    }

    // ── Assignments ────────────────────────────────────────────────

    /// Get an assignment by ID.
    pub fn get_assignment(&self, id: &str) -> StateResult<Option<Assignment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all assignments, active and released.
    pub fn list_assignments(&self) -> StateResult<Vec<Assignment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Active assignments held by a team, across tiers.
    pub fn list_active_assignments_for_team(&self, team_id: &str) -> StateResult<Vec<Assignment>> {
        Ok(self
            .list_assignments()?
            .into_iter()
            .filter(|a| a.is_active() && a.team_id == team_id)
            .collect())
    }

    /// Active assignments placed on a server.
    pub fn list_active_assignments_for_server(
        &self,
        server_id: &str,
    ) -> StateResult<Vec<Assignment>> {
        Ok(self
            .list_assignments()?
            .into_iter()
            .filter(|a| a.is_active() && a.server_id == server_id)
            .collect())
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Read a tier's servers, active rule and active assignments together.
    pub fn read_pool(&self, tier: Tier) -> StateResult<PoolView> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;

        let mut servers = Vec::new();
        {
            let table = txn.open_table(SERVERS).map_err(map_err!(Table))?;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let server: Server = decode(value.value())?;
                if server.tier == tier {
                    servers.push(server);
                }
            }
        }

        let mut rule = None;
        {
            let prefix = format!("{}:", tier.as_str());
            let table = txn.open_table(RULES).map_err(map_err!(Table))?;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                if key.value().starts_with(&prefix) {
                    rule = Some(decode(value.value())?);
                }
            }
        }

        let mut assignments = Vec::new();
        {
            let table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let assignment: Assignment = decode(value.value())?;
                if assignment.tier == tier && assignment.is_active() {
                    assignments.push(assignment);
                }
            }
        }

        Ok(PoolView {
            tier,
            servers,
            rule,
            assignments,
        })
    }
}

/// Typed access to an open write transaction.
pub struct WriteScope<'a> {
    txn: &'a WriteTransaction,
}

impl WriteScope<'_> {
    pub fn get_server(&self, server_id: &str) -> StateResult<Option<Server>> {
        let table = self.txn.open_table(SERVERS).map_err(map_err!(Table))?;
        match table.get(server_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn require_server(&self, server_id: &str) -> StateResult<Server> {
        self.get_server(server_id)?
            .ok_or_else(|| StateError::NotFound(format!("server {server_id}")))
    }

    /// Servers of one tier, ordered by id.
    pub fn list_servers(&self, tier: Tier) -> StateResult<Vec<Server>> {
        let table = self.txn.open_table(SERVERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let server: Server = decode(value.value())?;
            if server.tier == tier {
                results.push(server);
            }
        }
        Ok(results)
    }

    fn put_server(&mut self, server: &Server) -> StateResult<()> {
        let value = serde_json::to_vec(server).map_err(map_err!(Serialize))?;
        let mut table = self.txn.open_table(SERVERS).map_err(map_err!(Table))?;
        table
            .insert(server.id.as_str(), value.as_slice())
            .map_err(map_err!(Write))?;
        Ok(())
    }

    /// Bump revision and timestamp, then write the server back.
    fn touch_and_put(&mut self, server: &mut Server) -> StateResult<()> {
        server.revision += 1;
        server.updated_at = epoch_secs();
        self.put_server(server)
    }

    pub fn set_status(&mut self, server_id: &str, status: ServerStatus) -> StateResult<Server> {
        let mut server = self.require_server(server_id)?;
        server.status = status;
        self.touch_and_put(&mut server)?;
        debug!(server = %server_id, ?status, "server status changed");
        Ok(server)
    }

    /// The single mutator of `assigned_team_count`.
    pub fn adjust_team_count(&mut self, server_id: &str, delta: i32) -> StateResult<Server> {
        let mut server = self.require_server(server_id)?;
        let next = i64::from(server.assigned_team_count) + i64::from(delta);
        if next > i64::from(server.max_team_count) {
            return Err(StateError::CapacityExceeded {
                server_id: server_id.to_string(),
                max: server.max_team_count,
            });
        }
        if next < 0 {
            return Err(StateError::Invalid(format!(
                "team count of {server_id} would drop below zero"
            )));
        }
        server.assigned_team_count = next as u32;
        self.touch_and_put(&mut server)?;
        debug!(server = %server_id, delta, count = server.assigned_team_count, "team count adjusted");
        Ok(server)
    }

    pub fn active_rule(&self, tier: Tier) -> StateResult<Option<AssignmentRule>> {
        let prefix = format!("{}:", tier.as_str());
        let table = self.txn.open_table(RULES).map_err(map_err!(Table))?;
        let mut latest = None;
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                latest = Some(decode(value.value())?);
            }
        }
        Ok(latest)
    }

    pub fn get_assignment(&self, id: &str) -> StateResult<Option<Assignment>> {
        let table = self.txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Active assignments of one tier.
    pub fn active_assignments(&self, tier: Tier) -> StateResult<Vec<Assignment>> {
        let table = self.txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let assignment: Assignment = decode(value.value())?;
            if assignment.tier == tier && assignment.is_active() {
                results.push(assignment);
            }
        }
        Ok(results)
    }

    pub fn put_assignment(&mut self, assignment: &Assignment) -> StateResult<()> {
        let value = serde_json::to_vec(assignment).map_err(map_err!(Serialize))?;
        let mut table = self.txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        table
            .insert(assignment.id.as_str(), value.as_slice())
            .map_err(map_err!(Write))?;
        Ok(())
    }

    /// Allocate the next assignment ID (`asg-0000000001`, ...).
    pub fn next_assignment_id(&mut self) -> StateResult<AssignmentId> {
        let mut table = self.txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        let current = table
            .get(ASSIGNMENT_SEQ)
            .map_err(map_err!(Read))?
            .map_or(0, |guard| guard.value());
        let next = current + 1;
        table.insert(ASSIGNMENT_SEQ, next).map_err(map_err!(Write))?;
        Ok(format!("asg-{next:010}"))
    }
}
