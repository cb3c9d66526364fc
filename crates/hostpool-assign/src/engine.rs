//! Assignment engine: drives a provisioning request from snapshot to commit.
//!
//! Each attempt reads one snapshot of the tier, filters and ranks it without
//! locks, then hands the choice to [`transaction::commit`]. Commit races
//! (`CapacityExceeded`, `ConcurrentModification`) rerun the whole attempt on
//! a fresh snapshot, up to `max_commit_retries` times.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use hostpool_core::EngineConfig;
use hostpool_placement::{
    FilterContext, RoundRobinCursors, Selection, filter, min_spec_satisfiable, select,
};
use hostpool_state::*;

use crate::error::{AssignError, AssignResult};
use crate::lifecycle::RequestPhase;
use crate::stats::PoolStats;
use crate::transaction;
use crate::trigger::{DeployRequest, DeploymentTrigger, LogTrigger};

/// Result of a provisioning request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// A new assignment was committed.
    Provisioned(Assignment),
    /// The team already held an active assignment in the tier.
    Existing(Assignment),
    /// Nothing in the tier can take the team right now.
    NoEligibleServer { tier: Tier },
}

impl ProvisionOutcome {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            ProvisionOutcome::Provisioned(a) | ProvisionOutcome::Existing(a) => Some(a),
            ProvisionOutcome::NoEligibleServer { .. } => None,
        }
    }
}

/// Where the next team of a tier would go, without committing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub tier: Tier,
    pub rule_version: u64,
    /// Eligible servers, ordered by id.
    pub eligible: Vec<ServerId>,
    pub recommended: Option<ServerId>,
    pub policy: Option<AssignmentStrategy>,
    pub region_fallback: bool,
}

/// Outcome of draining a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainReport {
    pub server_id: ServerId,
    /// Replacement assignments on other servers.
    pub migrated: Vec<Assignment>,
    /// Assignments left in place because no other server could take them.
    pub stranded: Vec<Assignment>,
}

/// Resolve the rule a request runs under.
///
/// A tier that was never configured gets [`AssignmentRule::default_for`]
/// (version 0). Configuration problems are fatal and never retried.
pub fn resolve_rule(view: &PoolView) -> AssignResult<AssignmentRule> {
    let tier = view.tier;
    let rule = view
        .rule
        .clone()
        .unwrap_or_else(|| AssignmentRule::default_for(tier));

    if !rule.enabled {
        return Err(AssignError::RuleDisabled(tier));
    }
    rule.validate()
        .map_err(|reason| AssignError::InvalidRuleConfiguration { tier, reason })?;
    if !min_spec_satisfiable(&view.servers, &rule) {
        return Err(AssignError::InvalidRuleConfiguration {
            tier,
            reason: "no server in the pool meets the minimum server spec".to_string(),
        });
    }
    Ok(rule)
}

/// Provisioning front end shared by the API and the daemon.
#[derive(Clone)]
pub struct AssignmentEngine {
    store: StateStore,
    cursors: Arc<RoundRobinCursors>,
    config: EngineConfig,
    trigger: Arc<dyn DeploymentTrigger>,
}

impl AssignmentEngine {
    /// Create an engine that logs deployments instead of starting them.
    pub fn new(store: StateStore, config: EngineConfig) -> Self {
        Self {
            store,
            cursors: Arc::new(RoundRobinCursors::new()),
            config,
            trigger: Arc::new(LogTrigger),
        }
    }

    pub fn with_trigger(mut self, trigger: Arc<dyn DeploymentTrigger>) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn cursors(&self) -> &RoundRobinCursors {
        &self.cursors
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }

    // ── Provisioning ───────────────────────────────────────────────

    /// Assign `team_id` to a server of `tier`.
    ///
    /// A team that already holds an active assignment in the tier gets it
    /// back, so retrying after a timeout never double-books.
    pub fn provision(
        &self,
        team_id: &str,
        tier: Tier,
        resource: &ResourceSpec,
    ) -> AssignResult<ProvisionOutcome> {
        let max_retries = self.config.max_commit_retries;
        let mut retries = 0;
        let outcome = loop {
            match self.attempt(team_id, tier, resource) {
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;
                    debug!(team = %team_id, %tier, retries, error = %e, "commit lost a race, retrying");
                }
                Err(e) => {
                    warn!(team = %team_id, %tier, retries, error = %e, "provisioning failed");
                    return Err(e);
                }
                Ok(outcome) => break outcome,
            }
        };

        if let ProvisionOutcome::Provisioned(assignment) = &outcome {
            self.deploy(assignment);
        }
        Ok(outcome)
    }

    /// [`provision`](Self::provision) bounded by `timeout`.
    ///
    /// Timing out abandons the wait, not the work: a commit already under
    /// way still completes, and the retried request then finds it.
    pub async fn provision_within(
        &self,
        team_id: &str,
        tier: Tier,
        resource: &ResourceSpec,
        timeout: Duration,
    ) -> AssignResult<ProvisionOutcome> {
        let engine = self.clone();
        let team = team_id.to_string();
        let resource = resource.clone();
        let task = tokio::task::spawn_blocking(move || engine.provision(&team, tier, &resource));

        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined
                .map_err(|e| AssignError::Runtime(anyhow::anyhow!("provision task failed: {e}")))?,
            Err(_) => {
                warn!(team = %team_id, %tier, ?timeout, "provisioning request timed out");
                Err(AssignError::RequestTimedOut(timeout))
            }
        }
    }

    /// One pass of the pipeline over a fresh snapshot.
    fn attempt(
        &self,
        team_id: &str,
        tier: Tier,
        resource: &ResourceSpec,
    ) -> AssignResult<ProvisionOutcome> {
        let mut phase = RequestPhase::Requested;
        let view = self.store.read_pool(tier)?;

        if let Some(existing) = view.assignments.iter().find(|a| a.team_id == team_id) {
            debug!(team = %team_id, assignment = %existing.id, "team already assigned in tier");
            return Ok(ProvisionOutcome::Existing(existing.clone()));
        }

        phase = phase.transition(RequestPhase::Filtering)?;
        let rule = resolve_rule(&view)?;
        let eligible = filter(&view.servers, &rule, &FilterContext::from_pool(&view));

        phase = phase.transition(RequestPhase::Ranking)?;
        let cursor = self.cursors.position(tier);
        let Some(selection) = select(&eligible, &rule, cursor.as_deref()) else {
            phase.transition(RequestPhase::Rejected)?;
            info!(team = %team_id, %tier, pool = view.servers.len(), "no eligible server");
            return Ok(ProvisionOutcome::NoEligibleServer { tier });
        };

        phase = phase.transition(RequestPhase::Committing)?;
        let assignment =
            match transaction::commit(&self.store, team_id, &selection.server, &rule, resource) {
                Ok(assignment) => assignment,
                Err(e) => {
                    phase.transition(RequestPhase::Rejected)?;
                    debug!(team = %team_id, server = %selection.server.id, error = %e, "commit rejected");
                    return Err(e);
                }
            };
        phase.transition(RequestPhase::Active)?;

        self.after_commit(&selection, &assignment);
        Ok(ProvisionOutcome::Provisioned(assignment))
    }

    fn after_commit(&self, selection: &Selection, assignment: &Assignment) {
        if selection.policy == AssignmentStrategy::RoundRobin {
            self.cursors.advance(assignment.tier, &assignment.server_id);
        }
    }

    fn deploy(&self, assignment: &Assignment) {
        if let Err(e) = self.trigger.deploy(&DeployRequest::from(assignment)) {
            warn!(
                assignment = %assignment.id,
                server = %assignment.server_id,
                error = %e,
                "deployment trigger failed; assignment stays active"
            );
        }
    }

    // ── Release ────────────────────────────────────────────────────

    pub fn release(&self, assignment_id: &str) -> AssignResult<Assignment> {
        transaction::release(&self.store, assignment_id)
    }

    /// Release every active assignment a team holds, across tiers.
    pub fn offboard_team(&self, team_id: &str) -> AssignResult<Vec<Assignment>> {
        let mut released = Vec::new();
        for assignment in self.store.list_active_assignments_for_team(team_id)? {
            match transaction::release(&self.store, &assignment.id) {
                Ok(a) => released.push(a),
                // Released by a concurrent request.
                Err(AssignError::AlreadyReleased(_)) => {}
                Err(e) => return Err(e),
            }
        }
        info!(team = %team_id, released = released.len(), "team offboarded");
        Ok(released)
    }

    // ── Rules ──────────────────────────────────────────────────────

    /// Store a new rule version for its tier.
    ///
    /// Switching a tier to another strategy restarts its round-robin
    /// rotation.
    pub fn update_rule(&self, rule: &AssignmentRule) -> AssignResult<AssignmentRule> {
        let previous = self.store.get_active_rule(rule.tier)?;
        let stored = self.store.put_rule(rule).map_err(|e| match e {
            StateError::Invalid(reason) => AssignError::InvalidRuleConfiguration {
                tier: rule.tier,
                reason,
            },
            other => other.into(),
        })?;
        if previous.is_some_and(|p| p.assignment_strategy != stored.assignment_strategy) {
            self.cursors.reset(stored.tier);
            debug!(tier = %stored.tier, "strategy changed, round-robin cursor reset");
        }
        info!(
            tier = %stored.tier,
            version = stored.version,
            strategy = ?stored.assignment_strategy,
            "assignment rule updated"
        );
        Ok(stored)
    }

    // ── Server lifecycle ───────────────────────────────────────────

    /// Change a server's status.
    ///
    /// Retiring goes through [`decommission`](Self::decommission); a retired
    /// server never comes back.
    pub fn set_server_status(&self, server_id: &str, status: ServerStatus) -> AssignResult<Server> {
        if status == ServerStatus::Retired {
            return self.decommission(server_id);
        }
        let server = self.store.transact(|scope| {
            let current = scope
                .get_server(server_id)?
                .ok_or_else(|| AssignError::ServerNotFound(server_id.to_string()))?;
            if current.status == ServerStatus::Retired {
                return Err(AssignError::InvalidTransition(format!(
                    "server {server_id} is retired"
                )));
            }
            Ok(scope.set_status(server_id, status)?)
        })?;
        info!(server = %server_id, ?status, "server status updated");
        Ok(server)
    }

    /// Put a server into maintenance and move its teams elsewhere in the tier.
    pub fn drain_server(&self, server_id: &str) -> AssignResult<DrainReport> {
        self.set_server_status(server_id, ServerStatus::Maintenance)?;

        let mut report = DrainReport {
            server_id: server_id.to_string(),
            migrated: Vec::new(),
            stranded: Vec::new(),
        };
        for assignment in self.store.list_active_assignments_for_server(server_id)? {
            match self.relocate(&assignment) {
                Ok(Some(moved)) => {
                    self.deploy(&moved);
                    report.migrated.push(moved);
                }
                // Offboarded while the drain was running.
                Ok(None) if !self.is_still_active(&assignment.id)? => {}
                Ok(None) => report.stranded.push(assignment),
                Err(e @ AssignError::State(_)) => return Err(e),
                Err(e) => {
                    warn!(assignment = %assignment.id, error = %e, "could not relocate assignment");
                    report.stranded.push(assignment);
                }
            }
        }

        info!(
            server = %server_id,
            migrated = report.migrated.len(),
            stranded = report.stranded.len(),
            "server drained"
        );
        Ok(report)
    }

    fn is_still_active(&self, assignment_id: &str) -> AssignResult<bool> {
        Ok(self
            .store
            .get_assignment(assignment_id)?
            .is_some_and(|a| a.is_active()))
    }

    /// Migrate one assignment, retrying lost races. `None` when no server can take it.
    fn relocate(&self, assignment: &Assignment) -> AssignResult<Option<Assignment>> {
        let tier = assignment.tier;
        let mut retries = 0;
        loop {
            let view = self.store.read_pool(tier)?;
            if !view.assignments.iter().any(|a| a.id == assignment.id) {
                return Ok(None);
            }
            let rule = resolve_rule(&view)?;
            let eligible = filter(&view.servers, &rule, &FilterContext::from_pool(&view));
            let cursor = self.cursors.position(tier);
            let Some(selection) = select(&eligible, &rule, cursor.as_deref()) else {
                return Ok(None);
            };

            match transaction::migrate(&self.store, &assignment.id, &selection.server, &rule) {
                Ok(moved) => {
                    self.after_commit(&selection, &moved);
                    return Ok(Some(moved));
                }
                Err(AssignError::AlreadyReleased(_)) => return Ok(None),
                Err(e) if e.is_retryable() && retries < self.config.max_commit_retries => {
                    retries += 1;
                    debug!(assignment = %assignment.id, retries, error = %e, "migration lost a race, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Retire an empty server for good.
    pub fn decommission(&self, server_id: &str) -> AssignResult<Server> {
        let server = self.store.transact(|scope| {
            let server = scope
                .get_server(server_id)?
                .ok_or_else(|| AssignError::ServerNotFound(server_id.to_string()))?;
            if server.assigned_team_count > 0 {
                return Err(AssignError::ServerNotDrained {
                    server_id: server_id.to_string(),
                    teams: server.assigned_team_count,
                });
            }
            if server.status == ServerStatus::Retired {
                return Ok(server);
            }
            Ok(scope.set_status(server_id, ServerStatus::Retired)?)
        })?;
        info!(server = %server_id, tier = %server.tier, "server decommissioned");
        Ok(server)
    }

    // ── Read-only views ────────────────────────────────────────────

    /// Run filter and strategy on the current pool without committing.
    pub fn preview(&self, tier: Tier) -> AssignResult<Preview> {
        let view = self.store.read_pool(tier)?;
        let rule = resolve_rule(&view)?;
        let eligible = filter(&view.servers, &rule, &FilterContext::from_pool(&view));
        let cursor = self.cursors.position(tier);
        let selection = select(&eligible, &rule, cursor.as_deref());

        Ok(Preview {
            tier,
            rule_version: rule.version,
            eligible: eligible.into_iter().map(|s| s.id).collect(),
            recommended: selection.as_ref().map(|s| s.server.id.clone()),
            policy: selection.as_ref().map(|s| s.policy),
            region_fallback: selection.is_some_and(|s| s.region_fallback),
        })
    }

    pub fn stats(&self, tier: Tier) -> AssignResult<PoolStats> {
        let view = self.store.read_pool(tier)?;
        Ok(PoolStats::collect(&view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTrigger {
        requests: Mutex<Vec<DeployRequest>>,
    }

    impl DeploymentTrigger for RecordingTrigger {
        fn deploy(&self, request: &DeployRequest) -> anyhow::Result<()> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    struct FailingTrigger;

    impl DeploymentTrigger for FailingTrigger {
        fn deploy(&self, _request: &DeployRequest) -> anyhow::Result<()> {
            anyhow::bail!("runner unreachable")
        }
    }

    fn make_server(id: &str, tier: Tier, cpu: f64) -> Server {
        Server {
            id: id.to_string(),
            tier,
            provider: "hetzner".to_string(),
            region: "eu-central-1".to_string(),
            specs: ServerSpecs {
                cpu_cores: 4,
                memory_gb: 16,
                storage_gb: 160,
            },
            status: ServerStatus::Active,
            utilization: Utilization {
                cpu_pct: cpu,
                mem_pct: 10.0,
                storage_pct: 10.0,
            },
            sampled_at: 1,
            assigned_team_count: 0,
            max_team_count: 10,
            hourly_cost: 0.05,
            revision: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn app(name: &str) -> ResourceSpec {
        ResourceSpec {
            kind: ResourceKind::App,
            name: name.to_string(),
        }
    }

    fn engine_with(servers: &[Server]) -> AssignmentEngine {
        let store = StateStore::open_in_memory().unwrap();
        for s in servers {
            store.insert_server(s).unwrap();
        }
        AssignmentEngine::new(store, EngineConfig::default())
    }

    fn rule(tier: Tier, strategy: AssignmentStrategy) -> AssignmentRule {
        let mut rule = AssignmentRule::default_for(tier);
        rule.assignment_strategy = strategy;
        rule
    }

    #[test]
    fn provision_picks_lowest_usage_and_triggers_deploy() {
        let engine = engine_with(&[
            make_server("s1", Tier::Pro, 50.0),
            make_server("s2", Tier::Pro, 20.0),
        ]);
        let trigger = Arc::new(RecordingTrigger::default());
        let engine = engine.with_trigger(trigger.clone());

        let outcome = engine.provision("team-a", Tier::Pro, &app("web")).unwrap();
        let ProvisionOutcome::Provisioned(a) = outcome else {
            panic!("expected a new assignment, got {outcome:?}");
        };
        assert_eq!(a.server_id, "s2");
        assert_eq!(a.rule_version, 0);

        let requests = trigger.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].server_id, "s2");
        assert_eq!(requests[0].team_id, "team-a");
    }

    #[test]
    fn provision_is_idempotent_per_team_and_tier() {
        let engine = engine_with(&[
            make_server("s1", Tier::Pro, 10.0),
            make_server("f1", Tier::Free, 10.0),
        ]);

        let first = engine.provision("team-a", Tier::Pro, &app("web")).unwrap();
        let again = engine.provision("team-a", Tier::Pro, &app("web")).unwrap();
        assert!(matches!(again, ProvisionOutcome::Existing(_)));
        assert_eq!(first.assignment(), again.assignment());
        assert_eq!(engine.store().get_server("s1").unwrap().unwrap().assigned_team_count, 1);

        // Other tiers are independent.
        let free = engine.provision("team-a", Tier::Free, &app("web")).unwrap();
        assert!(matches!(free, ProvisionOutcome::Provisioned(_)));
    }

    #[test]
    fn empty_pool_is_no_eligible_server() {
        let engine = engine_with(&[]);
        let outcome = engine.provision("team-a", Tier::Enterprise, &app("web")).unwrap();
        assert_eq!(outcome, ProvisionOutcome::NoEligibleServer { tier: Tier::Enterprise });
    }

    #[test]
    fn disabled_rule_is_rejected() {
        let engine = engine_with(&[make_server("s1", Tier::Pro, 10.0)]);
        let mut r = rule(Tier::Pro, AssignmentStrategy::LowestUsage);
        r.enabled = false;
        engine.update_rule(&r).unwrap();

        assert!(matches!(
            engine.provision("team-a", Tier::Pro, &app("web")),
            Err(AssignError::RuleDisabled(Tier::Pro))
        ));
    }

    #[test]
    fn unsatisfiable_min_spec_is_invalid_configuration() {
        let engine = engine_with(&[make_server("s1", Tier::Pro, 10.0)]);
        let mut r = rule(Tier::Pro, AssignmentStrategy::LowestUsage);
        r.min_server_spec.cpu_cores = 64;
        engine.update_rule(&r).unwrap();

        let err = engine.provision("team-a", Tier::Pro, &app("web")).unwrap_err();
        assert!(matches!(err, AssignError::InvalidRuleConfiguration { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn update_rule_rejects_invalid_rule() {
        let engine = engine_with(&[]);
        let mut r = rule(Tier::Pro, AssignmentStrategy::Dedicated);
        r.max_teams_per_server = 3;
        assert!(matches!(
            engine.update_rule(&r),
            Err(AssignError::InvalidRuleConfiguration { tier: Tier::Pro, .. })
        ));
    }

    #[test]
    fn round_robin_cursor_advances_on_commit() {
        let engine = engine_with(&[
            make_server("a", Tier::Free, 10.0),
            make_server("b", Tier::Free, 10.0),
            make_server("c", Tier::Free, 10.0),
        ]);
        engine
            .update_rule(&rule(Tier::Free, AssignmentStrategy::RoundRobin))
            .unwrap();

        let placed: Vec<String> = (0..4)
            .map(|i| {
                engine
                    .provision(&format!("team-{i}"), Tier::Free, &app("web"))
                    .unwrap()
                    .assignment()
                    .unwrap()
                    .server_id
                    .clone()
            })
            .collect();
        assert_eq!(placed, vec!["a", "b", "c", "a"]);
        assert_eq!(engine.cursors().position(Tier::Free).as_deref(), Some("a"));
    }

    #[test]
    fn strategy_change_resets_round_robin() {
        let engine = engine_with(&[
            make_server("a", Tier::Free, 10.0),
            make_server("b", Tier::Free, 10.0),
        ]);
        engine
            .update_rule(&rule(Tier::Free, AssignmentStrategy::RoundRobin))
            .unwrap();
        engine.provision("team-0", Tier::Free, &app("web")).unwrap();
        assert_eq!(engine.cursors().position(Tier::Free).as_deref(), Some("a"));

        // Same strategy, new version: rotation carries on.
        engine
            .update_rule(&rule(Tier::Free, AssignmentStrategy::RoundRobin))
            .unwrap();
        assert_eq!(engine.cursors().position(Tier::Free).as_deref(), Some("a"));

        engine
            .update_rule(&rule(Tier::Free, AssignmentStrategy::LowestUsage))
            .unwrap();
        assert_eq!(engine.cursors().position(Tier::Free), None);
    }

    #[test]
    fn preview_does_not_move_cursor_or_counts() {
        let engine = engine_with(&[
            make_server("a", Tier::Free, 10.0),
            make_server("b", Tier::Free, 90.0),
        ]);
        engine
            .update_rule(&rule(Tier::Free, AssignmentStrategy::RoundRobin))
            .unwrap();

        let preview = engine.preview(Tier::Free).unwrap();
        assert_eq!(preview.eligible, vec!["a"]);
        assert_eq!(preview.recommended.as_deref(), Some("a"));
        assert_eq!(preview.rule_version, 1);
        assert_eq!(engine.cursors().position(Tier::Free), None);
        assert_eq!(engine.store().get_server("a").unwrap().unwrap().assigned_team_count, 0);
    }

    #[test]
    fn failing_trigger_keeps_assignment_active() {
        let engine = engine_with(&[make_server("s1", Tier::Pro, 10.0)])
            .with_trigger(Arc::new(FailingTrigger));

        let outcome = engine.provision("team-a", Tier::Pro, &app("web")).unwrap();
        let a = outcome.assignment().unwrap();
        assert!(engine.store().get_assignment(&a.id).unwrap().unwrap().is_active());
    }

    #[test]
    fn offboard_releases_every_tier() {
        let engine = engine_with(&[
            make_server("p1", Tier::Pro, 10.0),
            make_server("f1", Tier::Free, 10.0),
        ]);
        engine.provision("team-a", Tier::Pro, &app("web")).unwrap();
        engine.provision("team-a", Tier::Free, &app("db")).unwrap();
        engine.provision("team-b", Tier::Free, &app("web")).unwrap();

        let released = engine.offboard_team("team-a").unwrap();
        assert_eq!(released.len(), 2);
        assert_eq!(engine.store().get_server("p1").unwrap().unwrap().assigned_team_count, 0);
        assert_eq!(engine.store().get_server("f1").unwrap().unwrap().assigned_team_count, 1);
        assert!(engine.offboard_team("team-a").unwrap().is_empty());
    }

    #[test]
    fn drain_moves_teams_then_decommission_retires() {
        let engine = engine_with(&[
            make_server("s1", Tier::Pro, 5.0),
            make_server("s2", Tier::Pro, 30.0),
        ]);
        let a = engine.provision("team-a", Tier::Pro, &app("web")).unwrap();
        assert_eq!(a.assignment().unwrap().server_id, "s1");

        assert!(matches!(
            engine.decommission("s1"),
            Err(AssignError::ServerNotDrained { teams: 1, .. })
        ));

        let report = engine.drain_server("s1").unwrap();
        assert_eq!(report.migrated.len(), 1);
        assert!(report.stranded.is_empty());
        assert_eq!(report.migrated[0].server_id, "s2");
        assert_eq!(report.migrated[0].team_id, "team-a");

        let retired = engine.decommission("s1").unwrap();
        assert_eq!(retired.status, ServerStatus::Retired);
        assert!(matches!(
            engine.set_server_status("s1", ServerStatus::Active),
            Err(AssignError::InvalidTransition(_))
        ));
    }

    #[test]
    fn drain_without_room_strands_assignments() {
        let engine = engine_with(&[make_server("solo", Tier::Enterprise, 5.0)]);
        let a = engine.provision("team-a", Tier::Enterprise, &app("db")).unwrap();

        let report = engine.drain_server("solo").unwrap();
        assert!(report.migrated.is_empty());
        assert_eq!(report.stranded.len(), 1);
        assert_eq!(report.stranded[0].id, a.assignment().unwrap().id);

        let server = engine.store().get_server("solo").unwrap().unwrap();
        assert_eq!(server.status, ServerStatus::Maintenance);
        assert_eq!(server.assigned_team_count, 1);
    }

    #[test]
    fn unknown_server_status_change_is_not_found() {
        let engine = engine_with(&[]);
        assert!(matches!(
            engine.set_server_status("ghost", ServerStatus::Standby),
            Err(AssignError::ServerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn provision_within_returns_outcome() {
        let engine = engine_with(&[make_server("s1", Tier::Pro, 10.0)]);
        let outcome = engine
            .provision_within("team-a", Tier::Pro, &app("web"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(outcome, ProvisionOutcome::Provisioned(_)));
    }

    #[tokio::test]
    async fn provision_within_times_out() {
        struct SlowTrigger;
        impl DeploymentTrigger for SlowTrigger {
            fn deploy(&self, _request: &DeployRequest) -> anyhow::Result<()> {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            }
        }

        let engine = engine_with(&[make_server("s1", Tier::Pro, 10.0)])
            .with_trigger(Arc::new(SlowTrigger));
        let err = engine
            .provision_within("team-a", Tier::Pro, &app("web"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, AssignError::RequestTimedOut(_)));
    }
}
