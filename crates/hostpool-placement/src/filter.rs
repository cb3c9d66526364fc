//! Capacity filter: narrows a tier's pool to the servers that may take a team.
//!
//! A server is eligible when all of these hold:
//! - status is `active`
//! - its team count is below `min(max_team_count, rule.max_teams_per_server)`
//! - every spec dimension meets `rule.min_server_spec`
//! - every utilization dimension is strictly below its own threshold
//! - allocating it keeps the tier within `cost_limit_monthly` and
//!   `max_servers_allocated` (servers already hosting the tier add nothing)
//!
//! An empty result is a normal outcome, not an error.

use std::collections::BTreeSet;

use hostpool_state::{Assignment, AssignmentRule, PoolView, Server, ServerId, ServerStatus};

/// Tier-wide allocation facts the per-server checks depend on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterContext {
    /// Servers already hosting at least one active assignment of the tier.
    pub allocated: BTreeSet<ServerId>,
    /// Monthly cost of the allocated servers.
    pub committed_monthly_cost: f64,
}

impl FilterContext {
    /// Derive the context from a tier's servers and its active assignments.
    pub fn from_assignments(servers: &[Server], assignments: &[Assignment]) -> Self {
        let allocated: BTreeSet<ServerId> = assignments
            .iter()
            .filter(|a| a.is_active())
            .map(|a| a.server_id.clone())
            .collect();
        let committed_monthly_cost = servers
            .iter()
            .filter(|s| allocated.contains(&s.id))
            .map(Server::monthly_cost)
            .sum();
        Self {
            allocated,
            committed_monthly_cost,
        }
    }

    pub fn from_pool(view: &PoolView) -> Self {
        Self::from_assignments(&view.servers, &view.assignments)
    }
}

/// Why a server was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotActive,
    AtTeamCap,
    BelowMinSpec,
    OverThreshold,
    CostLimit,
    ServerLimit,
}

/// Effective team cap of a server under a rule.
pub fn team_cap(server: &Server, rule: &AssignmentRule) -> u32 {
    server.max_team_count.min(rule.max_teams_per_server)
}

/// Check one server against the rule.
pub fn check(server: &Server, rule: &AssignmentRule, ctx: &FilterContext) -> Result<(), Rejection> {
    if server.status != ServerStatus::Active {
        return Err(Rejection::NotActive);
    }
    if server.assigned_team_count >= team_cap(server, rule) {
        return Err(Rejection::AtTeamCap);
    }
    if !server.specs.satisfies(&rule.min_server_spec) {
        return Err(Rejection::BelowMinSpec);
    }
    if !rule.resource_thresholds.admits(&server.utilization) {
        return Err(Rejection::OverThreshold);
    }

    let already_allocated = ctx.allocated.contains(&server.id);
    if !already_allocated {
        if rule.server_limited() && ctx.allocated.len() as i64 >= rule.max_servers_allocated {
            return Err(Rejection::ServerLimit);
        }
        if rule.cost_limited()
            && ctx.committed_monthly_cost + server.monthly_cost() > rule.cost_limit_monthly
        {
            return Err(Rejection::CostLimit);
        }
    }
    Ok(())
}

/// Return the eligible servers, preserving input order.
pub fn filter(servers: &[Server], rule: &AssignmentRule, ctx: &FilterContext) -> Vec<Server> {
    servers
        .iter()
        .filter(|s| match check(s, rule, ctx) {
            Ok(()) => true,
            Err(reason) => {
                tracing::trace!(server = %s.id, ?reason, "server excluded");
                false
            }
        })
        .cloned()
        .collect()
}

/// False when the pool has servers in service but none meets the rule's minimum spec.
pub fn min_spec_satisfiable(servers: &[Server], rule: &AssignmentRule) -> bool {
    let mut in_service = servers
        .iter()
        .filter(|s| s.status != ServerStatus::Retired)
        .peekable();
    if in_service.peek().is_none() {
        return true;
    }
    in_service.any(|s| s.specs.satisfies(&rule.min_server_spec))
}
