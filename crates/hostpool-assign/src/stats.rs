//! Per-tier pool statistics.

use serde::{Deserialize, Serialize};

use hostpool_placement::{FilterContext, filter, team_cap};
use hostpool_state::*;

/// Point-in-time summary of one tier's pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub tier: Tier,
    /// Servers not yet retired.
    pub servers: usize,
    pub active_servers: usize,
    /// Servers that would pass the capacity filter right now.
    pub eligible_servers: usize,
    pub assigned_teams: u64,
    /// Team slots on active servers under the current rule.
    pub team_capacity: u64,
    pub avg_cpu_pct: f64,
    pub avg_mem_pct: f64,
    pub avg_storage_pct: f64,
    pub committed_monthly_cost: f64,
    /// 0 when the tier runs on the default rule.
    pub rule_version: u64,
}

impl PoolStats {
    pub fn collect(view: &PoolView) -> Self {
        let rule = view
            .rule
            .clone()
            .unwrap_or_else(|| AssignmentRule::default_for(view.tier));
        let ctx = FilterContext::from_pool(view);

        let in_service: Vec<&Server> = view
            .servers
            .iter()
            .filter(|s| s.status != ServerStatus::Retired)
            .collect();
        let active: Vec<&Server> = in_service
            .iter()
            .copied()
            .filter(|s| s.status == ServerStatus::Active)
            .collect();

        let avg = |dim: fn(&Server) -> f64| {
            if in_service.is_empty() {
                0.0
            } else {
                in_service.iter().map(|s| dim(s)).sum::<f64>() / in_service.len() as f64
            }
        };

        Self {
            tier: view.tier,
            servers: in_service.len(),
            active_servers: active.len(),
            eligible_servers: filter(&view.servers, &rule, &ctx).len(),
            assigned_teams: in_service
                .iter()
                .map(|s| u64::from(s.assigned_team_count))
                .sum(),
            team_capacity: active.iter().map(|s| u64::from(team_cap(s, &rule))).sum(),
            avg_cpu_pct: avg(|s| s.utilization.cpu_pct),
            avg_mem_pct: avg(|s| s.utilization.mem_pct),
            avg_storage_pct: avg(|s| s.utilization.storage_pct),
            committed_monthly_cost: ctx.committed_monthly_cost,
            rule_version: view.rule.as_ref().map_or(0, |r| r.version),
        }
    }
}
