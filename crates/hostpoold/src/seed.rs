//! Startup seeding from `hostpool.toml`.
//!
//! Seeds only fill gaps: a server already in the store is left alone, and a
//! rule seed is written only when its tier has no rule yet. Restarting the
//! daemon with the same config is therefore a no-op.

use anyhow::{Context, anyhow};
use tracing::{debug, info};

use hostpool_assign::AssignmentEngine;
use hostpool_core::{HostpoolConfig, RuleSeed, ServerSeed};
use hostpool_state::*;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub servers_added: usize,
    pub rules_added: usize,
}

pub fn apply(engine: &AssignmentEngine, config: &HostpoolConfig) -> anyhow::Result<SeedReport> {
    let store = engine.store();
    let mut report = SeedReport::default();

    for seed in &config.servers {
        let server = server_from_seed(seed)?;
        match store.insert_server(&server) {
            Ok(()) => report.servers_added += 1,
            Err(StateError::AlreadyExists(_)) => {
                debug!(server = %seed.id, "server already registered, seed skipped");
            }
            Err(e) => return Err(e).with_context(|| format!("seeding server {}", seed.id)),
        }
    }

    for seed in &config.rules {
        let rule = rule_from_seed(seed)?;
        if store.get_active_rule(rule.tier)?.is_some() {
            debug!(tier = %rule.tier, "tier already has a rule, seed skipped");
            continue;
        }
        engine
            .update_rule(&rule)
            .with_context(|| format!("seeding rule for tier {}", rule.tier))?;
        report.rules_added += 1;
    }

    info!(
        servers = report.servers_added,
        rules = report.rules_added,
        "config seeds applied"
    );
    Ok(report)
}

fn server_from_seed(seed: &ServerSeed) -> anyhow::Result<Server> {
    let tier: Tier = seed.tier.parse().map_err(|e| anyhow!("server {}: {e}", seed.id))?;
    let status = match &seed.status {
        Some(s) => s.parse::<ServerStatus>().map_err(|e| anyhow!("server {}: {e}", seed.id))?,
        None => ServerStatus::Active,
    };
    let now = epoch_secs();
    Ok(Server {
        id: seed.id.clone(),
        tier,
        provider: seed.provider.clone(),
        region: seed.region.clone(),
        specs: ServerSpecs {
            cpu_cores: seed.cpu_cores,
            memory_gb: seed.memory_gb,
            storage_gb: seed.storage_gb,
        },
        status,
        utilization: Utilization::default(),
        sampled_at: 0,
        assigned_team_count: 0,
        max_team_count: seed.max_team_count,
        hourly_cost: seed.hourly_cost,
        revision: 0,
        created_at: now,
        updated_at: now,
    })
}

fn rule_from_seed(seed: &RuleSeed) -> anyhow::Result<AssignmentRule> {
    let tier: Tier = seed.tier.parse().map_err(|e| anyhow!("rule seed: {e}"))?;
    let mut rule = AssignmentRule::default_for(tier);

    if let Some(enabled) = seed.enabled {
        rule.enabled = enabled;
    }
    if let Some(max) = seed.max_servers_allocated {
        rule.max_servers_allocated = max;
    }
    if let Some(max) = seed.max_teams_per_server {
        rule.max_teams_per_server = max;
    }
    if let Some(strategy) = &seed.strategy {
        rule.assignment_strategy = strategy
            .parse()
            .map_err(|e| anyhow!("rule for tier {tier}: {e}"))?;
    }
    if let Some(limit) = seed.cost_limit_monthly {
        rule.cost_limit_monthly = limit;
    }
    if let Some(t) = &seed.thresholds {
        rule.resource_thresholds = ResourceThresholds {
            cpu_pct: t.cpu_pct,
            mem_pct: t.mem_pct,
            storage_pct: t.storage_pct,
        };
    }
    if let Some(spec) = &seed.min_server_spec {
        rule.min_server_spec = ServerSpecs {
            cpu_cores: spec.cpu_cores,
            memory_gb: spec.memory_gb,
            storage_gb: spec.storage_gb,
        };
    }
    rule.region_preference = seed.region_preference.clone();
    Ok(rule)
}
