//! Assignment strategies: pick one server from the eligible set.
//!
//! Every policy is a pure function of the eligible set, the rule, and (for
//! round-robin) the tier's cursor position:
//!
//! - **LowestUsage**: minimize the peak utilization dimension, then the team
//!   count, then the server id.
//! - **RoundRobin**: first eligible id after the cursor, wrapping around.
//! - **RegionBased**: lowest usage within the preferred region, falling back
//!   to lowest usage over everything eligible.
//! - **Dedicated**: cheapest empty server.

use std::cmp::Ordering;

use tracing::{debug, info};

use hostpool_state::{AssignmentRule, AssignmentStrategy, Server};

/// The chosen server and how it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub server: Server,
    /// The policy that actually ranked the candidates.
    pub policy: AssignmentStrategy,
    /// True when region-based selection found nothing in the preferred region.
    pub region_fallback: bool,
}

/// Select a server from `eligible` according to the rule's strategy.
///
/// `cursor` is the id of the last server the tier's round-robin rotation
/// assigned; other strategies ignore it.
pub fn select(eligible: &[Server], rule: &AssignmentRule, cursor: Option<&str>) -> Option<Selection> {
    let strategy = rule.assignment_strategy;
    let chosen = match strategy {
        AssignmentStrategy::LowestUsage => lowest_usage(eligible.iter()),
        AssignmentStrategy::RoundRobin => round_robin(eligible, cursor),
        AssignmentStrategy::Dedicated => dedicated(eligible),
        AssignmentStrategy::RegionBased => {
            let region = rule.region_preference.as_deref().unwrap_or_default();
            let in_region = lowest_usage(eligible.iter().filter(|s| s.region == region));
            if let Some(server) = in_region {
                Some(server)
            } else {
                let fallback = lowest_usage(eligible.iter())?;
                info!(
                    tier = %rule.tier,
                    region,
                    server = %fallback.id,
                    "no eligible server in preferred region, falling back to lowest usage"
                );
                return Some(Selection {
                    server: fallback.clone(),
                    policy: AssignmentStrategy::LowestUsage,
                    region_fallback: true,
                });
            }
        }
    }?;

    debug!(tier = %rule.tier, server = %chosen.id, ?strategy, "server selected");
    Some(Selection {
        server: chosen.clone(),
        policy: strategy,
        region_fallback: false,
    })
}

/// Order by peak usage, then team count, then id.
fn usage_order(a: &Server, b: &Server) -> Ordering {
    a.utilization
        .peak()
        .total_cmp(&b.utilization.peak())
        .then(a.assigned_team_count.cmp(&b.assigned_team_count))
        .then_with(|| a.id.cmp(&b.id))
}

fn lowest_usage<'a>(candidates: impl Iterator<Item = &'a Server>) -> Option<&'a Server> {
    candidates.min_by(|a, b| usage_order(a, b))
}

fn round_robin<'a>(eligible: &'a [Server], cursor: Option<&str>) -> Option<&'a Server> {
    let mut sorted: Vec<&Server> = eligible.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let after_cursor = cursor.and_then(|last| sorted.iter().find(|s| s.id.as_str() > last));
    after_cursor.or_else(|| sorted.first()).copied()
}

fn dedicated(eligible: &[Server]) -> Option<&Server> {
    eligible
        .iter()
        .filter(|s| s.assigned_team_count == 0)
        .min_by(|a, b| {
            a.hourly_cost
                .total_cmp(&b.hourly_cost)
                .then_with(|| a.id.cmp(&b.id))
        })
}
