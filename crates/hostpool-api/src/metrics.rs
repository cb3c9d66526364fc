//! Prometheus text exposition format.
//!
//! Renders per-tier pool statistics for scraping by a Prometheus server or
//! compatible agent. Every series carries a `tier` label.

use std::fmt::Write;

use hostpool_assign::PoolStats;

type Gauge = (&'static str, &'static str, fn(&PoolStats) -> f64);

const GAUGES: &[Gauge] = &[
    ("hostpool_servers", "Servers in the pool, excluding retired.", |s| s.servers as f64),
    ("hostpool_active_servers", "Servers in active status.", |s| s.active_servers as f64),
    ("hostpool_eligible_servers", "Servers passing the capacity filter.", |s| s.eligible_servers as f64),
    ("hostpool_assigned_teams", "Teams assigned to the pool.", |s| s.assigned_teams as f64),
    ("hostpool_team_capacity", "Team slots on active servers under the current rule.", |s| s.team_capacity as f64),
    ("hostpool_cpu_utilization_pct", "Average CPU utilization.", |s| s.avg_cpu_pct),
    ("hostpool_memory_utilization_pct", "Average memory utilization.", |s| s.avg_mem_pct),
    ("hostpool_storage_utilization_pct", "Average storage utilization.", |s| s.avg_storage_pct),
    ("hostpool_committed_monthly_cost", "Monthly cost of servers hosting the tier.", |s| s.committed_monthly_cost),
    ("hostpool_rule_version", "Version of the active assignment rule.", |s| s.rule_version as f64),
];

/// Render pool statistics into Prometheus text format.
pub fn render_prometheus(stats: &[PoolStats]) -> String {
    let mut out = String::new();
    for (name, help, value) in GAUGES {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} gauge");
        for s in stats {
            let _ = writeln!(out, "{name}{{tier=\"{}\"}} {}", s.tier, format_value(value(s)));
        }
    }
    out
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v:.2}")
    }
}
