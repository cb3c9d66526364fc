//! Domain types for the hostpool state store.
//!
//! These types represent the persisted state of the server pools, the
//! per-tier assignment rules, and the team-to-server assignments. All types
//! are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a server.
pub type ServerId = String;

/// Unique identifier for a team.
pub type TeamId = String;

/// Unique identifier for an assignment.
pub type AssignmentId = String;

/// Hours in the billing month used for cost projections.
pub const HOURS_PER_MONTH: f64 = 24.0 * 30.0;

/// Sentinel for "no limit" on rule limits.
pub const UNLIMITED: i64 = -1;

// ── Tier ──────────────────────────────────────────────────────────

/// Subscription plan level. Each tier has its own server pool and rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Pro, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

// ── Server ────────────────────────────────────────────────────────

/// Operational status of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Active,
    Standby,
    Maintenance,
    Error,
    /// Decommissioned; never eligible again.
    Retired,
}

impl FromStr for ServerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(ServerStatus::Active),
            "standby" => Ok(ServerStatus::Standby),
            "maintenance" => Ok(ServerStatus::Maintenance),
            "error" => Ok(ServerStatus::Error),
            "retired" => Ok(ServerStatus::Retired),
            other => Err(format!("unknown server status: {other}")),
        }
    }
}

/// Static hardware specs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpecs {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub storage_gb: u32,
}

impl ServerSpecs {
    /// True if every dimension is at least `min`'s.
    pub fn satisfies(&self, min: &ServerSpecs) -> bool {
        self.cpu_cores >= min.cpu_cores
            && self.memory_gb >= min.memory_gb
            && self.storage_gb >= min.storage_gb
    }
}

/// Live utilization percentages (0–100), sampled externally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub storage_pct: f64,
}

impl Utilization {
    /// The most loaded dimension.
    pub fn peak(&self) -> f64 {
        self.cpu_pct.max(self.mem_pct).max(self.storage_pct)
    }

    pub fn is_valid(&self) -> bool {
        [self.cpu_pct, self.mem_pct, self.storage_pct]
            .iter()
            .all(|v| (0.0..=100.0).contains(v))
    }
}

/// A host in a tier's server pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    pub id: ServerId,
    pub tier: Tier,
    pub provider: String,
    pub region: String,
    pub specs: ServerSpecs,
    pub status: ServerStatus,
    pub utilization: Utilization,
    /// Timestamp of the utilization sample currently held (0 = never sampled).
    pub sampled_at: u64,
    pub assigned_team_count: u32,
    pub max_team_count: u32,
    pub hourly_cost: f64,
    /// Bumped on every mutation of this record.
    pub revision: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Server {
    /// Projected monthly cost of keeping this server allocated.
    pub fn monthly_cost(&self) -> f64 {
        self.hourly_cost * HOURS_PER_MONTH
    }
}

/// A utilization sample pushed by the monitoring feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub storage_pct: f64,
    pub timestamp: u64,
}

impl UtilizationSample {
    pub fn utilization(&self) -> Utilization {
        Utilization {
            cpu_pct: self.cpu_pct,
            mem_pct: self.mem_pct,
            storage_pct: self.storage_pct,
        }
    }
}

// ── Assignment rule ───────────────────────────────────────────────

/// How the engine ranks eligible servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    LowestUsage,
    RoundRobin,
    RegionBased,
    Dedicated,
}

impl FromStr for AssignmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "lowest_usage" => Ok(AssignmentStrategy::LowestUsage),
            "round_robin" => Ok(AssignmentStrategy::RoundRobin),
            "region_based" => Ok(AssignmentStrategy::RegionBased),
            "dedicated" => Ok(AssignmentStrategy::Dedicated),
            other => Err(format!("unknown assignment strategy: {other}")),
        }
    }
}

/// Per-dimension utilization ceilings. A server at or above any ceiling is excluded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceThresholds {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub storage_pct: f64,
}

impl ResourceThresholds {
    /// True if every dimension of `usage` is strictly below its ceiling.
    pub fn admits(&self, usage: &Utilization) -> bool {
        usage.cpu_pct < self.cpu_pct
            && usage.mem_pct < self.mem_pct
            && usage.storage_pct < self.storage_pct
    }
}

/// Assignment policy for one tier. The highest `version` is the active rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentRule {
    pub tier: Tier,
    pub enabled: bool,
    /// Distinct servers the tier may occupy (-1 = unlimited).
    pub max_servers_allocated: i64,
    pub max_teams_per_server: u32,
    pub resource_thresholds: ResourceThresholds,
    pub assignment_strategy: AssignmentStrategy,
    pub region_preference: Option<String>,
    pub min_server_spec: ServerSpecs,
    /// Monthly spend ceiling for the tier (-1 = unlimited).
    pub cost_limit_monthly: f64,
    /// Assigned by the store on write.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl AssignmentRule {
    /// Permissive lowest-usage rule used when a tier has never been configured.
    pub fn default_for(tier: Tier) -> Self {
        Self {
            tier,
            enabled: true,
            max_servers_allocated: UNLIMITED,
            max_teams_per_server: u32::MAX,
            resource_thresholds: ResourceThresholds {
                cpu_pct: 80.0,
                mem_pct: 85.0,
                storage_pct: 90.0,
            },
            assignment_strategy: AssignmentStrategy::LowestUsage,
            region_preference: None,
            min_server_spec: ServerSpecs::default(),
            cost_limit_monthly: UNLIMITED as f64,
            version: 0,
            updated_at: 0,
        }
    }

    /// Check the rule's internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        let t = &self.resource_thresholds;
        for (name, v) in [("cpu", t.cpu_pct), ("memory", t.mem_pct), ("storage", t.storage_pct)] {
            if !(0.0..=100.0).contains(&v) {
                return Err(format!("{name} threshold {v} outside [0, 100]"));
            }
        }
        if self.max_teams_per_server == 0 {
            return Err("max_teams_per_server must be at least 1".to_string());
        }
        if self.max_servers_allocated < UNLIMITED || self.max_servers_allocated == 0 {
            return Err(format!(
                "max_servers_allocated {} must be -1 or positive",
                self.max_servers_allocated
            ));
        }
        if self.cost_limit_monthly < 0.0 && self.cost_limit_monthly != UNLIMITED as f64 {
            return Err(format!(
                "cost_limit_monthly {} must be -1 or non-negative",
                self.cost_limit_monthly
            ));
        }
        if self.assignment_strategy == AssignmentStrategy::Dedicated
            && self.max_teams_per_server != 1
        {
            return Err("dedicated strategy requires max_teams_per_server = 1".to_string());
        }
        if self.assignment_strategy == AssignmentStrategy::RegionBased
            && self.region_preference.as_deref().is_none_or(str::is_empty)
        {
            return Err("region_based strategy requires a region_preference".to_string());
        }
        Ok(())
    }

    pub fn cost_limited(&self) -> bool {
        self.cost_limit_monthly != UNLIMITED as f64
    }

    pub fn server_limited(&self) -> bool {
        self.max_servers_allocated != UNLIMITED
    }

    /// Build the key for the rules table.
    pub fn table_key(&self) -> String {
        rule_key(self.tier, self.version)
    }
}

/// Key for a rule version in the rules table.
pub fn rule_key(tier: Tier, version: u64) -> String {
    format!("{}:{:010}", tier.as_str(), version)
}

// ── Assignment ────────────────────────────────────────────────────

/// What the team is deploying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    App,
    Database,
}

/// Resource description handed to the deployment trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub name: String,
}

/// Persisted lifecycle of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Released,
}

/// Durable record binding a team to a server within one tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: AssignmentId,
    pub team_id: TeamId,
    pub tier: Tier,
    pub server_id: ServerId,
    pub resource: ResourceSpec,
    /// Version of the rule the assignment was committed under.
    pub rule_version: u64,
    pub status: AssignmentStatus,
    pub created_at: u64,
    pub released_at: Option<u64>,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}
