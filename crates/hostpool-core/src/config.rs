//! hostpool.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostpoolConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<ServerSeed>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: 8443,
            data_dir: PathBuf::from("/var/lib/hostpool"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Commit attempts per provisioning request before the race is surfaced.
    pub max_commit_retries: u32,
    /// Upper bound for a single provisioning request, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 3,
            request_timeout_ms: 5_000,
        }
    }
}

/// A server registered at startup if it is not already in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSeed {
    pub id: String,
    pub tier: String,
    pub provider: String,
    pub region: String,
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub storage_gb: u32,
    pub max_team_count: u32,
    pub hourly_cost: f64,
    pub status: Option<String>,
}

/// An assignment rule written at startup when the tier has none yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSeed {
    pub tier: String,
    pub enabled: Option<bool>,
    pub max_servers_allocated: Option<i64>,
    pub max_teams_per_server: Option<u32>,
    pub strategy: Option<String>,
    pub region_preference: Option<String>,
    pub cost_limit_monthly: Option<f64>,
    pub thresholds: Option<ThresholdSeed>,
    pub min_server_spec: Option<SpecSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSeed {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub storage_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecSeed {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub storage_gb: u32,
}

impl HostpoolConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HostpoolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a hostpool.toml with one lowest-usage rule per tier.
    pub fn scaffold(data_dir: &Path) -> Self {
        let rule = |tier: &str, teams: u32, cpu: f64| RuleSeed {
            tier: tier.to_string(),
            enabled: Some(true),
            max_servers_allocated: Some(-1),
            max_teams_per_server: Some(teams),
            strategy: Some("lowest_usage".to_string()),
            region_preference: None,
            cost_limit_monthly: Some(-1.0),
            thresholds: Some(ThresholdSeed {
                cpu_pct: cpu,
                mem_pct: 85.0,
                storage_pct: 90.0,
            }),
            min_server_spec: None,
        };

        HostpoolConfig {
            daemon: DaemonConfig {
                port: 8443,
                data_dir: data_dir.to_path_buf(),
            },
            engine: EngineConfig::default(),
            servers: Vec::new(),
            rules: vec![
                rule("free", 20, 70.0),
                rule("pro", 8, 80.0),
                rule("enterprise", 1, 85.0),
            ],
        }
    }
}
