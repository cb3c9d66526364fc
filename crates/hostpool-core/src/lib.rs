pub mod config;

pub use config::{
    DaemonConfig, EngineConfig, HostpoolConfig, RuleSeed, ServerSeed, SpecSeed, ThresholdSeed,
};
