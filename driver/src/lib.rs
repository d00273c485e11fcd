mod bench;
mod cli;
mod config;

pub use bench::{execute, run_workloads};
pub use cli::ProvingGroundCli;
pub use config::{
    BenchConfig, ConfigError, LivenessConfig, LoadGeneratorConfig, OrchestratorConfig,
    RetryConfig, WarmupConfig, WorkloadConfig, WorkloadDefaults,
};
