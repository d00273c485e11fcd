use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct ProvingGroundCli {
    /// Path to the benchmark config file
    #[clap(short, long, default_value = "proving-ground.toml")]
    pub config: PathBuf,

    /// Write the report here instead of the path in the config file
    #[clap(long)]
    pub report: Option<PathBuf>,

    /// Override the number of repetitions of every workload
    #[clap(long)]
    pub repetitions: Option<u32>,

    /// Only run the named workload. Can be given more than once, for example
    /// `--only compose-post --only read-home-timeline`.
    ///
    /// Workloads still run in the order they appear in the config file.
    #[clap(long)]
    pub only: Vec<String>,

    /// Skip the warm-up run before each workload
    #[clap(long, default_value = "false")]
    pub no_warmup: bool,

    /// Do not wait for the liveness endpoint before starting
    #[clap(long, default_value = "false")]
    pub skip_liveness: bool,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}
