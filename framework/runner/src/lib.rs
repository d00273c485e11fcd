mod artifact;
mod generator;
mod health;
mod liveness;
mod progress;
mod retry;
mod series;
mod stats;
mod types;
mod workload;

pub mod prelude {
    pub use crate::artifact::{RunArtifact, SampleFile, STDERR_FILE_NAME, SUMMARY_FILE_NAME};
    pub use crate::generator::{
        load_generator_path, resolve_binary, LoadGenerator, Wrk2, DEFAULT_LOAD_GENERATOR,
        DEFAULT_PER_WORKER_FLAG, PG_LOAD_GENERATOR_PATH_ENV,
    };
    pub use crate::health::{HealthClassifier, HealthDiagnostics, HealthStatus, HealthVerdict};
    pub use crate::liveness::{LivenessError, LivenessProbe};
    pub use crate::retry::{RetryController, RetryOutcome, RetryPolicy};
    pub use crate::series::{run_series, SeriesOptions, WarmupPolicy, Workload};
    pub use crate::stats::{
        median, non_2xx_responses, percentile, requests_per_sec, sample_values, Percentile,
        StatsExtractor, SUMMARY_CONTRACT,
    };
    pub use crate::types::ProvingGroundResult;
    pub use crate::workload::{LoadRequest, WorkloadRunner};
}
