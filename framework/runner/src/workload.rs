use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::artifact::RunArtifact;
use crate::generator::LoadGenerator;
use crate::types::ProvingGroundResult;

/// Length of the random suffix that keeps run directory names unique.
const RUN_DIR_ID_LEN: usize = 8;

/// Parameters for a single load generator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub url: String,
    pub script: PathBuf,
    pub threads: u32,
    pub connections: u32,
    pub duration: Duration,
    /// Target requests per second
    pub rate: u32,
}

impl LoadRequest {
    /// The duration as passed to the generator, whole seconds with an `s` suffix.
    pub fn duration_arg(&self) -> String {
        format!("{}s", self.duration.as_secs())
    }
}

/// Runs the load generator once per call, each time in a brand new directory.
///
/// Directories are laid out as `<run root>/<workload label>/<name>-<random id>`. A directory is
/// never reused, so sample files from an earlier attempt cannot leak into a later one.
#[derive(Debug)]
pub struct WorkloadRunner<G> {
    generator: G,
    run_root: PathBuf,
}

impl<G: LoadGenerator> WorkloadRunner<G> {
    pub fn new(generator: G, run_root: impl Into<PathBuf>) -> Self {
        Self {
            generator,
            run_root: run_root.into(),
        }
    }

    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    /// Invoke the generator once for the workload `label`.
    ///
    /// Generator failures, including failing to start, are recorded in the returned
    /// [RunArtifact] rather than returned as errors. Only problems with the run directory itself
    /// are errors.
    pub fn run(
        &self,
        request: &LoadRequest,
        label: &str,
        name: &str,
    ) -> ProvingGroundResult<RunArtifact> {
        let run_dir = self.create_run_dir(label, name)?;

        log::info!(
            "[run] {label}: {threads} threads, {conns} connections, {duration} at {rate} req/s in {dir}",
            threads = request.threads,
            conns = request.connections,
            duration = request.duration_arg(),
            rate = request.rate,
            dir = run_dir.display(),
        );

        let exit_code = match self.generator.generate(request, &run_dir) {
            Ok(exit_code) => exit_code,
            Err(e) => {
                log::warn!("[run] {label}: load generator could not be started: {e}");
                None
            }
        };
        if exit_code != Some(0) {
            log::warn!("[run] {label}: load generator exited with code {exit_code:?}");
        }

        RunArtifact::collect(&run_dir, exit_code).with_context(|| {
            format!(
                "Failed to read the output of run directory '{}'",
                run_dir.display()
            )
        })
    }

    fn create_run_dir(&self, label: &str, name: &str) -> ProvingGroundResult<PathBuf> {
        let workload_root = self.run_root.join(label);
        std::fs::create_dir_all(&workload_root).with_context(|| {
            format!(
                "Failed to create workload run root '{}'",
                workload_root.display()
            )
        })?;

        let run_dir = workload_root.join(format!(
            "{name}-{id}",
            id = nanoid::nanoid!(RUN_DIR_ID_LEN, &nanoid::alphabet::SAFE)
        ));
        // create_dir rather than create_dir_all so an existing directory is an error
        std::fs::create_dir(&run_dir).with_context(|| {
            format!("Failed to create run directory '{}'", run_dir.display())
        })?;

        Ok(run_dir)
    }
}
