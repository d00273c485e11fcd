use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context};

use crate::artifact::{STDERR_FILE_NAME, SUMMARY_FILE_NAME};
use crate::types::ProvingGroundResult;
use crate::workload::LoadRequest;

/// Environment variable to override the path to the load generator binary.
pub const PG_LOAD_GENERATOR_PATH_ENV: &str = "PG_LOAD_GENERATOR_PATH";

/// Default load generator binary name, looked up in the user's `PATH`.
pub const DEFAULT_LOAD_GENERATOR: &str = "wrk";

/// Flag that makes the generator write one raw latency file per worker thread.
pub const DEFAULT_PER_WORKER_FLAG: &str = "-P";

/// Something that can drive load at a target once.
///
/// Implementations must run with `run_dir` as the working directory, write the generator's
/// standard output to [SUMMARY_FILE_NAME] inside `run_dir` and leave one `<worker>.txt` raw sample
/// file per worker thread next to it.
///
/// The returned value is the process exit code, [None] if the process was terminated by a signal.
/// An `Err` means the generator could not be started at all. Neither case is fatal to the caller,
/// both end up classified as an unhealthy run.
pub trait LoadGenerator {
    fn generate(&self, request: &LoadRequest, run_dir: &Path) -> std::io::Result<Option<i32>>;
}

impl<G: LoadGenerator + ?Sized> LoadGenerator for &G {
    fn generate(&self, request: &LoadRequest, run_dir: &Path) -> std::io::Result<Option<i32>> {
        (**self).generate(request, run_dir)
    }
}

/// A `wrk2` compatible load generator, invoked as a child process.
#[derive(Debug, Clone)]
pub struct Wrk2 {
    bin_path: PathBuf,
    per_worker_flag: Option<String>,
    extra_args: Vec<String>,
}

impl Wrk2 {
    pub fn new(bin_path: impl Into<PathBuf>) -> Self {
        Self {
            bin_path: bin_path.into(),
            per_worker_flag: Some(DEFAULT_PER_WORKER_FLAG.to_string()),
            extra_args: Vec::new(),
        }
    }

    /// Set the flag that enables per-worker sample files, or [None] if the generator always
    /// writes them.
    pub fn with_per_worker_flag(mut self, flag: Option<String>) -> Self {
        self.per_worker_flag = flag;
        self
    }

    /// Extra arguments placed before the target URL.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn bin_path(&self) -> &Path {
        &self.bin_path
    }

    /// Build the command without output redirection.
    ///
    /// The command runs inside `run_dir`, so a relative script is made absolute against the
    /// current working directory first.
    pub fn command(&self, request: &LoadRequest, run_dir: &Path) -> Command {
        let script = std::path::absolute(&request.script).unwrap_or_else(|_| request.script.clone());

        let mut cmd = Command::new(&self.bin_path);
        cmd.current_dir(run_dir)
            .arg("-D")
            .arg("exp")
            .arg("-t")
            .arg(request.threads.to_string())
            .arg("-c")
            .arg(request.connections.to_string())
            .arg("-d")
            .arg(request.duration_arg())
            .arg("-L")
            .arg("-s")
            .arg(script);
        if let Some(flag) = &self.per_worker_flag {
            cmd.arg(flag);
        }
        cmd.args(&self.extra_args)
            .arg(&request.url)
            .arg("-R")
            .arg(request.rate.to_string());

        cmd
    }
}

impl LoadGenerator for Wrk2 {
    fn generate(&self, request: &LoadRequest, run_dir: &Path) -> std::io::Result<Option<i32>> {
        let stdout = File::create(run_dir.join(SUMMARY_FILE_NAME))?;
        let stderr = File::create(run_dir.join(STDERR_FILE_NAME))?;

        let mut child = self
            .command(request, run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()?;

        log::debug!(
            "[run] Load generator running with PID {pid} in {dir}",
            pid = child.id(),
            dir = run_dir.display()
        );
        let status = child.wait()?;
        log::debug!("[run] Load generator finished with status: {status}");

        Ok(status.code())
    }
}

/// Get the path to the load generator binary.
///
/// The [PG_LOAD_GENERATOR_PATH_ENV] environment variable takes precedence over `configured`.
pub fn load_generator_path(configured: &str) -> ProvingGroundResult<PathBuf> {
    let from_env = env::var(PG_LOAD_GENERATOR_PATH_ENV).ok();
    resolve_binary(
        from_env.as_deref().unwrap_or(configured),
        PG_LOAD_GENERATOR_PATH_ENV,
    )
}

/// Resolve `value` to an executable path.
///
/// A bare name such as `wrk` is looked up in the user's `PATH`. Anything containing a path
/// separator must point at an existing file. `override_env` is only used in error messages to
/// tell the user how to fix the problem.
pub fn resolve_binary(value: &str, override_env: &str) -> ProvingGroundResult<PathBuf> {
    if value.is_empty() {
        bail!("Load generator path is empty, set '{override_env}' or the config value");
    }

    let path = PathBuf::from(value);
    if path.components().count() == 1 && !path.is_absolute() {
        log::debug!("[prereq] '{value}' is not a path so looking in user's 'PATH'");
        return which::which(value).with_context(|| {
            format!(
                "'{value}' not found in PATH. Please install it or set '{override_env}' to the correct path."
            )
        });
    }

    if !path.exists() {
        bail!(
            "Path to binary set to '{path}' but that path doesn't exist",
            path = path.display()
        );
    }
    // Runs start inside their own directory so a relative path would no longer resolve.
    std::path::absolute(&path)
        .with_context(|| format!("Cannot make '{}' absolute", path.display()))
}
