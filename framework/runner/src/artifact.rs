use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::stats;

/// File inside a run directory holding the generator's standard output.
pub const SUMMARY_FILE_NAME: &str = "summary.txt";
/// File inside a run directory holding the generator's standard error.
pub const STDERR_FILE_NAME: &str = "stderr.txt";
/// Extension of the per-worker raw sample files, named `<worker index>.txt`.
pub const SAMPLE_FILE_EXTENSION: &str = "txt";

/// The raw latency output of one generator worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFile {
    pub worker: usize,
    pub path: PathBuf,
    pub contents: String,
}

impl SampleFile {
    /// Whether at least one line of the file holds a numeric sample.
    pub fn has_numeric_samples(&self) -> bool {
        stats::sample_values(&self.contents).next().is_some()
    }
}

/// Everything one load generator invocation left behind.
///
/// Built once per invocation by [RunArtifact::collect] and then handed around by reference, so the
/// run directory is only scanned a single time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifact {
    pub run_dir: PathBuf,
    /// Captured standard output, empty if the generator never produced any.
    pub summary: String,
    /// Sorted by ascending worker index.
    pub sample_files: Vec<SampleFile>,
    /// [None] if the generator could not be started or was killed by a signal.
    pub exit_code: Option<i32>,
}

impl RunArtifact {
    /// Read the summary and every per-worker sample file from `run_dir`.
    pub fn collect(run_dir: &Path, exit_code: Option<i32>) -> std::io::Result<Self> {
        let summary = match std::fs::read(run_dir.join(SUMMARY_FILE_NAME)) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };

        let mut sample_files = Vec::new();
        for entry in WalkDir::new(run_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(worker) = worker_index(entry.path()) else {
                continue;
            };
            let bytes = std::fs::read(entry.path())?;
            sample_files.push(SampleFile {
                worker,
                path: entry.path().to_path_buf(),
                contents: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        sample_files.sort_by_key(|f| f.worker);

        Ok(Self {
            run_dir: run_dir.to_path_buf(),
            summary,
            sample_files,
            exit_code,
        })
    }

    pub fn has_numeric_samples(&self) -> bool {
        self.sample_files.iter().any(SampleFile::has_numeric_samples)
    }
}

/// The worker index of a sample file named `<index>.txt`, [None] for any other file.
fn worker_index(path: &Path) -> Option<usize> {
    if path.extension()? != SAMPLE_FILE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
