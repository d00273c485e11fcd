use std::fmt;

use crate::artifact::RunArtifact;
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum HealthStatus {
    #[display("healthy")]
    Healthy,
    #[display("unhealthy")]
    Unhealthy,
}

/// What the classifier observed about a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthDiagnostics {
    pub non_2xx_responses: u64,
    pub sample_files: usize,
    pub has_numeric_samples: bool,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthVerdict {
    pub status: HealthStatus,
    pub diagnostics: HealthDiagnostics,
    expected_sample_files: usize,
}

impl HealthVerdict {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Human readable list of the checks that failed.
    pub fn failures(&self) -> Vec<String> {
        let d = &self.diagnostics;
        let mut failures = Vec::new();
        if d.non_2xx_responses > 0 {
            failures.push(format!("{} non-2xx/3xx responses", d.non_2xx_responses));
        }
        if d.sample_files < self.expected_sample_files {
            failures.push(format!(
                "{} of {} worker sample files",
                d.sample_files, self.expected_sample_files
            ));
        }
        if !d.has_numeric_samples {
            failures.push("no numeric samples".to_string());
        }
        if d.exit_code != Some(0) {
            match d.exit_code {
                Some(code) => failures.push(format!("exit code {code}")),
                None => failures.push("generator did not exit normally".to_string()),
            }
        }
        failures
    }
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_healthy() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{} ({})", self.status, self.failures().join(", "))
        }
    }
}

/// Decides whether a run can be trusted.
///
/// A run is healthy when the summary reports no non-2xx/3xx responses, there is a sample file
/// for every worker thread, at least one sample file holds numeric data and the generator exited
/// cleanly. The file checks catch the generator silently producing empty or truncated output
/// under resource exhaustion.
#[derive(Debug, Clone, Copy)]
pub struct HealthClassifier {
    threads: u32,
}

impl HealthClassifier {
    pub fn new(threads: u32) -> Self {
        Self { threads }
    }

    pub fn classify(&self, artifact: &RunArtifact) -> HealthVerdict {
        let diagnostics = HealthDiagnostics {
            non_2xx_responses: stats::non_2xx_responses(&artifact.summary),
            sample_files: artifact.sample_files.len(),
            has_numeric_samples: artifact.has_numeric_samples(),
            exit_code: artifact.exit_code,
        };
        let expected_sample_files = self.threads as usize;

        let healthy = diagnostics.non_2xx_responses == 0
            && diagnostics.sample_files >= expected_sample_files
            && diagnostics.has_numeric_samples
            && diagnostics.exit_code == Some(0);

        HealthVerdict {
            status: if healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            diagnostics,
            expected_sample_files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::SampleFile;
    use std::path::PathBuf;

    fn artifact(summary: &str, files: &[&str], exit_code: Option<i32>) -> RunArtifact {
        RunArtifact {
            run_dir: PathBuf::from("/runs/x"),
            summary: summary.to_string(),
            sample_files: files
                .iter()
                .enumerate()
                .map(|(worker, contents)| SampleFile {
                    worker,
                    path: PathBuf::from(format!("/runs/x/{worker}.txt")),
                    contents: contents.to_string(),
                })
                .collect(),
            exit_code,
        }
    }

    #[test]
    fn healthy_without_non_2xx_line() {
        let verdict = HealthClassifier::new(2).classify(&artifact(
            "Requests/sec: 10\n",
            &["1\n", "2\n"],
            Some(0),
        ));

        assert!(verdict.is_healthy());
        assert_eq!(verdict.diagnostics.non_2xx_responses, 0);
        assert!(verdict.failures().is_empty());
        assert_eq!(verdict.to_string(), "healthy");
    }

    #[test]
    fn non_2xx_responses_are_unhealthy() {
        let verdict = HealthClassifier::new(1).classify(&artifact(
            "Non-2xx or 3xx responses: 3\n",
            &["1\n"],
            Some(0),
        ));

        assert!(!verdict.is_healthy());
        assert_eq!(verdict.diagnostics.non_2xx_responses, 3);
        assert_eq!(verdict.to_string(), "unhealthy (3 non-2xx/3xx responses)");
    }

    #[test]
    fn zero_non_2xx_line_is_healthy() {
        let verdict = HealthClassifier::new(1).classify(&artifact(
            "Non-2xx or 3xx responses: 0\n",
            &["1\n"],
            Some(0),
        ));
        assert!(verdict.is_healthy());
    }

    #[test]
    fn fewer_sample_files_than_threads_is_unhealthy() {
        let verdict = HealthClassifier::new(4).classify(&artifact("", &["1\n", "2\n"], Some(0)));

        assert!(!verdict.is_healthy());
        assert_eq!(verdict.failures(), vec!["2 of 4 worker sample files"]);
    }

    #[test]
    fn more_sample_files_than_threads_is_fine() {
        let verdict =
            HealthClassifier::new(1).classify(&artifact("", &["1\n", "2\n"], Some(0)));
        assert!(verdict.is_healthy());
    }

    #[test]
    fn zero_sample_files_is_unhealthy() {
        let verdict = HealthClassifier::new(2).classify(&artifact("", &[], Some(0)));

        assert!(!verdict.is_healthy());
        assert_eq!(verdict.diagnostics.sample_files, 0);
        assert!(!verdict.diagnostics.has_numeric_samples);
    }

    #[test]
    fn empty_sample_files_are_unhealthy() {
        let verdict = HealthClassifier::new(2).classify(&artifact("", &["", "n/a\n"], Some(0)));

        assert!(!verdict.is_healthy());
        assert_eq!(verdict.failures(), vec!["no numeric samples"]);
    }

    #[test]
    fn one_numeric_file_is_enough() {
        let verdict = HealthClassifier::new(2).classify(&artifact("", &["", "12\n"], Some(0)));
        assert!(verdict.is_healthy());
    }

    #[test]
    fn failed_exit_is_unhealthy() {
        let classifier = HealthClassifier::new(1);

        let verdict = classifier.classify(&artifact("", &["1\n"], Some(1)));
        assert_eq!(verdict.failures(), vec!["exit code 1"]);

        let verdict = classifier.classify(&artifact("", &["1\n"], None));
        assert_eq!(verdict.failures(), vec!["generator did not exit normally"]);
    }
}
