use std::time::Duration;

use crate::artifact::RunArtifact;
use crate::generator::LoadGenerator;
use crate::health::{HealthClassifier, HealthVerdict};
use crate::types::ProvingGroundResult;
use crate::workload::{LoadRequest, WorkloadRunner};

/// How unhealthy runs are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, so a run is attempted at most `max_retries + 1` times.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
    /// Keep the run directories of attempts that were superseded by a retry.
    pub keep_superseded_attempts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff: Duration::from_secs(10),
            keep_superseded_attempts: true,
        }
    }
}

impl RetryPolicy {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn keep_superseded_attempts(mut self, keep: bool) -> Self {
        self.keep_superseded_attempts = keep;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// The terminal result of a [RetryController] run.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// An attempt passed the health checks.
    Healthy { artifact: RunArtifact, attempts: u32 },
    /// Every attempt was unhealthy. Holds the last attempt's artifact and verdict, not the best.
    Exhausted {
        artifact: RunArtifact,
        verdict: HealthVerdict,
        attempts: u32,
    },
}

impl RetryOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, RetryOutcome::Healthy { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Healthy { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn artifact(&self) -> &RunArtifact {
        match self {
            RetryOutcome::Healthy { artifact, .. } | RetryOutcome::Exhausted { artifact, .. } => {
                artifact
            }
        }
    }

    /// Why the recorded attempt should not be trusted, [None] for a healthy outcome.
    pub fn unreliable_reason(&self) -> Option<String> {
        match self {
            RetryOutcome::Healthy { .. } => None,
            RetryOutcome::Exhausted {
                verdict, attempts, ..
            } => Some(format!(
                "still {verdict} after {attempts} attempts, keeping the last attempt; treat this result as unreliable"
            )),
        }
    }
}

enum RetryState {
    Attempting {
        attempt: u32,
        superseded: Option<RunArtifact>,
    },
    Sleeping {
        next_attempt: u32,
        last: RunArtifact,
    },
    Done(RetryOutcome),
}

/// Runs a workload repetition until it is healthy or the attempt budget is spent.
///
/// Exhausting the budget is not an error. The last attempt is returned as
/// [RetryOutcome::Exhausted] so the caller can still record best-effort numbers.
pub struct RetryController<'a, G> {
    runner: &'a WorkloadRunner<G>,
    classifier: HealthClassifier,
    policy: RetryPolicy,
}

impl<'a, G: LoadGenerator> RetryController<'a, G> {
    pub fn new(
        runner: &'a WorkloadRunner<G>,
        classifier: HealthClassifier,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            runner,
            classifier,
            policy,
        }
    }

    /// Run one repetition of the workload `label`. `name` prefixes every attempt's run directory.
    pub fn run(
        &self,
        request: &LoadRequest,
        label: &str,
        name: &str,
    ) -> ProvingGroundResult<RetryOutcome> {
        let max_attempts = self.policy.max_attempts();
        let mut state = RetryState::Attempting {
            attempt: 1,
            superseded: None,
        };

        loop {
            state = match state {
                RetryState::Attempting {
                    attempt,
                    superseded,
                } => {
                    if let Some(superseded) = superseded {
                        self.discard(&superseded);
                    }

                    let artifact =
                        self.runner
                            .run(request, label, &format!("{name}-attempt{attempt}"))?;
                    let verdict = self.classifier.classify(&artifact);

                    if verdict.is_healthy() {
                        log::info!("[retry] {label} {name}: attempt {attempt}/{max_attempts} {verdict}");
                        RetryState::Done(RetryOutcome::Healthy {
                            artifact,
                            attempts: attempt,
                        })
                    } else if attempt < max_attempts {
                        log::warn!(
                            "[retry] {label} {name}: attempt {attempt}/{max_attempts} {verdict}, retrying in {backoff:?}",
                            backoff = self.policy.backoff
                        );
                        RetryState::Sleeping {
                            next_attempt: attempt + 1,
                            last: artifact,
                        }
                    } else {
                        let outcome = RetryOutcome::Exhausted {
                            artifact,
                            verdict,
                            attempts: attempt,
                        };
                        if let Some(reason) = outcome.unreliable_reason() {
                            log::warn!("[retry] {label} {name}: {reason}");
                        }
                        RetryState::Done(outcome)
                    }
                }
                RetryState::Sleeping { next_attempt, last } => {
                    std::thread::sleep(self.policy.backoff);
                    RetryState::Attempting {
                        attempt: next_attempt,
                        superseded: Some(last),
                    }
                }
                RetryState::Done(outcome) => return Ok(outcome),
            };
        }
    }

    fn discard(&self, superseded: &RunArtifact) {
        if self.policy.keep_superseded_attempts {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&superseded.run_dir) {
            log::warn!(
                "[retry] Failed to remove superseded run directory '{}': {e}",
                superseded.run_dir.display()
            );
        }
    }
}
