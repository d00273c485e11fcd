use std::time::Duration;

use chrono::Utc;
use proving_ground_report_model::WorkloadSeries;

use crate::generator::LoadGenerator;
use crate::health::HealthClassifier;
use crate::progress::SeriesProgress;
use crate::retry::{RetryController, RetryOutcome, RetryPolicy};
use crate::stats::StatsExtractor;
use crate::types::ProvingGroundResult;
use crate::workload::{LoadRequest, WorkloadRunner};

/// A named load to apply to the system under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub label: String,
    pub request: LoadRequest,
}

/// The untracked run made before the measured repetitions of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupPolicy {
    pub enabled: bool,
    pub duration: Duration,
    /// Upper bound for the warm-up request rate.
    pub rate_cap: u32,
}

impl Default for WarmupPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            duration: Duration::from_secs(10),
            rate_cap: 100,
        }
    }
}

impl WarmupPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// The warm-up variant of `request`: never longer and never faster than the measured runs.
    pub fn request_for(&self, request: &LoadRequest) -> LoadRequest {
        LoadRequest {
            duration: self.duration.min(request.duration),
            rate: self.rate_cap.min(request.rate),
            ..request.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesOptions {
    pub repetitions: u32,
    pub warmup: WarmupPolicy,
    pub retry: RetryPolicy,
    pub show_progress: bool,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            repetitions: 1,
            warmup: WarmupPolicy::default(),
            retry: RetryPolicy::default(),
            show_progress: true,
        }
    }
}

/// Run a warm-up followed by exactly `options.repetitions` measured repetitions of `workload`.
///
/// Every repetition contributes one entry to the returned series, including repetitions that
/// never became healthy. Those are logged as unreliable.
pub fn run_series<G: LoadGenerator>(
    runner: &WorkloadRunner<G>,
    workload: &Workload,
    options: &SeriesOptions,
) -> ProvingGroundResult<WorkloadSeries> {
    let label = workload.label.as_str();

    if options.warmup.enabled {
        warm_up(runner, workload, &options.warmup);
    } else {
        log::debug!("[warmup] {label}: skipped");
    }

    let controller = RetryController::new(
        runner,
        HealthClassifier::new(workload.request.threads),
        options.retry,
    );
    let extractor = StatsExtractor::new();
    let progress = SeriesProgress::new(label, options.repetitions, options.show_progress);

    let mut series = WorkloadSeries::new(label);
    let mut unreliable = 0;
    for repetition in 1..=options.repetitions {
        let started_at = Utc::now();
        let outcome = controller.run(&workload.request, label, &format!("rep{repetition:03}"))?;

        if let RetryOutcome::Exhausted { attempts, .. } = &outcome {
            unreliable += 1;
            progress.set_message(format!("{unreliable} unreliable"));
            log::warn!(
                "[run] {label}: repetition {repetition}/{n} recorded from an unhealthy run after {attempts} attempts",
                n = options.repetitions
            );
        }

        series.push(extractor.extract(outcome.artifact(), &workload.request, started_at));
        progress.repetition_done();
    }
    progress.finish();

    log::info!(
        "[run] {label}: {healthy} healthy, {unreliable} unreliable of {n} repetitions",
        healthy = options.repetitions - unreliable,
        n = options.repetitions
    );

    Ok(series)
}

fn warm_up<G: LoadGenerator>(runner: &WorkloadRunner<G>, workload: &Workload, policy: &WarmupPolicy) {
    let label = workload.label.as_str();
    let request = policy.request_for(&workload.request);
    log::info!(
        "[warmup] {label}: {duration} at {rate} req/s",
        duration = request.duration_arg(),
        rate = request.rate
    );

    match runner.run(&request, label, "warmup") {
        Ok(artifact) => {
            if let Err(e) = std::fs::remove_dir_all(&artifact.run_dir) {
                log::warn!(
                    "[warmup] {label}: failed to remove '{}': {e}",
                    artifact.run_dir.display()
                );
            }
        }
        Err(e) => log::warn!("[warmup] {label}: ignoring failed warm-up: {e:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::tests::{request, Outcome, ScriptedGenerator};
    use tempfile::TempDir;

    fn options(repetitions: u32, warmup: WarmupPolicy) -> SeriesOptions {
        SeriesOptions {
            repetitions,
            warmup,
            retry: RetryPolicy::default().backoff(Duration::ZERO),
            show_progress: false,
        }
    }

    fn workload(threads: u32) -> Workload {
        Workload {
            label: "compose".to_string(),
            request: request(threads),
        }
    }

    #[test]
    fn series_has_one_result_per_repetition() {
        let root = TempDir::new().unwrap();
        let generator = ScriptedGenerator::new(vec![Outcome::healthy(2)]);
        let runner = WorkloadRunner::new(&generator, root.path());

        let series = run_series(&runner, &workload(2), &options(3, WarmupPolicy::disabled())).unwrap();

        assert_eq!(series.label, "compose");
        assert_eq!(series.len(), 3);
        assert_eq!(generator.calls.borrow().len(), 3);
        for run in &series.runs {
            assert_eq!(run.e2e_vals, vec![10, 11]);
            assert_eq!(run.threads, 2);
        }
    }

    #[test]
    fn unhealthy_repetitions_still_count() {
        let root = TempDir::new().unwrap();
        // Never becomes healthy: every repetition exhausts 5 attempts.
        let generator = ScriptedGenerator::new(vec![Outcome::non_2xx()]);
        let runner = WorkloadRunner::new(&generator, root.path());

        let series = run_series(&runner, &workload(2), &options(2, WarmupPolicy::disabled())).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(generator.calls.borrow().len(), 10);
        assert_eq!(series.runs[0].rps_observed.as_str(), "5.0");
        assert_eq!(series.runs[0].e2e_vals, vec![1, 2]);
    }

    #[test]
    fn warmup_runs_first_with_capped_rate_and_is_discarded() {
        let root = TempDir::new().unwrap();
        let generator = ScriptedGenerator::new(vec![Outcome::healthy(2)]);
        let runner = WorkloadRunner::new(&generator, root.path());
        let warmup = WarmupPolicy {
            enabled: true,
            duration: Duration::from_secs(5),
            rate_cap: 40,
        };

        let series = run_series(&runner, &workload(2), &options(1, warmup)).unwrap();

        let calls = generator.calls.borrow();
        assert_eq!(calls.len(), 2);
        let (warmup_request, warmup_dir) = &calls[0];
        assert_eq!(warmup_request.rate, 40);
        assert_eq!(warmup_request.duration, Duration::from_secs(5));
        assert!(!warmup_dir.exists());
        assert_eq!(calls[1].0.rate, 100);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn failed_warmup_is_ignored() {
        let root = TempDir::new().unwrap();
        let generator = ScriptedGenerator::new(vec![
            Outcome {
                fail_to_start: true,
                ..Default::default()
            },
            Outcome::healthy(1),
        ]);
        let runner = WorkloadRunner::new(&generator, root.path());

        let series = run_series(&runner, &workload(1), &options(1, WarmupPolicy::default())).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(generator.calls.borrow().len(), 2);
    }

    #[test]
    fn warmup_never_exceeds_measured_load() {
        let policy = WarmupPolicy {
            enabled: true,
            duration: Duration::from_secs(60),
            rate_cap: 1000,
        };
        let warm = policy.request_for(&request(1));
        assert_eq!(warm.rate, 100);
        assert_eq!(warm.duration, Duration::from_secs(30));
    }

    #[test]
    fn zero_repetitions_is_an_empty_series() {
        let root = TempDir::new().unwrap();
        let generator = ScriptedGenerator::new(vec![Outcome::healthy(1)]);
        let runner = WorkloadRunner::new(&generator, root.path());

        let series = run_series(&runner, &workload(1), &options(0, WarmupPolicy::disabled())).unwrap();

        assert!(series.is_empty());
        assert!(generator.calls.borrow().is_empty());
    }
}
