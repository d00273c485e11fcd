use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use proving_ground_orchestrator::{
    snapshot, Kubernetes, Orchestrator, OrchestratorError, OrchestratorKind, Swarm,
};
use proving_ground_report_model::{write_report, PlacementMap, Report, ReportBuilder};
use proving_ground_runner::prelude::{
    load_generator_path, run_series, LivenessProbe, LoadGenerator, ProvingGroundResult,
    SeriesOptions, WarmupPolicy, Workload, WorkloadRunner, Wrk2,
};

use crate::cli::ProvingGroundCli;
use crate::config::{BenchConfig, LivenessConfig, OrchestratorConfig};

/// Run a full benchmark as described by the command line and return the path of the report.
///
/// Nothing is written when any step before the last workload fails.
pub fn execute(cli: ProvingGroundCli) -> anyhow::Result<PathBuf> {
    let mut config = BenchConfig::load_selected(&cli.config, &cli.only)
        .with_context(|| format!("[config] Cannot use '{}'", cli.config.display()))?;
    if let Some(report) = cli.report {
        config.report = report;
    }
    if let Some(repetitions) = cli.repetitions {
        if repetitions == 0 {
            bail!("[config] --repetitions must be greater than zero");
        }
        config.defaults.repetitions = repetitions;
    }

    let generator = load_generator(&config).context("[prereq] Load generator is not available")?;
    let orchestrator = orchestrator(&config.orchestrator);

    match (&config.liveness, cli.skip_liveness) {
        (Some(liveness), false) => wait_until_live(liveness)?,
        (Some(_), true) => log::info!("[liveness] Skipped"),
        (None, _) => log::debug!("[liveness] No liveness endpoint configured"),
    }

    let options = SeriesOptions {
        repetitions: config.defaults.repetitions,
        warmup: if cli.no_warmup {
            WarmupPolicy::disabled()
        } else {
            config.warmup.policy()
        },
        retry: config.retry.policy(),
        show_progress: !cli.no_progress,
    };

    let runner = WorkloadRunner::new(generator, &config.run_root);
    let report = run_workloads(
        &runner,
        &config.workloads(),
        &options,
        orchestrator.as_deref(),
    )?;

    write_report(&report, &config.report)
        .with_context(|| format!("[report] Failed to write '{}'", config.report.display()))?;
    log::info!(
        "[report] Wrote {} workloads to '{}'",
        report.workloads.len(),
        config.report.display()
    );

    Ok(config.report)
}

/// Snapshot the placements and run every workload in order, collecting the results into a
/// [Report]. The report is only built in memory.
pub fn run_workloads<G: LoadGenerator>(
    runner: &WorkloadRunner<G>,
    workloads: &[Workload],
    options: &SeriesOptions,
    orchestrator: Option<&dyn Orchestrator>,
) -> ProvingGroundResult<Report> {
    let placements = match orchestrator {
        Some(orchestrator) => snapshot(orchestrator),
        None => {
            log::info!("[placement] No orchestrator configured, placements will be empty");
            PlacementMap::new()
        }
    };

    let mut builder = ReportBuilder::new(placements);
    for workload in workloads {
        let series = run_series(runner, workload, options)
            .with_context(|| format!("[run] Workload '{}' failed", workload.label))?;
        builder.add_series(series)?;
    }

    Ok(builder.build())
}

fn load_generator(config: &BenchConfig) -> ProvingGroundResult<Wrk2> {
    let path = load_generator_path(&config.load_generator.binary)?;
    log::info!("[prereq] Using load generator '{}'", path.display());

    Ok(Wrk2::new(path)
        .with_per_worker_flag(config.load_generator.per_worker_flag())
        .with_extra_args(config.load_generator.extra_args.clone()))
}

/// The orchestrator to snapshot placements from.
///
/// Placements are diagnostic, so a missing `docker` or `kubectl` only means an empty placement
/// map in the report.
fn orchestrator(config: &OrchestratorConfig) -> Option<Box<dyn Orchestrator>> {
    let orchestrator: Result<Box<dyn Orchestrator>, OrchestratorError> = match config.kind {
        OrchestratorKind::Swarm => {
            Swarm::from_env().map(|swarm| Box::new(swarm) as Box<dyn Orchestrator>)
        }
        OrchestratorKind::Kubernetes => Kubernetes::from_env(config.namespace.clone()).map(|k8s| {
            Box::new(k8s.with_service_label(config.service_label.clone())) as Box<dyn Orchestrator>
        }),
        OrchestratorKind::None => return None,
    };

    match orchestrator {
        Ok(orchestrator) => {
            log::info!("[prereq] Using {} for placements", config.kind);
            Some(orchestrator)
        }
        Err(e) => {
            log::warn!(
                "[placement] {} is not available, placements will be empty: {e}",
                config.kind
            );
            None
        }
    }
}

fn wait_until_live(config: &LivenessConfig) -> ProvingGroundResult<()> {
    log::info!("[liveness] Waiting for {}", config.url);

    LivenessProbe::new(config.url.as_str())
        .with_form(config.form.clone().into_iter().collect())
        .with_interval(Duration::from_millis(config.interval_ms))
        .with_deadline(Duration::from_secs(config.deadline_secs))
        .with_request_timeout(Duration::from_millis(config.request_timeout_ms))
        .wait_until_live()
        .context("[liveness] System under test is not live")?;

    Ok(())
}
