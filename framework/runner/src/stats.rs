//! Extraction of typed statistics from the load generator's text output.
//!
//! This is the only place that knows the shape of the generator output. The line patterns below
//! form the [SUMMARY_CONTRACT] and any change to them is a change of that contract.
//!
//! Summary (standard output):
//! - percentile lines: `<label>%` followed by whitespace and a duration token, e.g.
//!   ` 50.000%    12.34ms`. Labels: `50.000`, `90.000`, `99.000`, `99.900`. The first match wins and
//!   the token is copied verbatim, unit suffix included.
//! - throughput: `Requests/sec:` followed by a numeric token.
//! - errors: an optional `Non-2xx or 3xx responses: <count>` line.
//!
//! Per-worker sample files: one non-negative integer latency in microseconds per line. Any other
//! line is ignored.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use proving_ground_report_model::{Median, Metric, RunResult};
use regex::Regex;

use crate::artifact::RunArtifact;
use crate::workload::LoadRequest;

/// Identifies the line patterns this module understands.
pub const SUMMARY_CONTRACT: &str = "wrk2-hdr/1";

static PERCENTILE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(50\.000|90\.000|99\.000|99\.900)%\s+(\S+)").expect("valid regex")
});
static REQUESTS_PER_SEC_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Requests/sec:\s+(\S+)").expect("valid regex"));
static NON_2XX_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Non-2xx or 3xx responses:\s+(\d+)").expect("valid regex")
});

/// A latency percentile reported in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Percentile {
    P50,
    P90,
    P99,
    P999,
}

impl Percentile {
    fn label(self) -> &'static str {
        match self {
            Percentile::P50 => "50.000",
            Percentile::P90 => "90.000",
            Percentile::P99 => "99.000",
            Percentile::P999 => "99.900",
        }
    }
}

/// The duration token reported for `percentile`, or [Metric::NotAvailable].
pub fn percentile(summary: &str, percentile: Percentile) -> Metric {
    let token = PERCENTILE_LINE
        .captures_iter(summary)
        .find(|c| &c[1] == percentile.label())
        .and_then(|c| c.get(2))
        .map(|m| m.as_str());
    Metric::from_token(token)
}

/// The `Requests/sec:` token, or [Metric::NotAvailable].
pub fn requests_per_sec(summary: &str) -> Metric {
    let token = REQUESTS_PER_SEC_LINE
        .captures(summary)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());
    Metric::from_token(token)
}

/// Number of non-2xx/3xx responses. A summary without the line reports zero.
pub fn non_2xx_responses(summary: &str) -> u64 {
    NON_2XX_LINE
        .captures(summary)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}

/// Every line of a sample file that is a pure non-negative integer, in file order.
pub fn sample_values(contents: &str) -> impl Iterator<Item = u64> + '_ {
    contents.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        line.parse().ok()
    })
}

/// Median of the pooled samples. Zero for an empty set.
pub fn median(samples: &[u64]) -> Median {
    if samples.is_empty() {
        return Median::default();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    let value = if sorted.len() % 2 == 1 {
        sorted[mid] as f64
    } else {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    };
    Median::new(value)
}

/// Turns a [RunArtifact] into a [RunResult].
///
/// Extraction never fails: anything missing from the output is reported with the `na` sentinel or
/// an empty sample set. Given the same inputs the output is always identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsExtractor;

impl StatsExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(
        &self,
        artifact: &RunArtifact,
        request: &LoadRequest,
        started_at: DateTime<Utc>,
    ) -> RunResult {
        let e2e_vals = artifact
            .sample_files
            .iter()
            .flat_map(|f| sample_values(&f.contents))
            .collect::<Vec<_>>();
        let e2e_median = median(&e2e_vals);

        let result = RunResult {
            timestamp: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            threads: request.threads,
            conns: request.connections,
            duration: request.duration_arg(),
            rps_target: request.rate,
            rps_observed: requests_per_sec(&artifact.summary),
            p50: percentile(&artifact.summary, Percentile::P50),
            p90: percentile(&artifact.summary, Percentile::P90),
            p99: percentile(&artifact.summary, Percentile::P99),
            p999: percentile(&artifact.summary, Percentile::P999),
            e2e_median,
            e2e_vals,
        };

        log::debug!(
            "[stats] {dir}: p50={p50} p99={p99} rps={rps} samples={n} median={median}",
            dir = artifact.run_dir.display(),
            p50 = result.p50,
            p99 = result.p99,
            rps = result.rps_observed,
            n = result.e2e_vals.len(),
            median = result.e2e_median,
        );

        result
    }
}
