use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

mod placement;
mod report;

pub use placement::{NodePlacement, PlacementMap, PRIMARY_LABEL, SECONDARY_LABEL_PREFIX};
pub use report::{load_report, write_report, Report, ReportBuilder, ReportError, PLACEMENTS_KEY};

/// Written in place of any value that could not be read from the load generator output.
pub const NOT_AVAILABLE: &str = "na";

/// A measurement copied verbatim from the load generator output.
///
/// Serialized as a JSON string. When the value could not be found the [NOT_AVAILABLE] sentinel is
/// written instead, so the report schema never contains `null` or missing fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(from = "String", into = "String")]
pub enum Metric {
    #[display("{_0}")]
    Value(String),
    #[display("na")]
    NotAvailable,
}

impl Metric {
    /// Build a metric from an optional token, falling back to [Metric::NotAvailable].
    pub fn from_token(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some(token) if !token.is_empty() => Metric::from(token.to_string()),
            _ => Metric::NotAvailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Metric::Value(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Metric::Value(value) => value,
            Metric::NotAvailable => NOT_AVAILABLE,
        }
    }
}

impl From<String> for Metric {
    fn from(value: String) -> Self {
        if value == NOT_AVAILABLE {
            Metric::NotAvailable
        } else {
            Metric::Value(value)
        }
    }
}

impl From<Metric> for String {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Value(value) => value,
            Metric::NotAvailable => NOT_AVAILABLE.to_string(),
        }
    }
}

/// Median end-to-end latency in microseconds, held at 3 decimal places.
///
/// Serialized as a JSON number with exactly three fractional digits, e.g. `20.000`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Median(f64);

impl Median {
    pub fn new(value: f64) -> Self {
        Self((value * 1000.0).round() / 1000.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for Median {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

impl Serialize for Median {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let raw = serde_json::value::RawValue::from_string(self.to_string())
            .map_err(S::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Median {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        if !value.is_finite() {
            return Err(D::Error::custom("median must be a finite number"));
        }
        Ok(Median::new(value))
    }
}

/// The durable record of one repetition of a workload.
///
/// Field order is the serialized order and is part of the report format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    /// When the repetition started, UTC, ISO-8601 with second precision.
    pub timestamp: String,
    pub threads: u32,
    pub conns: u32,
    /// Duration as passed to the load generator, e.g. `30s`.
    pub duration: String,
    /// Requested rate in requests per second.
    pub rps_target: u32,
    /// Observed requests per second
    pub rps_observed: Metric,
    pub p50: Metric,
    pub p90: Metric,
    pub p99: Metric,
    pub p999: Metric,
    /// Median of the pooled end-to-end samples across all workers.
    pub e2e_median: Median,
    /// Raw end-to-end samples, worker files concatenated in ascending worker order.
    pub e2e_vals: Vec<u64>,
}

/// All repetitions of one named workload, in repetition order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSeries {
    pub label: String,
    pub runs: Vec<RunResult>,
}

impl WorkloadSeries {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            runs: Vec::new(),
        }
    }

    pub fn push(&mut self, run: RunResult) {
        self.runs.push(run);
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
