use crate::{PlacementMap, RunResult, WorkloadSeries};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Top level key holding the [PlacementMap]. Always the first key in the document and therefore
/// not usable as a workload label.
pub const PLACEMENTS_KEY: &str = "placements";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Workload label '{0}' appears more than once")]
    DuplicateWorkload(String),
    #[error("Workload label '{0}' is reserved")]
    ReservedLabel(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serde JSON error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The consolidated output of one execution: where services were placed plus every workload
/// series, in the order the workloads ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub placements: PlacementMap,
    pub workloads: Vec<WorkloadSeries>,
}

impl Report {
    pub fn workload(&self, label: &str) -> Option<&WorkloadSeries> {
        self.workloads.iter().find(|w| w.label == label)
    }
}

impl Serialize for Report {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1 + self.workloads.len()))?;
        map.serialize_entry(PLACEMENTS_KEY, &self.placements)?;
        for series in &self.workloads {
            map.serialize_entry(&series.label, &series.runs)?;
        }
        map.end()
    }
}

struct ReportVisitor;

impl<'de> Visitor<'de> for ReportVisitor {
    type Value = Report;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a report object with placements and workload series")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut placements = None;
        let mut workloads: Vec<WorkloadSeries> = Vec::new();
        while let Some(key) = access.next_key::<String>()? {
            if key == PLACEMENTS_KEY {
                if placements.is_some() {
                    return Err(de::Error::duplicate_field(PLACEMENTS_KEY));
                }
                placements = Some(access.next_value::<PlacementMap>()?);
            } else {
                if workloads.iter().any(|w| w.label == key) {
                    return Err(de::Error::custom(format!("duplicate workload '{key}'")));
                }
                let runs = access.next_value::<Vec<RunResult>>()?;
                workloads.push(WorkloadSeries { label: key, runs });
            }
        }

        let placements = placements
            .ok_or_else(|| <A::Error as de::Error>::missing_field(PLACEMENTS_KEY))?;

        Ok(Report {
            placements,
            workloads,
        })
    }
}

impl<'de> Deserialize<'de> for Report {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ReportVisitor)
    }
}

/// Collects the placement snapshot and each finished series before the report is written.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    placements: PlacementMap,
    workloads: Vec<WorkloadSeries>,
}

impl ReportBuilder {
    pub fn new(placements: PlacementMap) -> Self {
        Self {
            placements,
            workloads: Vec::new(),
        }
    }

    /// Append a finished series. Series keep the order they are added in.
    pub fn add_series(&mut self, series: WorkloadSeries) -> Result<&mut Self, ReportError> {
        if series.label == PLACEMENTS_KEY {
            return Err(ReportError::ReservedLabel(series.label));
        }
        if self.workloads.iter().any(|w| w.label == series.label) {
            return Err(ReportError::DuplicateWorkload(series.label));
        }
        self.workloads.push(series);
        Ok(self)
    }

    pub fn build(self) -> Report {
        Report {
            placements: self.placements,
            workloads: self.workloads,
        }
    }
}

/// Write the whole report to `path` in one go.
///
/// The document is pretty-printed into a temporary file next to `path` and then renamed over it,
/// so readers never observe a partially written report.
pub fn write_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, report)?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.persist(path).map_err(|e| ReportError::Io(e.error))?;

    Ok(())
}

/// Load a report previously written with [write_report].
pub fn load_report(path: &Path) -> Result<Report, ReportError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}
