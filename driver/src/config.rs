use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use proving_ground_orchestrator::{OrchestratorKind, DEFAULT_SERVICE_LABEL};
use proving_ground_report_model::PLACEMENTS_KEY;
use proving_ground_runner::prelude::{
    LoadRequest, RetryPolicy, WarmupPolicy, Workload, DEFAULT_LOAD_GENERATOR,
    DEFAULT_PER_WORKER_FLAG,
};
use serde::Deserialize;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("No workloads configured")]
    NoWorkloads,
    #[error("Workload label '{0}' is used more than once")]
    DuplicateLabel(String),
    #[error("Workload label '{0}' is reserved")]
    ReservedLabel(String),
    #[error("Workload label '{0}' must be non-empty and must not contain path separators")]
    InvalidLabel(String),
    #[error("Workload '{label}': {field} must be greater than zero")]
    Zero { label: String, field: &'static str },
    #[error("Workload '{label}': {connections} connections is fewer than its {threads} threads")]
    TooFewConnections {
        label: String,
        connections: u32,
        threads: u32,
    },
    #[error("Repetitions must be greater than zero")]
    ZeroRepetitions,
    #[error("Workload '{label}': cannot read script '{path}': {source}")]
    Script {
        label: String,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unknown workload '{0}' selected")]
    UnknownWorkload(String),
}

/// Everything a benchmark execution needs, read from a TOML file.
///
/// Relative paths are resolved against the directory holding the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    /// Directory that holds one sub-directory per workload with all run output.
    #[serde(default = "default_run_root")]
    pub run_root: PathBuf,
    /// Where the consolidated JSON report is written.
    #[serde(default = "default_report")]
    pub report: PathBuf,
    #[serde(default)]
    pub load_generator: LoadGeneratorConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub warmup: WarmupConfig,
    #[serde(default)]
    pub defaults: WorkloadDefaults,
    /// Endpoint that must answer before any load is applied. No probe when absent.
    #[serde(default)]
    pub liveness: Option<LivenessConfig>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Workloads in execution order.
    #[serde(default, rename = "workload")]
    pub workloads: Vec<WorkloadConfig>,
}

fn default_run_root() -> PathBuf {
    PathBuf::from("runs")
}

fn default_report() -> PathBuf {
    PathBuf::from("report.json")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoadGeneratorConfig {
    /// Binary name looked up in `PATH`, or a path to it.
    pub binary: String,
    /// Flag enabling per-worker sample files. Empty when the generator needs none.
    pub per_worker_flag: String,
    pub extra_args: Vec<String>,
}

impl Default for LoadGeneratorConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_LOAD_GENERATOR.to_string(),
            per_worker_flag: DEFAULT_PER_WORKER_FLAG.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl LoadGeneratorConfig {
    pub fn per_worker_flag(&self) -> Option<String> {
        Some(self.per_worker_flag.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_secs: u64,
    pub keep_superseded_attempts: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            backoff_secs: policy.backoff.as_secs(),
            keep_superseded_attempts: policy.keep_superseded_attempts,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .max_retries(self.max_retries)
            .backoff(Duration::from_secs(self.backoff_secs))
            .keep_superseded_attempts(self.keep_superseded_attempts)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WarmupConfig {
    pub enabled: bool,
    pub duration_secs: u64,
    pub rate_cap: u32,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        let policy = WarmupPolicy::default();
        Self {
            enabled: policy.enabled,
            duration_secs: policy.duration.as_secs(),
            rate_cap: policy.rate_cap,
        }
    }
}

impl WarmupConfig {
    pub fn policy(&self) -> WarmupPolicy {
        WarmupPolicy {
            enabled: self.enabled,
            duration: Duration::from_secs(self.duration_secs),
            rate_cap: self.rate_cap,
        }
    }
}

/// Values used by every workload that does not override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkloadDefaults {
    pub threads: u32,
    pub connections: u32,
    pub duration_secs: u64,
    pub rate: u32,
    pub repetitions: u32,
}

impl Default for WorkloadDefaults {
    fn default() -> Self {
        Self {
            threads: 2,
            connections: 32,
            duration_secs: 30,
            rate: 500,
            repetitions: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LivenessConfig {
    pub url: Url,
    /// Form fields to POST. A GET is sent when empty.
    #[serde(default)]
    pub form: BTreeMap<String, String>,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_deadline_secs() -> u64 {
    120
}

fn default_request_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OrchestratorConfig {
    pub kind: OrchestratorKind,
    /// Kubernetes namespace holding the application's pods.
    pub namespace: String,
    /// Kubernetes pod label naming the service.
    pub service_label: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            kind: OrchestratorKind::default(),
            namespace: "default".to_string(),
            service_label: DEFAULT_SERVICE_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadConfig {
    pub label: String,
    pub url: Url,
    pub script: PathBuf,
    pub threads: Option<u32>,
    pub connections: Option<u32>,
    pub duration_secs: Option<u64>,
    pub rate: Option<u32>,
}

impl BenchConfig {
    /// Read, resolve and validate the config at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_selected(path, &[])
    }

    /// Like [BenchConfig::load] but only keeps the workloads named in `labels`, see
    /// [BenchConfig::select_workloads]. Workloads that are filtered out are not validated.
    pub fn load_selected(path: &Path, labels: &[String]) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut config = Self::parse(&content, base_dir)?;
        config.select_workloads(labels)?;
        config.validate()?;
        log::info!(
            "[config] Loaded {} workloads from '{}'",
            config.workloads.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parse and validate a config, resolving relative paths against `base_dir`.
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let config = Self::parse(content, base_dir)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut config: BenchConfig = toml::from_str(content)?;
        config.resolve_paths(base_dir);
        Ok(config)
    }

    /// Make every path in the config absolute. Relative paths are relative to `base_dir`, which
    /// itself may be relative to the working directory.
    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            let joined = base_dir.join(&*path);
            *path = std::path::absolute(&joined).unwrap_or(joined);
        };
        resolve(&mut self.run_root);
        resolve(&mut self.report);
        for workload in &mut self.workloads {
            resolve(&mut workload.script);
        }
    }

    /// Check the config is usable before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workloads.is_empty() {
            return Err(ConfigError::NoWorkloads);
        }
        if self.defaults.repetitions == 0 {
            return Err(ConfigError::ZeroRepetitions);
        }

        let mut seen = HashSet::new();
        for workload in &self.workloads {
            let label = &workload.label;
            if label == PLACEMENTS_KEY {
                return Err(ConfigError::ReservedLabel(label.clone()));
            }
            if label.trim().is_empty() || label.contains(['/', '\\']) || label == "." || label == ".." {
                return Err(ConfigError::InvalidLabel(label.clone()));
            }
            if !seen.insert(label.as_str()) {
                return Err(ConfigError::DuplicateLabel(label.clone()));
            }

            let request = self.request_for(workload);
            let zero = |field| ConfigError::Zero {
                label: label.clone(),
                field,
            };
            if request.threads == 0 {
                return Err(zero("threads"));
            }
            if request.connections == 0 {
                return Err(zero("connections"));
            }
            if request.duration.is_zero() {
                return Err(zero("duration_secs"));
            }
            if request.rate == 0 {
                return Err(zero("rate"));
            }
            if request.connections < request.threads {
                return Err(ConfigError::TooFewConnections {
                    label: label.clone(),
                    connections: request.connections,
                    threads: request.threads,
                });
            }

            std::fs::File::open(&workload.script).map_err(|source| ConfigError::Script {
                label: label.clone(),
                path: workload.script.clone(),
                source,
            })?;
        }

        Ok(())
    }

    /// Keep only the workloads named in `labels`, in config order. An empty filter keeps all.
    pub fn select_workloads(&mut self, labels: &[String]) -> Result<(), ConfigError> {
        if labels.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = labels
            .iter()
            .find(|l| !self.workloads.iter().any(|w| &w.label == *l))
        {
            return Err(ConfigError::UnknownWorkload(unknown.clone()));
        }
        self.workloads.retain(|w| labels.contains(&w.label));
        Ok(())
    }

    pub fn request_for(&self, workload: &WorkloadConfig) -> LoadRequest {
        LoadRequest {
            url: workload.url.to_string(),
            script: workload.script.clone(),
            threads: workload.threads.unwrap_or(self.defaults.threads),
            connections: workload.connections.unwrap_or(self.defaults.connections),
            duration: Duration::from_secs(
                workload.duration_secs.unwrap_or(self.defaults.duration_secs),
            ),
            rate: workload.rate.unwrap_or(self.defaults.rate),
        }
    }

    /// The workloads to run, in execution order.
    pub fn workloads(&self) -> Vec<Workload> {
        self.workloads
            .iter()
            .map(|w| Workload {
                label: w.label.clone(),
                request: self.request_for(w),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str) {
        std::fs::write(dir.path().join(name), "wrk.method = \"GET\"\n").unwrap();
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "home.lua");

        let config = BenchConfig::from_toml_str(
            r#"
            [[workload]]
            label = "home"
            url = "http://localhost:8080"
            script = "home.lua"
            "#,
            dir.path(),
        )
        .unwrap();

        assert_eq!(config.run_root, dir.path().join("runs"));
        assert_eq!(config.report, dir.path().join("report.json"));
        assert_eq!(config.retry.policy(), RetryPolicy::default());
        assert_eq!(config.warmup.policy(), WarmupPolicy::default());
        assert_eq!(config.orchestrator.kind, OrchestratorKind::Swarm);
        assert_eq!(config.orchestrator.service_label, "app");
        assert!(config.liveness.is_none());
        assert_eq!(config.load_generator.per_worker_flag(), Some("-P".to_string()));

        let workloads = config.workloads();
        assert_eq!(workloads.len(), 1);
        assert_eq!(workloads[0].request.url, "http://localhost:8080/");
        assert_eq!(workloads[0].request.threads, 2);
        assert_eq!(workloads[0].request.duration, Duration::from_secs(30));
        assert_eq!(workloads[0].request.script, dir.path().join("home.lua"));
    }

    #[test]
    fn full_config() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "compose.lua");
        write_script(&dir, "read.lua");

        let config = BenchConfig::from_toml_str(
            r#"
            run_root = "/tmp/pg-runs"
            report = "out/report.json"

            [load_generator]
            binary = "/opt/wrk2/wrk"
            per_worker_flag = ""
            extra_args = ["--timeout", "10s"]

            [retry]
            max_retries = 2
            backoff_secs = 1
            keep_superseded_attempts = false

            [warmup]
            enabled = false

            [defaults]
            threads = 4
            connections = 64
            rate = 2000
            repetitions = 3

            [liveness]
            url = "http://localhost:8080/wrk2-api/user/login"
            form = { username = "probe", password = "probe" }
            deadline_secs = 30

            [orchestrator]
            kind = "kubernetes"
            namespace = "social-network"

            [[workload]]
            label = "compose-post"
            url = "http://localhost:8080/wrk2-api/post/compose"
            script = "compose.lua"
            rate = 500

            [[workload]]
            label = "read-home-timeline"
            url = "http://localhost:8080/wrk2-api/home-timeline/read"
            script = "read.lua"
            threads = 8
            connections = 128
            duration_secs = 60
            "#,
            dir.path(),
        )
        .unwrap();

        assert_eq!(config.run_root, PathBuf::from("/tmp/pg-runs"));
        assert_eq!(config.report, dir.path().join("out/report.json"));
        assert_eq!(config.load_generator.per_worker_flag(), None);
        assert_eq!(config.retry.policy().max_attempts(), 3);
        assert!(!config.retry.policy().keep_superseded_attempts);
        assert!(!config.warmup.policy().enabled);
        assert_eq!(config.orchestrator.kind, OrchestratorKind::Kubernetes);

        let liveness = config.liveness.as_ref().unwrap();
        assert_eq!(liveness.form.len(), 2);
        assert_eq!(liveness.interval_ms, 1000);
        assert_eq!(liveness.deadline_secs, 30);

        let workloads = config.workloads();
        assert_eq!(
            workloads.iter().map(|w| w.label.as_str()).collect::<Vec<_>>(),
            vec!["compose-post", "read-home-timeline"]
        );
        assert_eq!(workloads[0].request.rate, 500);
        assert_eq!(workloads[0].request.threads, 4);
        assert_eq!(workloads[1].request.threads, 8);
        assert_eq!(workloads[1].request.rate, 2000);
        assert_eq!(workloads[1].request.duration_arg(), "60s");
    }

    fn workload_config(dir: &TempDir, extra: &str) -> Result<BenchConfig, ConfigError> {
        write_script(dir, "a.lua");
        BenchConfig::from_toml_str(
            &format!(
                r#"
                {extra}
                [[workload]]
                label = "a"
                url = "http://localhost/"
                script = "a.lua"
                "#
            ),
            dir.path(),
        )
    }

    #[test]
    fn zero_repetitions_is_invalid() {
        let dir = TempDir::new().unwrap();
        let err = workload_config(&dir, "[defaults]\nrepetitions = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroRepetitions));
    }

    #[test]
    fn zero_threads_is_invalid() {
        let dir = TempDir::new().unwrap();
        let err = workload_config(&dir, "[defaults]\nthreads = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Zero { field: "threads", .. }));
    }

    #[test]
    fn fewer_connections_than_threads_is_invalid() {
        let dir = TempDir::new().unwrap();
        let err = workload_config(&dir, "[defaults]\nthreads = 8\nconnections = 4\n").unwrap_err();
        assert!(matches!(err, ConfigError::TooFewConnections { .. }));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let err = workload_config(&dir, "[retry]\nmax_retry = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "a.lua");
        let err = BenchConfig::from_toml_str(
            "[[workload]]\nlabel = \"a\"\nurl = \"not a url\"\nscript = \"a.lua\"\n",
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn label_checks() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "a.lua");
        let config = |labels: &[&str]| {
            let toml = labels
                .iter()
                .map(|l| format!("[[workload]]\nlabel = \"{l}\"\nurl = \"http://h/\"\nscript = \"a.lua\"\n"))
                .collect::<String>();
            BenchConfig::from_toml_str(&toml, dir.path())
        };

        assert!(matches!(
            config(&["a", "b", "a"]).unwrap_err(),
            ConfigError::DuplicateLabel(l) if l == "a"
        ));
        assert!(matches!(
            config(&["placements"]).unwrap_err(),
            ConfigError::ReservedLabel(_)
        ));
        assert!(matches!(
            config(&["../escape"]).unwrap_err(),
            ConfigError::InvalidLabel(_)
        ));
        assert!(matches!(config(&[]).unwrap_err(), ConfigError::NoWorkloads));
        assert!(config(&["a", "b"]).is_ok());
    }

    #[test]
    fn missing_script_is_invalid() {
        let dir = TempDir::new().unwrap();
        let err = BenchConfig::from_toml_str(
            "[[workload]]\nlabel = \"a\"\nurl = \"http://h/\"\nscript = \"missing.lua\"\n",
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Script { .. }));
    }

    #[test]
    fn select_workloads_keeps_config_order() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "a.lua");
        let mut config = BenchConfig::from_toml_str(
            &["x", "y", "z"]
                .iter()
                .map(|l| format!("[[workload]]\nlabel = \"{l}\"\nurl = \"http://h/\"\nscript = \"a.lua\"\n"))
                .collect::<String>(),
            dir.path(),
        )
        .unwrap();

        assert!(matches!(
            config.select_workloads(&["nope".to_string()]),
            Err(ConfigError::UnknownWorkload(_))
        ));
        config
            .select_workloads(&["z".to_string(), "x".to_string()])
            .unwrap();
        assert_eq!(
            config.workloads().iter().map(|w| w.label.as_str()).collect::<Vec<_>>(),
            vec!["x", "z"]
        );
    }

    #[test]
    fn relative_base_dir_gives_absolute_paths() {
        // cargo runs tests from the package root, which ships the example workload scripts
        let config = BenchConfig::from_toml_str(
            "[[workload]]\nlabel = \"a\"\nurl = \"http://h/\"\nscript = \"workloads/compose-post.lua\"\n",
            Path::new(""),
        )
        .unwrap();

        let cwd = std::env::current_dir().unwrap();
        let request = &config.workloads()[0].request;
        assert!(request.script.is_absolute());
        assert_eq!(request.script, cwd.join("workloads/compose-post.lua"));
        assert_eq!(config.run_root, cwd.join("runs"));
        assert_eq!(config.report, cwd.join("report.json"));
    }

    #[test]
    fn deselected_workloads_are_not_validated() {
        let dir = TempDir::new().unwrap();
        write_script(&dir, "b.lua");
        let path = dir.path().join("proving-ground.toml");
        std::fs::write(
            &path,
            r#"
            [[workload]]
            label = "a"
            url = "http://h/"
            script = "missing.lua"

            [[workload]]
            label = "b"
            url = "http://h/"
            script = "b.lua"
            "#,
        )
        .unwrap();

        assert!(matches!(
            BenchConfig::load(&path).unwrap_err(),
            ConfigError::Script { label, .. } if label == "a"
        ));
        let config = BenchConfig::load_selected(&path, &["b".to_string()]).unwrap();
        assert_eq!(
            config.workloads().iter().map(|w| w.label.as_str()).collect::<Vec<_>>(),
            vec!["b"]
        );
        assert!(matches!(
            BenchConfig::load_selected(&path, &["c".to_string()]).unwrap_err(),
            ConfigError::UnknownWorkload(_)
        ));
    }

    #[test]
    fn missing_config_file() {
        let err = BenchConfig::load(Path::new("/nonexistent/proving-ground.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
