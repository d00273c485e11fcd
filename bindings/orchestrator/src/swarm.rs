use std::path::PathBuf;

use crate::command::{output, require_tool};
use crate::{NodeInfo, Orchestrator, OrchestratorError, OrchestratorKind, TaskInfo};

/// Environment variable that overrides the path to the `docker` binary.
pub const PG_DOCKER_PATH_ENV: &str = "PG_DOCKER_PATH";

const NODE_LS_ARGS: &[&str] = &["node", "ls", "--format", "{{.Hostname}}\t{{.ManagerStatus}}"];
const SERVICE_LS_ARGS: &[&str] = &["service", "ls", "--format", "{{.Name}}"];

/// Docker Swarm, queried through the `docker` CLI on a manager node.
#[derive(Debug, Clone)]
pub struct Swarm {
    docker: PathBuf,
}

impl Swarm {
    pub fn new(docker: impl Into<PathBuf>) -> Self {
        Self {
            docker: docker.into(),
        }
    }

    /// Locate `docker` on the path or through `PG_DOCKER_PATH`.
    pub fn from_env() -> Result<Self, OrchestratorError> {
        Ok(Self::new(require_tool("docker", PG_DOCKER_PATH_ENV)?))
    }
}

impl Orchestrator for Swarm {
    fn kind(&self) -> OrchestratorKind {
        OrchestratorKind::Swarm
    }

    fn nodes(&self) -> Result<Vec<NodeInfo>, OrchestratorError> {
        Ok(parse_node_ls(&output(&self.docker, NODE_LS_ARGS)?))
    }

    fn running_tasks(&self) -> Result<Vec<TaskInfo>, OrchestratorError> {
        let services = output(&self.docker, SERVICE_LS_ARGS)?;

        let mut tasks = Vec::new();
        for service in services.lines().map(str::trim).filter(|s| !s.is_empty()) {
            let args = [
                "service",
                "ps",
                service,
                "--filter",
                "desired-state=running",
                "--format",
                "{{.Node}}\t{{.CurrentState}}",
            ];
            match output(&self.docker, &args) {
                Ok(ps) => tasks.extend(parse_service_ps(service, &ps)),
                Err(e) => log::warn!("[placement] Skipping service {service}: {e}"),
            }
        }

        Ok(tasks)
    }
}

/// Parse `docker node ls` output in the `<hostname>\t<manager status>` format.
///
/// Workers have an empty manager status, managers are `Leader`, `Reachable` or `Unreachable`.
fn parse_node_ls(out: &str) -> Vec<NodeInfo> {
    out.lines()
        .filter_map(|line| {
            let (hostname, status) = line.split_once('\t').unwrap_or((line, ""));
            let hostname = hostname.trim();
            if hostname.is_empty() {
                return None;
            }
            let status = status.trim();
            Some(NodeInfo {
                id: hostname.to_string(),
                control: !status.is_empty(),
                leader: status == "Leader",
            })
        })
        .collect()
}

/// Parse `docker service ps` output in the `<node>\t<current state>` format, keeping only tasks
/// that are actually running.
fn parse_service_ps(service: &str, out: &str) -> Vec<TaskInfo> {
    out.lines()
        .filter_map(|line| {
            let (node, state) = line.split_once('\t')?;
            let node = node.trim();
            if node.is_empty() || !state.trim_start().starts_with("Running") {
                return None;
            }
            Some(TaskInfo {
                node: node.to_string(),
                service: service.to_string(),
            })
        })
        .collect()
}
