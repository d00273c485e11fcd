//! Placement queries against the cluster orchestrator hosting the system under test.
//!
//! An [Orchestrator] reports the cluster's nodes and the service tasks currently running on them.
//! [snapshot] turns that into a [PlacementMap](proving_ground_report_model::PlacementMap) with
//! normalized node labels.

mod command;
mod kubernetes;
mod snapshot;
mod swarm;

use serde::Deserialize;

pub use command::require_tool;
pub use kubernetes::{Kubernetes, DEFAULT_SERVICE_LABEL, PG_KUBECTL_PATH_ENV};
pub use snapshot::snapshot;
pub use swarm::{Swarm, PG_DOCKER_PATH_ENV};

/// A cluster node as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// The orchestrator's own identifier for the node, such as its hostname.
    pub id: String,
    /// Whether the node carries the control-plane role.
    pub control: bool,
    /// Whether the orchestrator reports this node as the current leader of the control plane.
    pub leader: bool,
}

/// A running instance of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub node: String,
    pub service: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("Could not parse the output of `{command}`: {reason}")]
    Parse { command: String, reason: String },
    #[error("`{tool}` not found, install it or set {env} to its path")]
    MissingTool { tool: String, env: String },
}

/// Read access to the orchestrator's view of the cluster.
pub trait Orchestrator {
    fn kind(&self) -> OrchestratorKind;

    fn nodes(&self) -> Result<Vec<NodeInfo>, OrchestratorError>;

    fn running_tasks(&self) -> Result<Vec<TaskInfo>, OrchestratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorKind {
    #[default]
    #[display("swarm")]
    Swarm,
    #[display("kubernetes")]
    Kubernetes,
    /// No orchestrator, the report carries an empty placement map.
    #[display("none")]
    None,
}
