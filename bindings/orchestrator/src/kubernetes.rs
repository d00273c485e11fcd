use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::command::{describe, output, require_tool};
use crate::{NodeInfo, Orchestrator, OrchestratorError, OrchestratorKind, TaskInfo};

/// Environment variable that overrides the path to the `kubectl` binary.
pub const PG_KUBECTL_PATH_ENV: &str = "PG_KUBECTL_PATH";

/// Pod label holding the service name when none is configured.
pub const DEFAULT_SERVICE_LABEL: &str = "app";

const CONTROL_PLANE_LABELS: &[&str] = &[
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// A Kubernetes cluster, queried through `kubectl`.
#[derive(Debug, Clone)]
pub struct Kubernetes {
    kubectl: PathBuf,
    namespace: String,
    service_label: String,
}

impl Kubernetes {
    pub fn new(kubectl: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            kubectl: kubectl.into(),
            namespace: namespace.into(),
            service_label: DEFAULT_SERVICE_LABEL.to_string(),
        }
    }

    /// Locate `kubectl` on the path or through `PG_KUBECTL_PATH`.
    pub fn from_env(namespace: impl Into<String>) -> Result<Self, OrchestratorError> {
        Ok(Self::new(
            require_tool("kubectl", PG_KUBECTL_PATH_ENV)?,
            namespace,
        ))
    }

    /// The pod label whose value names the service a pod belongs to.
    pub fn with_service_label(mut self, label: impl Into<String>) -> Self {
        self.service_label = label.into();
        self
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, args: &[&str]) -> Result<T, OrchestratorError> {
        let out = output(&self.kubectl, args)?;
        serde_json::from_str(&out).map_err(|e| OrchestratorError::Parse {
            command: describe(&self.kubectl, args),
            reason: e.to_string(),
        })
    }
}

impl Orchestrator for Kubernetes {
    fn kind(&self) -> OrchestratorKind {
        OrchestratorKind::Kubernetes
    }

    fn nodes(&self) -> Result<Vec<NodeInfo>, OrchestratorError> {
        let list: List<Node> = self.get_json(&["get", "nodes", "-o", "json"])?;
        Ok(list.items.into_iter().map(Node::into_info).collect())
    }

    fn running_tasks(&self) -> Result<Vec<TaskInfo>, OrchestratorError> {
        let list: List<Pod> = self.get_json(&[
            "get",
            "pods",
            "-n",
            &self.namespace,
            "--field-selector=status.phase=Running",
            "-o",
            "json",
        ])?;
        Ok(pods_to_tasks(list, &self.service_label))
    }
}

#[derive(Debug, Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Node {
    metadata: Metadata,
}

impl Node {
    fn into_info(self) -> NodeInfo {
        let control = CONTROL_PLANE_LABELS
            .iter()
            .any(|l| self.metadata.labels.contains_key(*l));
        NodeInfo {
            id: self.metadata.name,
            control,
            // Kubernetes has no single leader node
            leader: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    spec: PodSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpec {
    node_name: Option<String>,
}

fn pods_to_tasks(list: List<Pod>, service_label: &str) -> Vec<TaskInfo> {
    list.items
        .into_iter()
        .filter_map(|pod| {
            let Some(node) = pod.spec.node_name.filter(|n| !n.is_empty()) else {
                log::debug!("[placement] Pod {} is not scheduled to a node", pod.metadata.name);
                return None;
            };
            let service = pod
                .metadata
                .labels
                .get(service_label)
                .cloned()
                .unwrap_or(pod.metadata.name);
            Some(TaskInfo { node, service })
        })
        .collect()
}
