use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use proving_ground_report_model::{PlacementMap, PRIMARY_LABEL};

use crate::{NodeInfo, Orchestrator, TaskInfo};

/// Capture which services are running on which node.
///
/// The control node is labelled `primary` and every other node `secondary-<n>`, numbered by the
/// ascending order of the orchestrator's node ids. When several nodes carry the control role the
/// leader is primary, or the first by id when there is no leader. Query failures never fail the
/// snapshot: a failed node query gives an empty map and a failed task query gives empty service
/// sets.
pub fn snapshot(orchestrator: &dyn Orchestrator) -> PlacementMap {
    let nodes = match orchestrator.nodes() {
        Ok(nodes) => nodes,
        Err(e) => {
            log::warn!(
                "[placement] Could not list {} nodes, placements will be empty: {e}",
                orchestrator.kind()
            );
            return PlacementMap::new();
        }
    };

    let tasks = match orchestrator.running_tasks() {
        Ok(tasks) => tasks,
        Err(e) => {
            log::warn!(
                "[placement] Could not list running {} tasks, services will be empty: {e}",
                orchestrator.kind()
            );
            Vec::new()
        }
    };

    let map = build_placement_map(nodes, tasks);
    log::info!(
        "[placement] {} nodes: {}",
        map.len(),
        map.iter()
            .map(|n| format!("{}={}", n.label, n.services.len()))
            .join(", ")
    );
    map
}

fn build_placement_map(nodes: Vec<NodeInfo>, tasks: Vec<TaskInfo>) -> PlacementMap {
    let mut nodes = nodes
        .into_iter()
        .unique_by(|n| n.id.clone())
        .sorted_by(|a, b| a.id.cmp(&b.id))
        .collect::<Vec<_>>();

    let primary = nodes
        .iter()
        .position(|n| n.control && n.leader)
        .or_else(|| nodes.iter().position(|n| n.control))
        .map(|i| nodes.remove(i));
    if primary.is_none() && !nodes.is_empty() {
        log::warn!("[placement] No control node reported, labelling every node as secondary");
    }

    let mut services: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let known = primary
        .iter()
        .chain(nodes.iter())
        .map(|n| n.id.as_str())
        .collect::<BTreeSet<_>>();
    for task in tasks {
        if !known.contains(task.node.as_str()) {
            log::debug!(
                "[placement] Ignoring {} running on unknown node {}",
                task.service,
                task.node
            );
            continue;
        }
        services.entry(task.node).or_default().insert(task.service);
    }

    let mut take = |id: &str| services.remove(id).unwrap_or_default();

    let mut map = PlacementMap::new();
    if let Some(primary) = &primary {
        map.insert(PRIMARY_LABEL, take(&primary.id));
    }
    for (i, node) in nodes.iter().enumerate() {
        map.insert(PlacementMap::secondary_label(i + 1), take(&node.id));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrchestratorError, OrchestratorKind};
    use pretty_assertions::assert_eq;

    fn node(id: &str, control: bool, leader: bool) -> NodeInfo {
        NodeInfo {
            id: id.to_string(),
            control,
            leader,
        }
    }

    fn task(node: &str, service: &str) -> TaskInfo {
        TaskInfo {
            node: node.to_string(),
            service: service.to_string(),
        }
    }

    struct Fixed {
        nodes: Option<Vec<NodeInfo>>,
        tasks: Option<Vec<TaskInfo>>,
    }

    impl Orchestrator for Fixed {
        fn kind(&self) -> OrchestratorKind {
            OrchestratorKind::Swarm
        }

        fn nodes(&self) -> Result<Vec<NodeInfo>, OrchestratorError> {
            self.nodes.clone().ok_or_else(|| OrchestratorError::Parse {
                command: "docker node ls".to_string(),
                reason: "boom".to_string(),
            })
        }

        fn running_tasks(&self) -> Result<Vec<TaskInfo>, OrchestratorError> {
            self.tasks.clone().ok_or_else(|| OrchestratorError::Parse {
                command: "docker service ls".to_string(),
                reason: "boom".to_string(),
            })
        }
    }

    fn services(map: &PlacementMap, label: &str) -> Vec<String> {
        map.get(label)
            .unwrap_or_else(|| panic!("missing {label}"))
            .iter()
            .cloned()
            .collect()
    }

    #[test]
    fn control_node_and_two_workers_one_idle() {
        let map = snapshot(&Fixed {
            nodes: Some(vec![
                node("worker-b", false, false),
                node("manager", true, true),
                node("worker-a", false, false),
            ]),
            tasks: Some(vec![
                task("worker-a", "nginx"),
                task("manager", "mongodb"),
                task("worker-a", "memcached"),
                task("worker-a", "nginx"),
            ]),
        });

        assert_eq!(
            map.iter().map(|n| n.label.as_str()).collect::<Vec<_>>(),
            vec!["primary", "secondary-1", "secondary-2"]
        );
        assert_eq!(services(&map, "primary"), vec!["mongodb"]);
        assert_eq!(services(&map, "secondary-1"), vec!["memcached", "nginx"]);
        assert!(services(&map, "secondary-2").is_empty());
        assert_eq!(
            serde_json::to_string(&map).unwrap(),
            r#"{"primary":["mongodb"],"secondary-1":["memcached","nginx"],"secondary-2":[]}"#
        );
    }

    #[test]
    fn leader_wins_among_several_managers() {
        let map = build_placement_map(
            vec![
                node("m-a", true, false),
                node("m-b", true, true),
                node("w", false, false),
            ],
            vec![task("m-b", "db"), task("m-a", "cache")],
        );

        assert_eq!(services(&map, "primary"), vec!["db"]);
        // remaining manager sorts before the worker
        assert_eq!(services(&map, "secondary-1"), vec!["cache"]);
        assert!(services(&map, "secondary-2").is_empty());
    }

    #[test]
    fn first_control_node_without_leader() {
        let map = build_placement_map(
            vec![node("cp-2", true, false), node("cp-1", true, false)],
            vec![task("cp-1", "api")],
        );

        assert_eq!(services(&map, "primary"), vec!["api"]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn no_control_node_gives_only_secondaries() {
        let map = build_placement_map(vec![node("b", false, false), node("a", false, false)], vec![]);

        assert!(map.get("primary").is_none());
        assert_eq!(
            map.iter().map(|n| n.label.as_str()).collect::<Vec<_>>(),
            vec!["secondary-1", "secondary-2"]
        );
    }

    #[test]
    fn tasks_on_unknown_nodes_are_ignored() {
        let map = build_placement_map(
            vec![node("m", true, true)],
            vec![task("gone", "nginx"), task("m", "db")],
        );

        assert_eq!(map.len(), 1);
        assert_eq!(services(&map, "primary"), vec!["db"]);
    }

    #[test]
    fn node_query_failure_gives_empty_map() {
        let map = snapshot(&Fixed {
            nodes: None,
            tasks: Some(vec![task("m", "db")]),
        });
        assert!(map.is_empty());
    }

    #[test]
    fn task_query_failure_gives_empty_services() {
        let map = snapshot(&Fixed {
            nodes: Some(vec![node("m", true, true), node("w", false, false)]),
            tasks: None,
        });

        assert_eq!(map.len(), 2);
        assert!(map.iter().all(|n| n.services.is_empty()));
    }
}
