use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// Label given to the orchestrator's control node.
pub const PRIMARY_LABEL: &str = "primary";
/// Prefix for every other node, followed by a 1-based index.
pub const SECONDARY_LABEL_PREFIX: &str = "secondary-";

/// The services running on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePlacement {
    pub label: String,
    pub services: BTreeSet<String>,
}

/// Mapping from normalized node label to the services running on that node.
///
/// Insertion order is kept and is the serialized order. Nodes with nothing running are still
/// present with an empty set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlacementMap {
    nodes: Vec<NodePlacement>,
}

impl PlacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label for the `index`th secondary node, 1-based.
    pub fn secondary_label(index: usize) -> String {
        format!("{SECONDARY_LABEL_PREFIX}{index}")
    }

    /// Add a node, or merge the services into it if the label is already present.
    pub fn insert<I, S>(&mut self, label: impl Into<String>, services: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let label = label.into();
        let services = services.into_iter().map(Into::into);
        match self.nodes.iter_mut().find(|n| n.label == label) {
            Some(node) => node.services.extend(services),
            None => self.nodes.push(NodePlacement {
                label,
                services: services.collect(),
            }),
        }
    }

    pub fn get(&self, label: &str) -> Option<&BTreeSet<String>> {
        self.nodes
            .iter()
            .find(|n| n.label == label)
            .map(|n| &n.services)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodePlacement> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Serialize for PlacementMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.nodes.len()))?;
        for node in &self.nodes {
            map.serialize_entry(&node.label, &node.services)?;
        }
        map.end()
    }
}

struct PlacementMapVisitor;

impl<'de> Visitor<'de> for PlacementMapVisitor {
    type Value = PlacementMap;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of node label to service names")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut placements = PlacementMap::new();
        while let Some((label, services)) = access.next_entry::<String, BTreeSet<String>>()? {
            placements.insert(label, services);
        }
        Ok(placements)
    }
}

impl<'de> Deserialize<'de> for PlacementMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(PlacementMapVisitor)
    }
}
