use crate::error::{CoreError, Result};
use crate::labels::LabelSchema;
use k8s_openapi::api::core::v1::Node;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Capacity class of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    /// Preemptible, price-variable capacity
    Spot,
    /// Stable, non-preemptible capacity
    Persistent,
}

impl NodeClass {
    /// Derive the class from the spot label value.
    ///
    /// A missing label or a false-valued label means persistent.
    pub fn from_label(value: Option<&str>) -> Self {
        let Some(raw) = value else {
            return NodeClass::Persistent;
        };

        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => NodeClass::Spot,
            "false" | "no" | "0" | "" => NodeClass::Persistent,
            other => {
                warn!(
                    "Unrecognized spot label value '{}', treating node as persistent",
                    other
                );
                NodeClass::Persistent
            }
        }
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeClass::Spot => write!(f, "spot"),
            NodeClass::Persistent => write!(f, "persistent"),
        }
    }
}

/// Cloud instance metadata read from node labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub instance_type: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
}

/// Read-only scheduling view of a node, parsed once per snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedNode {
    pub name: String,
    pub ready: bool,
    pub class: NodeClass,
    pub instance: InstanceMetadata,
}

impl SchedNode {
    /// Parse a Kubernetes node into its scheduling view
    pub fn from_k8s(node: &Node, schema: &LabelSchema) -> Result<Self> {
        let name = node
            .metadata
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CoreError::malformed_object("Node", "metadata.name is missing"))?;

        let labels = node.metadata.labels.as_ref();
        let label = |key: &str| labels.and_then(|l| l.get(key)).map(String::as_str);

        Ok(Self {
            ready: is_node_ready(node),
            class: NodeClass::from_label(label(&schema.spot)),
            instance: InstanceMetadata {
                instance_type: label(&schema.instance_type).map(str::to_string),
                region: label(&schema.region).map(str::to_string),
                zone: label(&schema.zone).map(str::to_string),
            },
            name,
        })
    }

    pub fn is_spot(&self) -> bool {
        self.class == NodeClass::Spot
    }
}

/// A node is ready iff it has a "Ready" condition with status "True"
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}
