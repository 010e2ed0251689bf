//! Spotsched Core - Typed scheduling views over Kubernetes objects
//!
//! This crate provides:
//! - Label schema for spot class, instance metadata and pod role
//! - Node and pod views parsed once per snapshot (`SchedNode`, `SchedPod`)
//! - Watch event envelope
//! - Error types with miette diagnostics

pub mod error;
pub mod events;
pub mod labels;
pub mod node;
pub mod pod;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use events::{WatchEvent, WatchEventType};
pub use labels::LabelSchema;
pub use node::{is_node_ready, InstanceMetadata, NodeClass, SchedNode};
pub use pod::{PodPhase, PodRole, SchedPod};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Binding, Node, ObjectReference, Pod};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Deserialize a resource from JSON
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}
