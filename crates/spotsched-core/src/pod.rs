use crate::error::{CoreError, Result};
use crate::labels::LabelSchema;
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workload role of a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodRole {
    /// Long-lived coordinating workload
    Driver,
    /// Disposable parallel worker
    Executor,
    Other,
}

impl PodRole {
    pub fn from_label(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("driver") => PodRole::Driver,
            Some("executor") => PodRole::Executor,
            _ => PodRole::Other,
        }
    }

    pub fn is_driver(&self) -> bool {
        *self == PodRole::Driver
    }
}

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// A pod without a reported phase has just been created and is pending
    pub fn from_status(phase: Option<&str>) -> Self {
        match phase {
            None | Some("") | Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            Some(_) => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// Read-only scheduling view of a pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedPod {
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
    /// `spec.schedulerName`
    pub scheduler_name: Option<String>,
    pub role: PodRole,
    pub phase: PodPhase,
    /// `spec.nodeName`, set once the pod is bound
    pub node_name: Option<String>,
}

impl SchedPod {
    /// Parse a Kubernetes pod into its scheduling view
    pub fn from_k8s(pod: &Pod, schema: &LabelSchema) -> Result<Self> {
        let name = pod
            .metadata
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CoreError::malformed_object("Pod", "metadata.name is missing"))?;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());

        let role = PodRole::from_label(
            pod.metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(&schema.role))
                .map(String::as_str),
        );

        let spec = pod.spec.as_ref();

        Ok(Self {
            name,
            namespace,
            uid: pod.metadata.uid.clone(),
            scheduler_name: spec.and_then(|s| s.scheduler_name.clone()),
            role,
            phase: PodPhase::from_status(pod.status.as_ref().and_then(|s| s.phase.as_deref())),
            node_name: spec.and_then(|s| s.node_name.clone()).filter(|n| !n.is_empty()),
        })
    }

    /// "namespace/name"
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Stable identity for de-duplication: uid when known, else namespace/name
    pub fn identity(&self) -> String {
        self.uid.clone().unwrap_or_else(|| self.key())
    }

    /// Whether this pod asks for the given scheduler and still awaits placement
    pub fn awaits_scheduler(&self, scheduler_name: &str) -> bool {
        self.phase == PodPhase::Pending
            && self.node_name.is_none()
            && self.scheduler_name.as_deref() == Some(scheduler_name)
    }
}
