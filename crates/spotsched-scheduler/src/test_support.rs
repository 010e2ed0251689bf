//! Builders shared by the unit tests

use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeStatus, Pod, PodSpec, PodStatus};
use spotsched_core::labels::{
    DEFAULT_INSTANCE_TYPE_LABEL, DEFAULT_REGION_LABEL, DEFAULT_ROLE_LABEL, DEFAULT_SPOT_LABEL,
    DEFAULT_ZONE_LABEL,
};
use spotsched_core::{InstanceMetadata, NodeClass, SchedNode, SchedPod};
use std::collections::BTreeMap;

pub const TEST_REGION: &str = "us-east-1";
pub const TEST_SCHEDULER: &str = "spot-scheduler";

pub fn make_node(
    name: &str,
    spot: Option<&str>,
    ready: bool,
    instance_type: &str,
    zone: &str,
) -> Node {
    let mut labels = BTreeMap::new();
    if let Some(value) = spot {
        labels.insert(DEFAULT_SPOT_LABEL.to_string(), value.to_string());
    }
    labels.insert(DEFAULT_INSTANCE_TYPE_LABEL.to_string(), instance_type.to_string());
    labels.insert(DEFAULT_REGION_LABEL.to_string(), TEST_REGION.to_string());
    labels.insert(DEFAULT_ZONE_LABEL.to_string(), zone.to_string());

    let mut node = Node::default();
    node.metadata.name = Some(name.to_string());
    node.metadata.labels = Some(labels);
    node.status = Some(NodeStatus {
        conditions: Some(vec![NodeCondition {
            type_: "Ready".to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    });
    node
}

pub fn make_pod(name: &str, role: Option<&str>, scheduler_name: &str) -> Pod {
    let mut pod = Pod::default();
    pod.metadata.name = Some(name.to_string());
    pod.metadata.namespace = Some("default".to_string());
    pod.metadata.uid = Some(format!("uid-{}", name));
    if let Some(role) = role {
        let mut labels = BTreeMap::new();
        labels.insert(DEFAULT_ROLE_LABEL.to_string(), role.to_string());
        pod.metadata.labels = Some(labels);
    }
    pod.spec = Some(PodSpec {
        scheduler_name: Some(scheduler_name.to_string()),
        ..Default::default()
    });
    pod.status = Some(PodStatus {
        phase: Some("Pending".to_string()),
        ..Default::default()
    });
    pod
}

pub fn sched_node(name: &str, class: NodeClass, instance_type: Option<&str>, zone: &str) -> SchedNode {
    SchedNode {
        name: name.to_string(),
        ready: true,
        class,
        instance: InstanceMetadata {
            instance_type: instance_type.map(str::to_string),
            region: Some(TEST_REGION.to_string()),
            zone: Some(zone.to_string()),
        },
    }
}

pub fn sched_pod(name: &str, role: Option<&str>) -> SchedPod {
    let pod = make_pod(name, role, TEST_SCHEDULER);
    SchedPod::from_k8s(&pod, &Default::default()).expect("test pod is well formed")
}
