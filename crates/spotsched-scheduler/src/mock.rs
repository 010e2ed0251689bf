use crate::cluster::{ClusterClient, PodEventStream};
use crate::error::{Result, SchedulerError};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use k8s_openapi::api::core::v1::{Node, Pod};
use spotsched_core::WatchEvent;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A binding accepted by the mock cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRecord {
    pub namespace: String,
    pub pod_name: String,
    pub node_name: String,
}

/// One scripted answer to `watch_pods`
enum WatchScript {
    Events(Vec<Result<WatchEvent<Pod>>>),
    Refuse,
}

/// In-memory cluster for testing
///
/// Holds nodes and pods, applies bindings the way the API server does
/// (rejecting pods that are already bound or nodes that do not exist) and
/// replays scripted watch streams. Once the scripts run out, a watch stays
/// open without events.
#[derive(Default)]
pub struct MockCluster {
    nodes: Arc<RwLock<Vec<Node>>>,
    pods: Arc<RwLock<HashMap<String, Pod>>>,
    bindings: Arc<RwLock<Vec<BindingRecord>>>,
    watches: Arc<RwLock<VecDeque<WatchScript>>>,
    nodes_unavailable: AtomicBool,
    binding_attempts: AtomicUsize,
    watch_calls: AtomicUsize,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_node(&self, node: Node) {
        self.nodes.write().await.push(node);
    }

    pub async fn add_pod(&self, pod: Pod) {
        let key = pod_key(&pod);
        self.pods.write().await.insert(key, pod);
    }

    /// Queue a watch stream that yields these events and then closes.
    /// The pods are also stored so that `get_pod` can find them.
    pub async fn push_watch(&self, events: Vec<WatchEvent<Pod>>) {
        for event in &events {
            let key = pod_key(&event.object);
            self.pods
                .write()
                .await
                .entry(key)
                .or_insert_with(|| event.object.clone());
        }
        self.watches
            .write()
            .await
            .push_back(WatchScript::Events(events.into_iter().map(Ok).collect()));
    }

    /// Queue a watch stream that yields raw items, errors included
    pub async fn push_watch_items(&self, items: Vec<Result<WatchEvent<Pod>>>) {
        self.watches
            .write()
            .await
            .push_back(WatchScript::Events(items));
    }

    /// Queue a refused watch request
    pub async fn push_watch_refusal(&self) {
        self.watches.write().await.push_back(WatchScript::Refuse);
    }

    /// Make node listing fail with `SourceUnavailable`
    pub fn set_nodes_unavailable(&self, unavailable: bool) {
        self.nodes_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn bindings(&self) -> Vec<BindingRecord> {
        self.bindings.read().await.clone()
    }

    pub fn binding_attempts(&self) -> usize {
        self.binding_attempts.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        if self.nodes_unavailable.load(Ordering::SeqCst) {
            return Err(SchedulerError::source_unavailable("mock node list is offline"));
        }
        Ok(self.nodes.read().await.clone())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pods
            .read()
            .await
            .get(&format!("{}/{}", namespace, name))
            .cloned()
            .ok_or_else(|| {
                SchedulerError::source_unavailable(format!("pod {}/{} not found", namespace, name))
            })
    }

    async fn watch_pods(&self, namespace: &str) -> Result<PodEventStream> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        debug!("Mock: watch opened for namespace {}", namespace);

        match self.watches.write().await.pop_front() {
            Some(WatchScript::Events(items)) => Ok(stream::iter(items).boxed()),
            Some(WatchScript::Refuse) => Err(SchedulerError::source_unavailable(
                "mock watch refused",
            )),
            None => Ok(stream::pending::<Result<WatchEvent<Pod>>>().boxed()),
        }
    }

    async fn create_binding(
        &self,
        namespace: &str,
        pod_name: &str,
        node_name: &str,
    ) -> Result<()> {
        self.binding_attempts.fetch_add(1, Ordering::SeqCst);
        let key = format!("{}/{}", namespace, pod_name);

        let node_exists = self
            .nodes
            .read()
            .await
            .iter()
            .any(|n| n.metadata.name.as_deref() == Some(node_name));
        if !node_exists {
            return Err(SchedulerError::bind_conflict(
                &key,
                node_name,
                format!("node {} not found", node_name),
            ));
        }

        let mut pods = self.pods.write().await;
        let pod = pods.get_mut(&key).ok_or_else(|| {
            SchedulerError::bind_conflict(&key, node_name, format!("pod {} not found", key))
        })?;

        let spec = pod.spec.get_or_insert_with(Default::default);
        if let Some(existing) = &spec.node_name {
            return Err(SchedulerError::bind_conflict(
                &key,
                node_name,
                format!("pod is already assigned to node {}", existing),
            ));
        }
        spec.node_name = Some(node_name.to_string());

        self.bindings.write().await.push(BindingRecord {
            namespace: namespace.to_string(),
            pod_name: pod_name.to_string(),
            node_name: node_name.to_string(),
        });
        debug!("Mock: bound {} to {}", key, node_name);
        Ok(())
    }
}

fn pod_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or("default"),
        pod.metadata.name.as_deref().unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_node(name: &str) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node
    }

    fn named_pod(name: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod
    }

    #[tokio::test]
    async fn test_binding_rules() {
        let cluster = MockCluster::new();
        cluster.add_node(named_node("n1")).await;
        cluster.add_pod(named_pod("p1")).await;

        cluster.create_binding("default", "p1", "n1").await.unwrap();
        let pod = cluster.get_pod("default", "p1").await.unwrap();
        assert_eq!(pod.spec.unwrap().node_name.as_deref(), Some("n1"));

        let again = cluster.create_binding("default", "p1", "n1").await;
        assert!(matches!(again, Err(SchedulerError::BindConflict { .. })));

        let missing_node = cluster.create_binding("default", "p1", "n9").await;
        assert!(matches!(missing_node, Err(SchedulerError::BindConflict { .. })));

        assert_eq!(cluster.bindings().await.len(), 1);
        assert_eq!(cluster.binding_attempts(), 3);
    }

    #[tokio::test]
    async fn test_scripted_watches() {
        let cluster = MockCluster::new();
        cluster.push_watch_refusal().await;
        cluster
            .push_watch(vec![WatchEvent::added(named_pod("p1"))])
            .await;

        assert!(cluster.watch_pods("default").await.is_err());
        let events: Vec<_> = cluster.watch_pods("default").await.unwrap().collect().await;
        assert_eq!(events.len(), 1);
        assert!(cluster.get_pod("default", "p1").await.is_ok());
        assert_eq!(cluster.watch_calls(), 2);
    }
}
