use crate::error::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use k8s_openapi::api::core::v1::{Node, Pod};
use spotsched_core::WatchEvent;

/// Stream of pod watch events. A `WatchFailed` item ends the subscription;
/// any other error item concerns a single event.
pub type PodEventStream = BoxStream<'static, Result<WatchEvent<Pod>>>;

/// The slice of the cluster object store the scheduler consumes
///
/// Binding creation is the only mutating call.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List all nodes
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Read a single pod
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Open a watch on pods in a namespace
    async fn watch_pods(&self, namespace: &str) -> Result<PodEventStream>;

    /// Bind a pod to a node. A rejection caused by cluster state (pod
    /// already bound, pod or node gone) is `BindConflict`.
    async fn create_binding(&self, namespace: &str, pod_name: &str, node_name: &str)
        -> Result<()>;
}
