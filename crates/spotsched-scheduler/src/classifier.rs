use crate::cluster::ClusterClient;
use crate::error::Result;
use crate::types::ClassifiedNodes;
use spotsched_core::{LabelSchema, SchedNode};
use std::sync::Arc;
use tracing::debug;

/// Partitions the current ready nodes into spot and persistent classes
pub struct NodeClassifier {
    cluster: Arc<dyn ClusterClient>,
    schema: LabelSchema,
}

impl NodeClassifier {
    pub fn new(cluster: Arc<dyn ClusterClient>, schema: LabelSchema) -> Self {
        Self { cluster, schema }
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    /// Fetch and classify the node list once.
    ///
    /// A failed or malformed listing is an error, never an empty snapshot.
    pub async fn snapshot(&self) -> Result<ClassifiedNodes> {
        let nodes = self.cluster.list_nodes().await?;

        let parsed = nodes
            .iter()
            .map(|n| SchedNode::from_k8s(n, &self.schema))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let classified = ClassifiedNodes::from_nodes(parsed);
        debug!(
            "Node snapshot: {} spot, {} persistent, {} not ready",
            classified.spot().len(),
            classified.persistent().len(),
            classified.not_ready()
        );
        Ok(classified)
    }

    /// All ready nodes
    pub async fn ready_nodes(&self) -> Result<Vec<SchedNode>> {
        Ok(self.snapshot().await?.ready().cloned().collect())
    }

    /// Ready spot nodes
    pub async fn spot_nodes(&self) -> Result<Vec<SchedNode>> {
        Ok(self.snapshot().await?.spot().to_vec())
    }

    /// Ready persistent nodes
    pub async fn persistent_nodes(&self) -> Result<Vec<SchedNode>> {
        Ok(self.snapshot().await?.persistent().to_vec())
    }
}
