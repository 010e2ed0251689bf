use crate::cluster::ClusterClient;
use crate::error::{Result, SchedulerError};
use crate::types::BindOutcome;
use spotsched_core::SchedPod;
use std::sync::Arc;
use tracing::{info, warn};

/// Commits placements by creating Binding objects
pub struct Binder {
    cluster: Arc<dyn ClusterClient>,
}

impl Binder {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    /// Bind the pod to the node.
    ///
    /// When the API server rejects the binding, the pod is read back: if it
    /// already sits on `node_name`, an earlier attempt went through and the
    /// result is `AlreadyBound`. Any other state is a `BindConflict`.
    pub async fn bind(&self, pod: &SchedPod, node_name: &str) -> Result<BindOutcome> {
        info!("Binding pod {} to node {}", pod.key(), node_name);

        let err = match self
            .cluster
            .create_binding(&pod.namespace, &pod.name, node_name)
            .await
        {
            Ok(()) => {
                info!("Successfully bound pod {} to node {}", pod.key(), node_name);
                return Ok(BindOutcome::Bound);
            }
            Err(err @ SchedulerError::BindConflict { .. }) => err,
            Err(err) => return Err(err),
        };

        match self.cluster.get_pod(&pod.namespace, &pod.name).await {
            Ok(current) => {
                let bound_to = current.spec.as_ref().and_then(|s| s.node_name.as_deref());
                if bound_to == Some(node_name) {
                    info!(
                        "Pod {} was already bound to node {}",
                        pod.key(),
                        node_name
                    );
                    return Ok(BindOutcome::AlreadyBound);
                }
                warn!(
                    "Pod {} is bound to {:?}, not {}",
                    pod.key(),
                    bound_to,
                    node_name
                );
            }
            Err(e) => warn!("Failed to re-read pod {} after conflict: {}", pod.key(), e),
        }
        Err(err)
    }
}
