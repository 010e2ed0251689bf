use spotsched_core::{NodeClass, SchedNode};

/// Ready nodes of one snapshot, partitioned by class
///
/// Every ready node is in exactly one of `spot` and `persistent`.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedNodes {
    spot: Vec<SchedNode>,
    persistent: Vec<SchedNode>,
    not_ready: usize,
}

impl ClassifiedNodes {
    /// Drop nodes that are not ready and partition the rest
    pub fn from_nodes(nodes: impl IntoIterator<Item = SchedNode>) -> Self {
        let mut classified = Self::default();
        for node in nodes {
            if !node.ready {
                classified.not_ready += 1;
                continue;
            }
            match node.class {
                NodeClass::Spot => classified.spot.push(node),
                NodeClass::Persistent => classified.persistent.push(node),
            }
        }
        classified
    }

    pub fn spot(&self) -> &[SchedNode] {
        &self.spot
    }

    pub fn persistent(&self) -> &[SchedNode] {
        &self.persistent
    }

    pub fn of_class(&self, class: NodeClass) -> &[SchedNode] {
        match class {
            NodeClass::Spot => &self.spot,
            NodeClass::Persistent => &self.persistent,
        }
    }

    /// All ready nodes, spot first
    pub fn ready(&self) -> impl Iterator<Item = &SchedNode> {
        self.spot.iter().chain(self.persistent.iter())
    }

    /// Number of nodes dropped because they were not ready
    pub fn not_ready(&self) -> usize {
        self.not_ready
    }
}

/// How a binding was committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The binding was created by this call
    Bound,
    /// The pod was already bound to the requested node by an earlier attempt
    AlreadyBound,
}

/// A committed placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// "namespace/name" of the pod
    pub pod: String,
    pub node: String,
    pub class: NodeClass,
    pub outcome: BindOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotsched_core::InstanceMetadata;

    fn node(name: &str, ready: bool, class: NodeClass) -> SchedNode {
        SchedNode {
            name: name.to_string(),
            ready,
            class,
            instance: InstanceMetadata::default(),
        }
    }

    #[test]
    fn test_partition_is_exhaustive_and_disjoint() {
        let nodes = vec![
            node("s1", true, NodeClass::Spot),
            node("s2", false, NodeClass::Spot),
            node("p1", true, NodeClass::Persistent),
            node("p2", true, NodeClass::Persistent),
            node("p3", false, NodeClass::Persistent),
        ];
        let classified = ClassifiedNodes::from_nodes(nodes.clone());

        let ready: Vec<&str> = nodes
            .iter()
            .filter(|n| n.ready)
            .map(|n| n.name.as_str())
            .collect();

        for name in &ready {
            let in_spot = classified.spot().iter().any(|n| n.name == *name);
            let in_persistent = classified.persistent().iter().any(|n| n.name == *name);
            assert!(in_spot ^ in_persistent, "{} must be in exactly one class", name);
        }
        assert_eq!(classified.ready().count(), ready.len());
        assert_eq!(classified.not_ready(), 2);
        assert_eq!(classified.of_class(NodeClass::Spot).len(), 1);
    }
}
