use crate::error::{Result, SchedulerError};
use crate::types::ClassifiedNodes;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use spotsched_core::{NodeClass, SchedNode, SchedPod};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::debug;

/// Placement policy trait
#[async_trait]
pub trait PlacementPolicy: Send + Sync {
    /// Choose a node for the pod from a classified snapshot
    async fn select(&self, pod: &SchedPod, nodes: &ClassifiedNodes) -> Result<SchedNode>;

    /// Name of the policy
    fn name(&self) -> &str;
}

/// Which placement policy a scheduler runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    /// Uniform random choice within the candidate class
    #[default]
    Random,
    /// Spot nodes in the zone whose price stayed below the bid the longest
    LeastVolatile,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Random => "random",
            PolicyKind::LeastVolatile => "least-volatile",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(PolicyKind::Random),
            "least-volatile" | "least_volatile" => Ok(PolicyKind::LeastVolatile),
            other => Err(SchedulerError::invalid_input(
                format!("Unknown policy '{}'", other),
                "Use 'random' or 'least-volatile'",
            )),
        }
    }
}

/// Drivers go to persistent capacity, everything else to spot
pub fn candidate_class(pod: &SchedPod) -> NodeClass {
    if pod.role.is_driver() {
        NodeClass::Persistent
    } else {
        NodeClass::Spot
    }
}

/// Candidate nodes for the pod. An empty candidate set is an error and never
/// falls back to the other class.
pub fn candidates<'a>(pod: &SchedPod, nodes: &'a ClassifiedNodes) -> Result<&'a [SchedNode]> {
    let class = candidate_class(pod);
    let found = nodes.of_class(class);
    if found.is_empty() {
        return Err(SchedulerError::no_candidate_nodes(pod.key(), class));
    }
    debug!(
        "Pod {} ({:?}) has {} {} candidates",
        pod.key(),
        pod.role,
        found.len(),
        class
    );
    Ok(found)
}

/// Random source owned by a policy. The lock is never held across an await.
pub(crate) struct PolicyRng(Mutex<StdRng>);

impl PolicyRng {
    pub(crate) fn from_entropy() -> Self {
        Self(Mutex::new(StdRng::from_entropy()))
    }

    pub(crate) fn seeded(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }

    /// Uniform choice from a non-empty slice
    pub(crate) fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        let mut rng = self.0.lock().unwrap_or_else(|e| e.into_inner());
        items.choose(&mut *rng)
    }
}

/// Uniform random placement within the candidate class
pub struct SpotPreferringRandom {
    rng: PolicyRng,
}

impl SpotPreferringRandom {
    pub fn new() -> Self {
        Self {
            rng: PolicyRng::from_entropy(),
        }
    }

    /// Deterministic choices, for tests and reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: PolicyRng::seeded(seed),
        }
    }
}

impl Default for SpotPreferringRandom {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlacementPolicy for SpotPreferringRandom {
    async fn select(&self, pod: &SchedPod, nodes: &ClassifiedNodes) -> Result<SchedNode> {
        let found = candidates(pod, nodes)?;
        self.rng
            .choose(found)
            .cloned()
            .ok_or_else(|| SchedulerError::internal_error("candidate set emptied during selection"))
    }

    fn name(&self) -> &str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sched_node, sched_pod};
    use std::collections::HashSet;

    fn cluster() -> ClassifiedNodes {
        ClassifiedNodes::from_nodes(vec![
            sched_node("spot-1", NodeClass::Spot, Some("c3.large"), "us-east-1a"),
            sched_node("spot-2", NodeClass::Spot, Some("c3.large"), "us-east-1b"),
            sched_node("od-1", NodeClass::Persistent, Some("m4.large"), "us-east-1a"),
            sched_node("od-2", NodeClass::Persistent, Some("m4.large"), "us-east-1b"),
        ])
    }

    #[tokio::test]
    async fn test_drivers_only_land_on_persistent_nodes() {
        let nodes = cluster();
        let driver = sched_pod("driver-0", Some("driver"));

        for seed in 0..50 {
            let policy = SpotPreferringRandom::with_seed(seed);
            let chosen = policy.select(&driver, &nodes).await.unwrap();
            assert_eq!(chosen.class, NodeClass::Persistent);
        }
    }

    #[tokio::test]
    async fn test_non_drivers_only_land_on_spot_nodes() {
        let nodes = cluster();
        let executor = sched_pod("exec-0", Some("executor"));
        let unlabeled = sched_pod("plain", None);
        let policy = SpotPreferringRandom::with_seed(7);

        let mut seen = HashSet::new();
        for _ in 0..100 {
            for pod in [&executor, &unlabeled] {
                let chosen = policy.select(pod, &nodes).await.unwrap();
                assert!(chosen.is_spot());
                seen.insert(chosen.name);
            }
        }
        assert_eq!(seen.len(), 2, "both spot nodes should be reachable");
    }

    #[tokio::test]
    async fn test_empty_candidate_class_is_an_error() {
        let only_spot = ClassifiedNodes::from_nodes(vec![sched_node(
            "spot-1",
            NodeClass::Spot,
            Some("c3.large"),
            "us-east-1a",
        )]);
        let driver = sched_pod("driver-0", Some("driver"));

        let err = SpotPreferringRandom::new()
            .select(&driver, &only_spot)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::NoCandidateNodes { ref class, .. } if class == "persistent"
        ));

        let executor = sched_pod("exec-0", Some("executor"));
        let err = SpotPreferringRandom::new()
            .select(&executor, &ClassifiedNodes::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NoCandidateNodes { .. }));
    }

    #[test]
    fn test_policy_kind_parse() {
        assert_eq!("random".parse::<PolicyKind>().unwrap(), PolicyKind::Random);
        assert_eq!(
            "Least-Volatile".parse::<PolicyKind>().unwrap(),
            PolicyKind::LeastVolatile
        );
        assert!("cheapest".parse::<PolicyKind>().is_err());
        assert_eq!(PolicyKind::LeastVolatile.to_string(), "least-volatile");
    }
}
