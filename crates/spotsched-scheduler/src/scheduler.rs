use crate::binder::Binder;
use crate::classifier::NodeClassifier;
use crate::cluster::{ClusterClient, PodEventStream};
use crate::policy::PlacementPolicy;
use crate::types::Decision;
use crate::{Result, SchedulerError};
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use spotsched_core::{LabelSchema, SchedPod, WatchEvent, WatchEventType};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pods whose `spec.schedulerName` equals this are ours
    pub scheduler_name: String,
    /// Namespace to watch
    pub namespace: String,
    pub labels: LabelSchema,
    /// Upper bound on snapshot, selection and binding for one pod
    pub decision_timeout: Duration,
    /// Initial delay before reopening the watch
    pub reconnect_interval: Duration,
    /// Cap for the doubling reconnect delay
    pub max_reconnect_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_name: "spot-scheduler".to_string(),
            namespace: "default".to_string(),
            labels: LabelSchema::default(),
            decision_timeout: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_interval: Duration::from_secs(30),
        }
    }
}

/// Pods this scheduler has bound, by uid (or namespace/name without one).
/// An entry lives until an event shows the pod bound or deleted.
#[derive(Debug, Default)]
pub struct CommitLedger {
    committed: HashSet<String>,
}

impl CommitLedger {
    pub fn contains(&self, identity: &str) -> bool {
        self.committed.contains(identity)
    }

    pub fn insert(&mut self, identity: String) -> bool {
        self.committed.insert(identity)
    }

    pub fn remove(&mut self, identity: &str) -> bool {
        self.committed.remove(identity)
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }
}

/// Event-driven pod scheduler
pub struct Scheduler {
    cluster: Arc<dyn ClusterClient>,
    classifier: NodeClassifier,
    policy: Arc<dyn PlacementPolicy>,
    binder: Binder,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        policy: Arc<dyn PlacementPolicy>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            classifier: NodeClassifier::new(cluster.clone(), config.labels.clone()),
            binder: Binder::new(cluster.clone()),
            cluster,
            policy,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run the scheduler loop until the token is cancelled.
    ///
    /// The pod watch is reopened whenever it fails or ends, with a delay that
    /// doubles up to `max_reconnect_interval` and resets once a watch opens.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!(
            "Starting scheduler {} with policy {} in namespace {}",
            self.config.scheduler_name,
            self.policy.name(),
            self.config.namespace
        );

        let mut ledger = CommitLedger::default();
        let mut current_interval = self.config.reconnect_interval;

        loop {
            let opened = tokio::select! {
                _ = token.cancelled() => break,
                opened = self.cluster.watch_pods(&self.config.namespace) => opened,
            };

            match opened {
                Ok(stream) => {
                    current_interval = self.config.reconnect_interval;
                    info!("Watching pods in namespace {}", self.config.namespace);
                    if self.consume(stream, &mut ledger, &token).await {
                        break;
                    }
                }
                Err(e) => warn!("Failed to open pod watch: {}", e),
            }

            debug!(
                "Reopening pod watch in {}ms",
                current_interval.as_millis()
            );
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(current_interval) => {}
            }
            current_interval = std::cmp::min(
                current_interval.saturating_mul(2),
                self.config.max_reconnect_interval,
            );
        }

        info!("Scheduler {} stopped", self.config.scheduler_name);
        Ok(())
    }

    /// Drain one watch stream. Returns true when cancelled.
    async fn consume(
        &self,
        mut stream: PodEventStream,
        ledger: &mut CommitLedger,
        token: &CancellationToken,
    ) -> bool {
        loop {
            let item = tokio::select! {
                _ = token.cancelled() => return true,
                item = stream.next() => item,
            };

            match item {
                None => {
                    warn!("Pod watch ended");
                    return false;
                }
                Some(Err(SchedulerError::WatchFailed { message })) => {
                    warn!("Pod watch failed: {}", message);
                    return false;
                }
                Some(Err(e)) => warn!("Skipping watch event: {}", e),
                Some(Ok(event)) => match self.handle_event(event, ledger).await {
                    Ok(Some(decision)) => info!(
                        "Scheduled pod {} to {} node {} ({:?})",
                        decision.pod, decision.class, decision.node, decision.outcome
                    ),
                    Ok(None) => {}
                    Err(e @ SchedulerError::NoCandidateNodes { .. })
                    | Err(e @ SchedulerError::BindConflict { .. }) => warn!("{}", e),
                    Err(e) => error!("Failed to schedule pod: {}", e),
                },
            }
        }
    }

    /// Process one watch event. Returns the decision when a pod was bound.
    pub async fn handle_event(
        &self,
        event: WatchEvent<Pod>,
        ledger: &mut CommitLedger,
    ) -> Result<Option<Decision>> {
        match event.event_type {
            WatchEventType::Added | WatchEventType::Modified => {}
            WatchEventType::Deleted => {
                let pod = SchedPod::from_k8s(&event.object, &self.config.labels)?;
                if ledger.remove(&pod.identity()) {
                    debug!("Pod {} deleted, dropped from ledger", pod.key());
                }
                return Ok(None);
            }
            WatchEventType::Bookmark | WatchEventType::Error => return Ok(None),
        }

        let pod = SchedPod::from_k8s(&event.object, &self.config.labels)?;
        if pod.node_name.is_some() && ledger.remove(&pod.identity()) {
            debug!("Pod {} shows its binding, dropped from ledger", pod.key());
        }
        if !pod.awaits_scheduler(&self.config.scheduler_name) {
            debug!(
                "Ignoring pod {} (phase {}, node {:?}, scheduler {:?})",
                pod.key(),
                pod.phase,
                pod.node_name,
                pod.scheduler_name
            );
            return Ok(None);
        }
        if ledger.contains(&pod.identity()) {
            debug!("Pod {} was already bound by this scheduler", pod.key());
            return Ok(None);
        }

        let decision = self.schedule_pod(&pod).await?;
        ledger.insert(pod.identity());
        Ok(Some(decision))
    }

    /// Snapshot, select and bind a single pod within the decision timeout
    pub async fn schedule_pod(&self, pod: &SchedPod) -> Result<Decision> {
        let limit = self.config.decision_timeout;
        match tokio::time::timeout(limit, self.decide(pod)).await {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::decision_timeout(pod.key(), limit.as_secs())),
        }
    }

    async fn decide(&self, pod: &SchedPod) -> Result<Decision> {
        let nodes = self.classifier.snapshot().await?;
        let node = self.policy.select(pod, &nodes).await?;
        info!(
            "Selected {} node {} for pod {} using {}",
            node.class,
            node.name,
            pod.key(),
            self.policy.name()
        );

        let outcome = self.binder.bind(pod, &node.name).await?;
        Ok(Decision {
            pod: pod.key(),
            node: node.name,
            class: node.class,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::least_volatile::{LeastVolatileConfig, LeastVolatileSpot};
    use crate::mock::MockCluster;
    use crate::policy::SpotPreferringRandom;
    use crate::test_support::{make_node, make_pod, TEST_REGION, TEST_SCHEDULER};
    use crate::types::{BindOutcome, ClassifiedNodes};
    use async_trait::async_trait;
    use chrono::Utc;
    use spotsched_core::{NodeClass, SchedNode};
    use spotsched_market::{BidTable, ProductDescription, StaticPriceHistory, VolatilityOracle};

    fn test_config() -> SchedulerConfig {
        SchedulerConfig {
            reconnect_interval: Duration::from_millis(5),
            max_reconnect_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn least_volatile() -> Arc<dyn PlacementPolicy> {
        let now = Utc::now();
        let mut history = StaticPriceHistory::new(TEST_REGION, ProductDescription::LinuxUnix);
        history
            .push("c3.large", "us-east-1a", now - chrono::Duration::hours(3), 0.09)
            .push("c3.large", "us-east-1a", now - chrono::Duration::minutes(5), 0.2)
            .push("c3.large", "us-east-1b", now - chrono::Duration::hours(3), 0.08);
        let oracle = Arc::new(VolatilityOracle::new(Arc::new(history)));
        let bids = BidTable::parse_pairs("c3.large:0.105").unwrap();
        Arc::new(LeastVolatileSpot::new(oracle, bids, LeastVolatileConfig::default()).with_seed(42))
    }

    async fn spot_cluster() -> Arc<MockCluster> {
        let cluster = Arc::new(MockCluster::new());
        cluster
            .add_node(make_node("n1", Some("true"), true, "c3.large", "us-east-1a"))
            .await;
        cluster
            .add_node(make_node("n2", Some("true"), true, "c3.large", "us-east-1b"))
            .await;
        cluster
    }

    async fn wait_for_bindings(cluster: &MockCluster, count: usize) {
        for _ in 0..300 {
            if cluster.bindings().await.len() >= count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} bindings", count);
    }

    fn spawn(scheduler: Scheduler) -> (CancellationToken, tokio::task::JoinHandle<Result<()>>) {
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move { scheduler.run(child).await });
        (token, handle)
    }

    #[tokio::test]
    async fn test_pending_pod_goes_to_least_volatile_zone() {
        let cluster = spot_cluster().await;
        cluster
            .push_watch(vec![WatchEvent::added(make_pod("p1", None, TEST_SCHEDULER))])
            .await;

        let scheduler = Scheduler::new(cluster.clone(), least_volatile(), test_config());
        let (token, handle) = spawn(scheduler);

        wait_for_bindings(&cluster, 1).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        let bindings = cluster.bindings().await;
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].pod_name, "p1");
        assert_eq!(bindings[0].node_name, "n2");
    }

    #[tokio::test]
    async fn test_failed_pod_does_not_stop_the_loop() {
        let cluster = spot_cluster().await;
        cluster
            .push_watch(vec![
                WatchEvent::added(make_pod("driver", Some("driver"), TEST_SCHEDULER)),
                WatchEvent::added(make_pod("p2", Some("executor"), TEST_SCHEDULER)),
            ])
            .await;

        let policy = Arc::new(SpotPreferringRandom::with_seed(1));
        let scheduler = Scheduler::new(cluster.clone(), policy, test_config());
        let (token, handle) = spawn(scheduler);

        wait_for_bindings(&cluster, 1).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        let bindings = cluster.bindings().await;
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].pod_name, "p2");
        assert_eq!(cluster.binding_attempts(), 1);
    }

    #[tokio::test]
    async fn test_no_spot_nodes_means_no_binding_attempt() {
        let cluster = Arc::new(MockCluster::new());
        cluster
            .add_node(make_node("od-1", None, true, "m4.large", "us-east-1a"))
            .await;
        let pod = make_pod("p1", Some("executor"), TEST_SCHEDULER);
        cluster.add_pod(pod.clone()).await;

        let scheduler = Scheduler::new(cluster.clone(), least_volatile(), test_config());
        let mut ledger = CommitLedger::default();
        let err = scheduler
            .handle_event(WatchEvent::added(pod), &mut ledger)
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::NoCandidateNodes { .. }));
        assert_eq!(cluster.binding_attempts(), 0);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_reconnects_after_refusal_and_failure() {
        let cluster = spot_cluster().await;
        cluster.push_watch_refusal().await;
        cluster
            .push_watch_items(vec![Err(SchedulerError::watch_failed("too old resource version"))])
            .await;
        cluster
            .push_watch(vec![WatchEvent::added(make_pod("p1", None, TEST_SCHEDULER))])
            .await;

        let policy = Arc::new(SpotPreferringRandom::with_seed(3));
        let scheduler = Scheduler::new(cluster.clone(), policy, test_config());
        let (token, handle) = spawn(scheduler);

        wait_for_bindings(&cluster, 1).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert!(cluster.watch_calls() >= 3);
    }

    #[tokio::test]
    async fn test_committed_pod_is_never_reconsidered() {
        let cluster = spot_cluster().await;
        let pod = make_pod("p1", None, TEST_SCHEDULER);
        cluster.add_pod(pod.clone()).await;

        let scheduler = Scheduler::new(
            cluster.clone(),
            Arc::new(SpotPreferringRandom::with_seed(5)),
            test_config(),
        );
        let mut ledger = CommitLedger::default();

        let decision = scheduler
            .handle_event(WatchEvent::added(pod.clone()), &mut ledger)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision.outcome, BindOutcome::Bound);
        assert_eq!(decision.class, NodeClass::Spot);

        // A stale event still shows the pod unbound
        let again = scheduler
            .handle_event(WatchEvent::modified(pod.clone()), &mut ledger)
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(cluster.binding_attempts(), 1);

        scheduler
            .handle_event(WatchEvent::deleted(pod), &mut ledger)
            .await
            .unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_ledger_entry_dropped_once_binding_is_visible() {
        let cluster = spot_cluster().await;
        let pod = make_pod("p1", None, TEST_SCHEDULER);
        cluster.add_pod(pod.clone()).await;

        let scheduler = Scheduler::new(
            cluster.clone(),
            Arc::new(SpotPreferringRandom::with_seed(5)),
            test_config(),
        );
        let mut ledger = CommitLedger::default();

        let decision = scheduler
            .handle_event(WatchEvent::added(pod), &mut ledger)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.len(), 1);

        // A pod deleted later may never send DELETED after a reconnect
        let bound = cluster.get_pod("default", "p1").await.unwrap();
        assert_eq!(
            bound.spec.as_ref().and_then(|s| s.node_name.as_deref()),
            Some(decision.node.as_str())
        );
        let outcome = scheduler
            .handle_event(WatchEvent::modified(bound), &mut ledger)
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(ledger.is_empty());
        assert_eq!(cluster.binding_attempts(), 1);
    }

    #[tokio::test]
    async fn test_ignored_events() {
        let cluster = spot_cluster().await;
        let scheduler = Scheduler::new(
            cluster.clone(),
            Arc::new(SpotPreferringRandom::with_seed(5)),
            test_config(),
        );
        let mut ledger = CommitLedger::default();

        let other_scheduler = make_pod("a", None, "default-scheduler");

        let mut running = make_pod("b", None, TEST_SCHEDULER);
        running.status.as_mut().unwrap().phase = Some("Running".to_string());

        let mut bound = make_pod("c", None, TEST_SCHEDULER);
        bound.spec.as_mut().unwrap().node_name = Some("n1".to_string());

        let bookmark = WatchEvent {
            event_type: WatchEventType::Bookmark,
            object: make_pod("d", None, TEST_SCHEDULER),
        };

        for event in [
            WatchEvent::added(other_scheduler),
            WatchEvent::modified(running),
            WatchEvent::added(bound),
            bookmark,
        ] {
            assert!(scheduler.handle_event(event, &mut ledger).await.unwrap().is_none());
        }
        assert_eq!(cluster.binding_attempts(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_nodes_fail_one_decision() {
        let cluster = spot_cluster().await;
        let pod = make_pod("p1", None, TEST_SCHEDULER);
        cluster.add_pod(pod.clone()).await;
        cluster.set_nodes_unavailable(true);

        let scheduler = Scheduler::new(
            cluster.clone(),
            Arc::new(SpotPreferringRandom::with_seed(5)),
            test_config(),
        );
        let mut ledger = CommitLedger::default();

        let err = scheduler
            .handle_event(WatchEvent::added(pod.clone()), &mut ledger)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::SourceUnavailable { .. }));
        assert_eq!(cluster.binding_attempts(), 0);

        cluster.set_nodes_unavailable(false);
        let decision = scheduler
            .handle_event(WatchEvent::modified(pod), &mut ledger)
            .await
            .unwrap();
        assert!(decision.is_some());
    }

    struct StallingPolicy;

    #[async_trait]
    impl PlacementPolicy for StallingPolicy {
        async fn select(&self, _pod: &SchedPod, _nodes: &ClassifiedNodes) -> Result<SchedNode> {
            sleep(Duration::from_secs(3600)).await;
            Err(SchedulerError::internal_error("unreachable"))
        }

        fn name(&self) -> &str {
            "stalling"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_decision_times_out() {
        let cluster = spot_cluster().await;
        let pod = make_pod("p1", None, TEST_SCHEDULER);
        cluster.add_pod(pod.clone()).await;

        let config = SchedulerConfig {
            decision_timeout: Duration::from_secs(5),
            ..test_config()
        };
        let scheduler = Scheduler::new(cluster.clone(), Arc::new(StallingPolicy), config);

        let err = scheduler
            .handle_event(WatchEvent::added(pod), &mut CommitLedger::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::DecisionTimeout { timeout_secs: 5, .. }
        ));
        assert_eq!(cluster.binding_attempts(), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_idle() {
        let cluster = spot_cluster().await;
        let scheduler = Scheduler::new(
            cluster.clone(),
            Arc::new(SpotPreferringRandom::new()),
            test_config(),
        );
        let (token, handle) = spawn(scheduler);

        sleep(Duration::from_millis(20)).await;
        token.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(cluster.watch_calls(), 1);
    }
}
