use crate::error::{Result, SchedulerError};
use crate::policy::{candidates, PlacementPolicy, PolicyRng};
use crate::types::ClassifiedNodes;
use async_trait::async_trait;
use spotsched_core::{SchedNode, SchedPod};
use spotsched_market::{BidTable, Exceedance, ProductDescription, VolatilityMap, VolatilityOracle};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the least-volatile policy
#[derive(Debug, Clone)]
pub struct LeastVolatileConfig {
    /// Price history window
    pub lookback: Duration,
    pub product: ProductDescription,
    /// Region for nodes without a region label
    pub default_region: Option<String>,
    /// Two `LastSeen` scores closer than this count as a tie
    pub tie_tolerance: Duration,
}

impl Default for LeastVolatileConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(168 * 3600),
            product: ProductDescription::default(),
            default_region: None,
            tie_tolerance: Duration::from_secs(60),
        }
    }
}

/// Spot placement in the zone whose price stayed below the bid the longest
///
/// Drivers are placed uniformly at random on persistent nodes. Everything
/// else is scored by the last time the spot price of the node's instance type
/// exceeded the configured bid in the node's zone.
pub struct LeastVolatileSpot {
    oracle: Arc<VolatilityOracle>,
    bids: BidTable,
    config: LeastVolatileConfig,
    rng: PolicyRng,
}

impl LeastVolatileSpot {
    pub fn new(oracle: Arc<VolatilityOracle>, bids: BidTable, config: LeastVolatileConfig) -> Self {
        Self {
            oracle,
            bids,
            config,
            rng: PolicyRng::from_entropy(),
        }
    }

    /// Deterministic tie-breaking, for tests and reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = PolicyRng::seeded(seed);
        self
    }

    pub fn config(&self) -> &LeastVolatileConfig {
        &self.config
    }

    fn region_of<'a>(&'a self, node: &'a SchedNode) -> Option<&'a str> {
        node.instance
            .region
            .as_deref()
            .or(self.config.default_region.as_deref())
            .filter(|r| !r.is_empty())
    }

    /// Query the oracle once per (instance type, region) among the nodes
    async fn volatility_by_group(
        &self,
        nodes: &[SchedNode],
    ) -> Result<BTreeMap<(String, String), VolatilityMap>> {
        let mut groups: BTreeMap<(String, String), f64> = BTreeMap::new();
        for node in nodes {
            let Some(instance_type) = node.instance.instance_type.as_deref() else {
                continue;
            };
            let Some(region) = self.region_of(node) else {
                continue;
            };
            let Some(bid) = self.bids.get(instance_type) else {
                continue;
            };
            groups
                .entry((instance_type.to_string(), region.to_string()))
                .or_insert(bid);
        }

        let mut results = BTreeMap::new();
        for ((instance_type, region), bid) in groups {
            let map = self
                .oracle
                .last_exceedance(
                    &instance_type,
                    bid,
                    self.config.lookback,
                    self.config.product,
                    &region,
                )
                .await?;
            debug!(
                "Volatility for {} in {} at bid {}: {} zones",
                instance_type,
                region,
                bid,
                map.len()
            );
            results.insert((instance_type, region), map);
        }
        Ok(results)
    }

    fn score(
        &self,
        node: &SchedNode,
        volatility: &BTreeMap<(String, String), VolatilityMap>,
    ) -> Option<Exceedance> {
        let instance_type = node.instance.instance_type.as_deref()?;
        let region = self.region_of(node)?;
        let zone = node.instance.zone.as_deref()?;
        volatility
            .get(&(instance_type.to_string(), region.to_string()))?
            .get(instance_type, zone)
    }

    /// Whether `score` counts as tied with the best score
    fn ties_with(&self, best: Exceedance, score: Exceedance) -> bool {
        match (best, score) {
            (Exceedance::Never, Exceedance::Never) => true,
            (Exceedance::LastSeen(b), Exceedance::LastSeen(s)) => {
                b.as_secs().abs_diff(s.as_secs()) <= self.config.tie_tolerance.as_secs()
            }
            _ => false,
        }
    }
}

#[async_trait]
impl PlacementPolicy for LeastVolatileSpot {
    async fn select(&self, pod: &SchedPod, nodes: &ClassifiedNodes) -> Result<SchedNode> {
        let found = candidates(pod, nodes)?;

        if pod.role.is_driver() {
            return self
                .rng
                .choose(found)
                .cloned()
                .ok_or_else(|| SchedulerError::internal_error("candidate set emptied during selection"));
        }

        let volatility = self.volatility_by_group(found).await?;

        let scored: Vec<(&SchedNode, Exceedance)> = found
            .iter()
            .filter_map(|n| self.score(n, &volatility).map(|s| (n, s)))
            .collect();

        let tied: Vec<&SchedNode> = match scored.iter().map(|(_, s)| *s).min() {
            Some(best) => scored
                .iter()
                .filter(|(_, s)| self.ties_with(best, *s))
                .map(|(n, _)| *n)
                .collect(),
            None => {
                warn!(
                    "No spot node for pod {} has a volatility score, choosing among all {}",
                    pod.key(),
                    found.len()
                );
                found.iter().collect()
            }
        };

        let chosen = self
            .rng
            .choose(&tied)
            .map(|n| (*n).clone())
            .ok_or_else(|| SchedulerError::internal_error("tie set is empty"))?;

        match self.score(&chosen, &volatility) {
            Some(score) => info!(
                "Pod {} goes to {} (zone {}): {}",
                pod.key(),
                chosen.name,
                chosen.instance.zone.as_deref().unwrap_or("?"),
                score
            ),
            None => info!("Pod {} goes to unscored node {}", pod.key(), chosen.name),
        }
        Ok(chosen)
    }

    fn name(&self) -> &str {
        "least-volatile"
    }
}
