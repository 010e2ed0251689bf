use crate::error::{MarketError, Result};
use crate::history::{PriceHistorySource, PriceQuery, PriceSample};
use crate::product::ProductDescription;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// In-memory price history for one region and product
///
/// Answers queries the way the real API does: samples are filtered by
/// instance type, and nothing newer than the window end is returned. The
/// sample in effect at the window start may predate it.
pub struct StaticPriceHistory {
    region: String,
    product: ProductDescription,
    samples: Vec<PriceSample>,
    unavailable: AtomicBool,
    queries: AtomicUsize,
}

impl StaticPriceHistory {
    pub fn new(region: impl Into<String>, product: ProductDescription) -> Self {
        Self {
            region: region.into(),
            product,
            samples: Vec::new(),
            unavailable: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn push(
        &mut self,
        instance_type: &str,
        zone: &str,
        timestamp: DateTime<Utc>,
        price: f64,
    ) -> &mut Self {
        self.samples.push(PriceSample {
            timestamp,
            availability_zone: zone.to_string(),
            instance_type: instance_type.to_string(),
            price,
        });
        self
    }

    /// Reverse the stored order, to check callers do not rely on it
    pub fn reverse(&mut self) {
        self.samples.reverse();
    }

    /// Make every subsequent query fail with `SourceUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of queries answered or refused so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceHistorySource for StaticPriceHistory {
    async fn price_history(&self, query: &PriceQuery) -> Result<Vec<PriceSample>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MarketError::source_unavailable("static price history is offline"));
        }

        if query.region != self.region || query.product != self.product {
            debug!(
                "Mock: no history for {} / {}",
                query.region, query.product
            );
            return Ok(Vec::new());
        }

        Ok(self
            .samples
            .iter()
            .filter(|s| s.instance_type == query.instance_type && s.timestamp <= query.end)
            .cloned()
            .collect())
    }
}
