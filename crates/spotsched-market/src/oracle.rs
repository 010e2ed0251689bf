use crate::bid::validate_bid;
use crate::error::{MarketError, Result};
use crate::history::{PriceHistorySource, PriceQuery};
use crate::product::ProductDescription;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Time since the spot price last exceeded the bid within a lookback window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exceedance {
    /// The bid was never exceeded within the window
    Never,
    /// Elapsed time since the most recent sample priced above the bid
    LastSeen(Duration),
}

impl Exceedance {
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Exceedance::Never => None,
            Exceedance::LastSeen(d) => Some(*d),
        }
    }
}

/// Orders by risk: `Never` is least risky, then longer elapsed times.
impl Ord for Exceedance {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Exceedance::Never, Exceedance::Never) => Ordering::Equal,
            (Exceedance::Never, Exceedance::LastSeen(_)) => Ordering::Less,
            (Exceedance::LastSeen(_), Exceedance::Never) => Ordering::Greater,
            (Exceedance::LastSeen(a), Exceedance::LastSeen(b)) => b.cmp(a),
        }
    }
}

impl PartialOrd for Exceedance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Exceedance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exceedance::Never => write!(f, "never exceeded within window"),
            Exceedance::LastSeen(elapsed) => write!(f, "{} ago", format_elapsed(*elapsed)),
        }
    }
}

/// Render a duration as `1d 2h 3m 4s`, dropping leading zero units
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        (total % 86_400) / 3_600,
        (total % 3_600) / 60,
        total % 60,
    );

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if days > 0 || hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if days > 0 || hours > 0 || minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    parts.push(format!("{}s", seconds));
    parts.join(" ")
}

/// Exceedance per (instance type, availability zone)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolatilityMap {
    entries: BTreeMap<(String, String), Exceedance>,
}

impl VolatilityMap {
    pub fn get(&self, instance_type: &str, zone: &str) -> Option<Exceedance> {
        self.entries
            .get(&(instance_type.to_string(), zone.to_string()))
            .copied()
    }

    /// Entries in (instance type, zone) order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, Exceedance)> {
        self.entries
            .iter()
            .map(|((t, z), e)| (t.as_str(), z.as_str(), *e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Computes how long ago the spot price last exceeded a bid
pub struct VolatilityOracle {
    source: Arc<dyn PriceHistorySource>,
}

impl VolatilityOracle {
    pub fn new(source: Arc<dyn PriceHistorySource>) -> Self {
        Self { source }
    }

    /// Exceedance per zone for the window ending now
    pub async fn last_exceedance(
        &self,
        instance_type: &str,
        bid: f64,
        lookback: Duration,
        product: ProductDescription,
        region: &str,
    ) -> Result<VolatilityMap> {
        self.last_exceedance_at(Utc::now(), instance_type, bid, lookback, product, region)
            .await
    }

    /// Exceedance per zone for the window `[now - lookback, now]`.
    ///
    /// Each zone starts with its threshold at the window start. Samples are
    /// scanned in time order and a sample priced above `bid` advances the
    /// threshold when it is strictly newer. Comparisons use whole epoch
    /// seconds. A zone whose threshold never moved reports `Never`.
    pub async fn last_exceedance_at(
        &self,
        now: DateTime<Utc>,
        instance_type: &str,
        bid: f64,
        lookback: Duration,
        product: ProductDescription,
        region: &str,
    ) -> Result<VolatilityMap> {
        validate_bid(bid)?;
        if instance_type.trim().is_empty() {
            return Err(MarketError::invalid_input(
                "instance type",
                "instance type is empty",
                "Pass an instance type such as c3.large",
            ));
        }
        if region.trim().is_empty() {
            return Err(MarketError::invalid_input(
                "region",
                "region is empty",
                "Pass a region such as us-east-1",
            ));
        }
        if lookback.is_zero() {
            return Err(MarketError::invalid_input(
                "lookback",
                "lookback window is zero",
                "Use a positive lookback, e.g. 168 hours",
            ));
        }

        let window = chrono::Duration::from_std(lookback).map_err(|e| {
            MarketError::invalid_input("lookback", e.to_string(), "Use a shorter lookback window")
        })?;
        let start = now.checked_sub_signed(window).ok_or_else(|| {
            MarketError::invalid_input(
                "lookback",
                format!("{:?} reaches before the earliest representable time", lookback),
                "Use a shorter lookback window, e.g. 168 hours",
            )
        })?;

        let query = PriceQuery {
            instance_type: instance_type.to_string(),
            product,
            region: region.to_string(),
            start,
            end: now,
        };

        let mut samples = self.source.price_history(&query).await?;
        samples.sort_by_key(|s| s.timestamp);

        let start_secs = start.timestamp();
        let mut thresholds: BTreeMap<(String, String), i64> = BTreeMap::new();

        for sample in &samples {
            let ts = sample.timestamp.timestamp();
            let threshold = thresholds
                .entry((instance_type.to_string(), sample.availability_zone.clone()))
                .or_insert(start_secs);

            if sample.price > bid && ts > *threshold {
                *threshold = ts;
            }
        }

        let now_secs = now.timestamp();
        let entries = thresholds
            .into_iter()
            .map(|(key, threshold)| {
                let exceedance = if threshold == start_secs {
                    Exceedance::Never
                } else {
                    Exceedance::LastSeen(Duration::from_secs((now_secs - threshold).max(0) as u64))
                };
                (key, exceedance)
            })
            .collect::<BTreeMap<_, _>>();

        debug!(
            "Computed exceedance for {} in {} across {} zones from {} samples",
            instance_type,
            region,
            entries.len(),
            samples.len()
        );

        Ok(VolatilityMap { entries })
    }
}
