use crate::error::{MarketError, Result};
use crate::product::ProductDescription;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};

/// One spot price observation
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub availability_zone: String,
    pub instance_type: String,
    pub price: f64,
}

/// Price history query for one instance type in one region
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    pub instance_type: String,
    pub product: ProductDescription,
    pub region: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Narrow interface to a spot price history backend
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    /// Return the samples for the query window. Any failure to reach the
    /// backend or interpret its answer is `SourceUnavailable`.
    async fn price_history(&self, query: &PriceQuery) -> Result<Vec<PriceSample>>;
}

/// Parse an ISO-8601 UTC timestamp with optional fractional seconds
/// (`2015-01-01T00:00:00.000Z` or `2015-01-01T00:00:00+00:00`)
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ")
        .map(|naive| naive.and_utc())
        .map_err(|e| MarketError::source_unavailable(format!("bad timestamp '{}': {}", raw, e)))
}

/// Parse a decimal price string
pub fn parse_price(raw: &str) -> Result<f64> {
    let price = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| MarketError::source_unavailable(format!("bad price '{}': {}", raw, e)))?;
    if !price.is_finite() {
        return Err(MarketError::source_unavailable(format!(
            "bad price '{}': not finite",
            raw
        )));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_fractional_z() {
        let ts = parse_timestamp("2015-06-01T12:30:45.123Z").unwrap();
        assert_eq!(ts.timestamp(), Utc.with_ymd_and_hms(2015, 6, 1, 12, 30, 45).unwrap().timestamp());
    }

    #[test]
    fn test_parse_offset_form() {
        let a = parse_timestamp("2015-06-01T12:30:45+00:00").unwrap();
        let b = parse_timestamp("2015-06-01T12:30:45.000Z").unwrap();
        assert_eq!(a.timestamp(), b.timestamp());
    }

    #[test]
    fn test_parse_bad_timestamp() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, MarketError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("0.0320").unwrap(), 0.032);
        assert!(parse_price("n/a").is_err());
        assert!(parse_price("inf").is_err());
    }
}
