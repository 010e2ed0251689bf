//! Spotsched Market - Spot price history and volatility
//!
//! This crate provides:
//! - The `PriceHistorySource` query interface and an `aws` CLI adapter
//! - The volatility oracle: time since the price last exceeded a bid, per zone
//! - Product descriptions and bid tables

pub mod aws;
pub mod bid;
pub mod command;
pub mod error;
pub mod history;
pub mod mock;
pub mod oracle;
pub mod product;

// Re-export commonly used types
pub use aws::AwsCliPriceSource;
pub use bid::BidTable;
pub use error::{MarketError, Result};
pub use history::{PriceHistorySource, PriceQuery, PriceSample};
pub use mock::StaticPriceHistory;
pub use oracle::{format_elapsed, Exceedance, VolatilityMap, VolatilityOracle};
pub use product::ProductDescription;
