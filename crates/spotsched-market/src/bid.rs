use crate::error::{MarketError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Maximum price the operator pays per instance type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BidTable {
    bids: BTreeMap<String, f64>,
}

impl BidTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `type:bid` pairs separated by commas, e.g. `c3.large:0.105,c3.xlarge:0.210`
    pub fn parse_pairs(input: &str) -> Result<Self> {
        let mut table = Self::new();

        for pair in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (instance_type, bid) = pair.split_once(':').ok_or_else(|| {
                MarketError::invalid_input(
                    "bid",
                    format!("'{}' is not an instance-type:bid pair", pair),
                    "Use the form c3.large:0.105",
                )
            })?;

            let bid = bid.trim().parse::<f64>().map_err(|e| {
                MarketError::invalid_input(
                    "bid",
                    format!("'{}' for {}: {}", bid.trim(), instance_type.trim(), e),
                    "Bids are decimal prices per hour, e.g. 0.105",
                )
            })?;

            table.insert(instance_type, bid)?;
        }

        if table.is_empty() {
            return Err(MarketError::invalid_input(
                "bid",
                "no instance-type:bid pairs given",
                "Use the form c3.large:0.105,c3.xlarge:0.210",
            ));
        }

        Ok(table)
    }

    /// Load a YAML mapping of instance type to bid
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            MarketError::invalid_input(
                "bid file",
                format!("cannot read {}: {}", path.display(), e),
                "Pass a readable YAML file mapping instance types to bids",
            )
        })?;

        let raw: BTreeMap<String, f64> = spotsched_core::from_yaml(&data)?;
        let mut table = Self::new();
        for (instance_type, bid) in raw {
            table.insert(&instance_type, bid)?;
        }

        if table.is_empty() {
            return Err(MarketError::invalid_input(
                "bid file",
                format!("{} holds no bids", path.display()),
                "Map at least one instance type to a bid, e.g. c3.large: 0.105",
            ));
        }

        Ok(table)
    }

    /// Add or replace a bid, rejecting negative and non-finite prices
    pub fn insert(&mut self, instance_type: &str, bid: f64) -> Result<()> {
        let instance_type = instance_type.trim();
        if instance_type.is_empty() {
            return Err(MarketError::invalid_input(
                "bid",
                "instance type is empty",
                "Use the form c3.large:0.105",
            ));
        }
        validate_bid(bid)?;
        self.bids.insert(instance_type.to_string(), bid);
        Ok(())
    }

    pub fn get(&self, instance_type: &str) -> Option<f64> {
        self.bids.get(instance_type).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.bids.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }
}

impl FromStr for BidTable {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_pairs(s)
    }
}

/// A bid must be a finite, non-negative price
pub fn validate_bid(bid: f64) -> Result<()> {
    if !bid.is_finite() || bid < 0.0 {
        return Err(MarketError::invalid_input(
            "bid",
            format!("{} is not a valid price", bid),
            "Bids must be finite and non-negative",
        ));
    }
    Ok(())
}
