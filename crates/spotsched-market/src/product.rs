use crate::error::{MarketError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Product descriptions accepted by the spot price history API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProductDescription {
    #[default]
    LinuxUnix,
    SuseLinux,
    Windows,
    LinuxUnixVpc,
    SuseLinuxVpc,
    WindowsVpc,
}

impl ProductDescription {
    pub const ALL: [ProductDescription; 6] = [
        ProductDescription::LinuxUnix,
        ProductDescription::SuseLinux,
        ProductDescription::Windows,
        ProductDescription::LinuxUnixVpc,
        ProductDescription::SuseLinuxVpc,
        ProductDescription::WindowsVpc,
    ];

    /// Wire value as the price history API spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductDescription::LinuxUnix => "Linux/UNIX",
            ProductDescription::SuseLinux => "SUSE Linux",
            ProductDescription::Windows => "Windows",
            ProductDescription::LinuxUnixVpc => "Linux/UNIX (Amazon VPC)",
            ProductDescription::SuseLinuxVpc => "SUSE Linux (Amazon VPC)",
            ProductDescription::WindowsVpc => "Windows (Amazon VPC)",
        }
    }
}

impl fmt::Display for ProductDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductDescription {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == trimmed)
            .ok_or_else(|| {
                let choices: Vec<&str> = Self::ALL.iter().map(|p| p.as_str()).collect();
                MarketError::invalid_input(
                    "product description",
                    format!("'{}' is not a recognized product", trimmed),
                    format!("Use one of: {}", choices.join(", ")),
                )
            })
    }
}

impl TryFrom<String> for ProductDescription {
    type Error = MarketError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProductDescription> for String {
    fn from(value: ProductDescription) -> Self {
        value.as_str().to_string()
    }
}
