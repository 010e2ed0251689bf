use crate::command::exec;
use crate::error::{MarketError, Result};
use crate::history::{parse_price, parse_timestamp, PriceHistorySource, PriceQuery, PriceSample};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Deserialize;
use tracing::{debug, info};

/// `describe-spot-price-history` JSON output
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpotPriceHistoryResponse {
    #[serde(default)]
    spot_price_history: Vec<SpotPriceRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpotPriceRecord {
    timestamp: String,
    availability_zone: String,
    spot_price: String,
    #[serde(default)]
    instance_type: Option<String>,
}

/// Price history source backed by the `aws` command line tool
#[derive(Debug, Clone)]
pub struct AwsCliPriceSource {
    program: String,
    profile: Option<String>,
}

impl AwsCliPriceSource {
    pub fn new(profile: Option<String>) -> Self {
        Self {
            program: "aws".to_string(),
            profile,
        }
    }

    /// Use a different executable, e.g. a wrapper script
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, query: &PriceQuery) -> Vec<String> {
        let mut args = vec!["--output".to_string(), "json".to_string()];
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args.extend([
            "ec2".to_string(),
            "--region".to_string(),
            query.region.clone(),
            "describe-spot-price-history".to_string(),
            "--start-time".to_string(),
            query.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            "--end-time".to_string(),
            query.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            "--instance-types".to_string(),
            query.instance_type.clone(),
            "--product-descriptions".to_string(),
            query.product.as_str().to_string(),
        ]);
        args
    }

    /// Region configured for the active profile (`aws configure get region`)
    pub async fn current_region(&self) -> Result<String> {
        let mut args = vec!["configure".to_string(), "get".to_string(), "region".to_string()];
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }

        let output = exec(&self.program, &args)
            .await
            .map_err(into_source_unavailable)?;
        let region = output.stdout.trim().to_string();
        if region.is_empty() {
            return Err(MarketError::invalid_input(
                "region",
                "no region configured for the active profile",
                "Pass --region or run `aws configure set region <region>`",
            ));
        }
        Ok(region)
    }
}

#[async_trait]
impl PriceHistorySource for AwsCliPriceSource {
    async fn price_history(&self, query: &PriceQuery) -> Result<Vec<PriceSample>> {
        info!(
            instance_type = %query.instance_type,
            region = %query.region,
            product = %query.product,
            "Querying spot price history"
        );

        let output = exec(&self.program, &self.args(query))
            .await
            .map_err(into_source_unavailable)?;

        let samples = parse_price_history(&output.stdout, &query.instance_type)?;
        debug!("Received {} price samples", samples.len());
        Ok(samples)
    }
}

/// Parse `describe-spot-price-history` output. Empty output means no samples.
pub fn parse_price_history(raw: &str, instance_type: &str) -> Result<Vec<PriceSample>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let response: SpotPriceHistoryResponse = serde_json::from_str(raw).map_err(|e| {
        MarketError::source_unavailable(format!("malformed price history response: {}", e))
    })?;

    response
        .spot_price_history
        .into_iter()
        .map(|record| -> Result<PriceSample> {
            Ok(PriceSample {
                timestamp: parse_timestamp(&record.timestamp)?,
                price: parse_price(&record.spot_price)?,
                instance_type: record
                    .instance_type
                    .unwrap_or_else(|| instance_type.to_string()),
                availability_zone: record.availability_zone,
            })
        })
        .collect()
}

fn into_source_unavailable(err: MarketError) -> MarketError {
    match err {
        MarketError::CommandFailed {
            command,
            exit_code,
            stderr,
        } => MarketError::source_unavailable(format!(
            "'{}' exited with {}: {}",
            command,
            exit_code,
            stderr.trim()
        )),
        other => other,
    }
}
