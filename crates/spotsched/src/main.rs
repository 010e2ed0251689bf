use clap::{Parser, Subcommand};
use miette::Report;
use spotsched_core::LabelSchema;
use spotsched_market::{AwsCliPriceSource, BidTable, ProductDescription, VolatilityOracle};
use spotsched_scheduler::{
    ApiClient, ClusterClient, LeastVolatileConfig, LeastVolatileSpot, PlacementPolicy, PolicyKind,
    Scheduler, SchedulerConfig, SpotPreferringRandom,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "spotsched", about = "Spot-aware Kubernetes pod scheduler")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, env = "SPOTSCHED_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print how long ago the spot price last exceeded each bid, per zone
    Volatility {
        /// Bids as instance-type:price pairs, e.g. c3.large:0.105,m4.large:0.05
        #[arg(short = 'b', long)]
        bids: String,
        /// AWS region (defaults to the profile's configured region)
        #[arg(short = 'r', long, env = "AWS_REGION")]
        region: Option<String>,
        #[arg(long, default_value = "Linux/UNIX")]
        product_description: String,
        /// Lookback window in hours
        #[arg(long, default_value_t = 168)]
        hours: u64,
        /// AWS CLI profile
        #[arg(long, env = "AWS_PROFILE")]
        profile: Option<String>,
    },
    /// Watch pending pods and bind them to nodes
    Run {
        /// Kubernetes API server URL
        #[arg(long, env = "SPOTSCHED_API_URL")]
        api_url: String,
        /// File holding a bearer token
        #[arg(long, env = "SPOTSCHED_TOKEN_FILE")]
        token_file: Option<PathBuf>,
        /// Additional CA certificate (PEM) for the API server
        #[arg(long, env = "SPOTSCHED_CA_FILE")]
        ca_file: Option<PathBuf>,
        #[arg(long, env = "SPOTSCHED_NAME", default_value = "spot-scheduler")]
        scheduler_name: String,
        #[arg(long, env = "SPOTSCHED_NAMESPACE", default_value = "default")]
        namespace: String,
        /// Placement policy: random or least-volatile
        #[arg(long, env = "SPOTSCHED_POLICY", default_value = "random")]
        policy: String,
        /// YAML file overriding the label keys
        #[arg(long, env = "SPOTSCHED_LABELS_FILE")]
        labels_file: Option<PathBuf>,
        /// Bids as instance-type:price pairs
        #[arg(long, env = "SPOTSCHED_BIDS", conflicts_with = "bids_file")]
        bids: Option<String>,
        /// YAML map of instance type to bid
        #[arg(long, env = "SPOTSCHED_BIDS_FILE")]
        bids_file: Option<PathBuf>,
        /// Region for nodes without a region label
        #[arg(long, env = "AWS_REGION")]
        region: Option<String>,
        #[arg(long, default_value = "Linux/UNIX")]
        product_description: String,
        /// AWS CLI profile
        #[arg(long, env = "AWS_PROFILE")]
        profile: Option<String>,
        #[arg(long, default_value_t = 168)]
        lookback_hours: u64,
        #[arg(long, default_value_t = 60)]
        tie_tolerance_secs: u64,
        #[arg(long, default_value_t = 30)]
        decision_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Volatility {
            bids,
            region,
            product_description,
            hours,
            profile,
        } => run_volatility(&bids, region, &product_description, hours, profile).await,
        Commands::Run {
            api_url,
            token_file,
            ca_file,
            scheduler_name,
            namespace,
            policy,
            labels_file,
            bids,
            bids_file,
            region,
            product_description,
            profile,
            lookback_hours,
            tie_tolerance_secs,
            decision_timeout_secs,
        } => {
            let kind: PolicyKind = policy.parse().map_err(Report::new)?;
            let product: ProductDescription =
                product_description.parse().map_err(Report::new)?;

            let labels = match labels_file {
                Some(path) => LabelSchema::from_file(&path).map_err(Report::new)?,
                None => LabelSchema::default(),
            };

            let policy: Arc<dyn PlacementPolicy> = match kind {
                PolicyKind::Random => Arc::new(SpotPreferringRandom::new()),
                PolicyKind::LeastVolatile => {
                    let bids = load_bids(bids.as_deref(), bids_file.as_ref())?;
                    let source = AwsCliPriceSource::new(profile);
                    let default_region = match region {
                        Some(region) => Some(region),
                        None => match source.current_region().await {
                            Ok(region) => Some(region),
                            Err(e) => {
                                warn!("No default region, nodes without a region label stay unscored: {}", e);
                                None
                            }
                        },
                    };
                    let oracle = Arc::new(VolatilityOracle::new(Arc::new(source)));
                    let config = LeastVolatileConfig {
                        lookback: hours_to_duration(lookback_hours)?,
                        product,
                        default_region,
                        tie_tolerance: Duration::from_secs(tie_tolerance_secs),
                    };
                    Arc::new(LeastVolatileSpot::new(oracle, bids, config))
                }
            };

            let cluster = build_client(&api_url, token_file.as_ref(), ca_file.as_ref())?;
            let config = SchedulerConfig {
                scheduler_name,
                namespace,
                labels,
                decision_timeout: Duration::from_secs(decision_timeout_secs),
                ..Default::default()
            };
            run_scheduler(cluster, policy, config).await
        }
    }
}

/// Print the last exceedance for every (instance type, zone)
async fn run_volatility(
    bids: &str,
    region: Option<String>,
    product_description: &str,
    hours: u64,
    profile: Option<String>,
) -> miette::Result<()> {
    let bids = BidTable::parse_pairs(bids).map_err(Report::new)?;
    let product: ProductDescription = product_description.parse().map_err(Report::new)?;

    let source = AwsCliPriceSource::new(profile);
    let region = match region {
        Some(region) => region,
        None => source.current_region().await.map_err(Report::new)?,
    };
    let oracle = VolatilityOracle::new(Arc::new(source));
    let lookback = hours_to_duration(hours)?;

    for (instance_type, bid) in bids.iter() {
        let map = oracle
            .last_exceedance(instance_type, bid, lookback, product, &region)
            .await
            .map_err(Report::new)?;

        if map.is_empty() {
            println!("{} (bid {}): no price history in {}", instance_type, bid, region);
        }
        for (instance_type, zone, exceedance) in map.iter() {
            println!("{} {} (bid {}): {}", instance_type, zone, bid, exceedance);
        }
    }
    Ok(())
}

/// Run the scheduler until ctrl-c
async fn run_scheduler(
    cluster: Arc<dyn ClusterClient>,
    policy: Arc<dyn PlacementPolicy>,
    config: SchedulerConfig,
) -> miette::Result<()> {
    let scheduler = Scheduler::new(cluster, policy, config);

    let token = CancellationToken::new();
    let scheduler_token = token.clone();
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.run(scheduler_token).await {
            error!("Scheduler error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    let shutdown_timeout = Duration::from_secs(5);
    if tokio::time::timeout(shutdown_timeout, scheduler_handle)
        .await
        .is_err()
    {
        warn!("Scheduler did not stop within {:?}", shutdown_timeout);
    }

    info!("Shutdown complete");
    Ok(())
}

fn build_client(
    api_url: &str,
    token_file: Option<&PathBuf>,
    ca_file: Option<&PathBuf>,
) -> miette::Result<Arc<dyn ClusterClient>> {
    let mut client = ApiClient::new(api_url);

    if let Some(path) = token_file {
        let token = std::fs::read_to_string(path).map_err(|e| {
            miette::miette!("Failed to read token file '{}': {}", path.display(), e)
        })?;
        client = client.with_token(token);
    }

    if let Some(path) = ca_file {
        let pem = std::fs::read(path).map_err(|e| {
            miette::miette!("Failed to read CA file '{}': {}", path.display(), e)
        })?;
        client = client.with_ca_certificate(&pem).map_err(Report::new)?;
    }

    Ok(Arc::new(client))
}

fn hours_to_duration(hours: u64) -> miette::Result<Duration> {
    hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            miette::miette!(
                help = "Use a lookback such as 168 hours",
                "A lookback of {} hours is too large",
                hours
            )
        })
}

fn load_bids(pairs: Option<&str>, file: Option<&PathBuf>) -> miette::Result<BidTable> {
    match (pairs, file) {
        (Some(pairs), _) => BidTable::parse_pairs(pairs).map_err(Report::new),
        (None, Some(path)) => BidTable::from_file(path).map_err(Report::new),
        (None, None) => Err(miette::miette!(
            help = "Pass --bids c3.large:0.105 or --bids-file bids.yaml",
            "The least-volatile policy needs a bid for each spot instance type"
        )),
    }
}
