//! Spotsched Scheduler - Pod placement across spot and persistent nodes
//!
//! This crate provides:
//! - Cluster access (HTTP API client and an in-memory mock)
//! - Node classification into spot and persistent capacity
//! - Placement policies (random, least volatile spot zone)
//! - Idempotent pod binding
//! - The watch-driven scheduling loop

pub mod api_client;
pub mod binder;
pub mod classifier;
pub mod cluster;
pub mod error;
pub mod least_volatile;
pub mod mock;
pub mod policy;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use api_client::ApiClient;
pub use binder::Binder;
pub use classifier::NodeClassifier;
pub use cluster::{ClusterClient, PodEventStream};
pub use error::{Result, SchedulerError};
pub use least_volatile::{LeastVolatileConfig, LeastVolatileSpot};
pub use mock::{BindingRecord, MockCluster};
pub use policy::{candidate_class, PlacementPolicy, PolicyKind, SpotPreferringRandom};
pub use scheduler::{CommitLedger, Scheduler, SchedulerConfig};
pub use types::{BindOutcome, ClassifiedNodes, Decision};
