// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use spotsched_core::CoreError;
use spotsched_market::MarketError;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// Cluster or price backend unreachable, or returned malformed data
    #[error("Source unavailable: {message}")]
    #[diagnostic(
        code(scheduler::source_unavailable),
        help("Check API server and price history connectivity. Results are never substituted with empty data")
    )]
    SourceUnavailable { message: String },

    /// The node class the policy requires has no ready nodes
    #[error("No {class} nodes available for pod {pod_name}")]
    #[diagnostic(
        code(scheduler::no_candidate_nodes),
        help("Add ready {class} nodes or check the spot label on existing nodes")
    )]
    NoCandidateNodes { pod_name: String, class: String },

    /// Binding rejected because of a concurrent external change
    #[error("Binding pod {pod_name} to node {node_name} was rejected: {reason}")]
    #[diagnostic(
        code(scheduler::bind_conflict),
        help("The pod was scheduled by another actor or the node went away. The pod stays pending")
    )]
    BindConflict {
        pod_name: String,
        node_name: String,
        reason: String,
    },

    /// Caller supplied an invalid value
    #[error("Invalid input: {message}")]
    #[diagnostic(code(scheduler::invalid_input), help("{suggestion}"))]
    InvalidInput { message: String, suggestion: String },

    /// A single decision took longer than the configured limit
    #[error("Scheduling pod {pod_name} timed out after {timeout_secs}s")]
    #[diagnostic(
        code(scheduler::decision_timeout),
        help("A slow node list, price query or binding call stalled this decision")
    )]
    DecisionTimeout { pod_name: String, timeout_secs: u64 },

    /// The pod watch stream failed and must be reopened
    #[error("Watch stream failed: {message}")]
    #[diagnostic(
        code(scheduler::watch_failed),
        help("The subscription is reopened with backoff")
    )]
    WatchFailed { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    InternalError { message: String },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a SourceUnavailable error
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    /// Create a NoCandidateNodes error
    pub fn no_candidate_nodes(pod_name: impl Into<String>, class: impl ToString) -> Self {
        Self::NoCandidateNodes {
            pod_name: pod_name.into(),
            class: class.to_string(),
        }
    }

    /// Create a BindConflict error
    pub fn bind_conflict(
        pod_name: impl Into<String>,
        node_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::BindConflict {
            pod_name: pod_name.into(),
            node_name: node_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a DecisionTimeout error
    pub fn decision_timeout(pod_name: impl Into<String>, timeout_secs: u64) -> Self {
        Self::DecisionTimeout {
            pod_name: pod_name.into(),
            timeout_secs,
        }
    }

    /// Create a WatchFailed error
    pub fn watch_failed(message: impl Into<String>) -> Self {
        Self::WatchFailed {
            message: message.into(),
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

impl From<MarketError> for SchedulerError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::InvalidInput {
                field,
                reason,
                suggestion,
            } => Self::invalid_input(format!("{}: {}", field, reason), suggestion),
            MarketError::CoreError(core) => core.into(),
            other => Self::source_unavailable(other.to_string()),
        }
    }
}

impl From<CoreError> for SchedulerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput {
                field,
                reason,
                suggestion,
            } => Self::invalid_input(format!("{}: {}", field, reason), suggestion),
            other => Self::source_unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_errors_map_to_taxonomy() {
        let err: SchedulerError = MarketError::source_unavailable("aws exited with 255").into();
        assert!(matches!(err, SchedulerError::SourceUnavailable { .. }));

        let err: SchedulerError = MarketError::command_failed("aws", 1, "denied").into();
        assert!(matches!(err, SchedulerError::SourceUnavailable { .. }));

        let err: SchedulerError =
            MarketError::invalid_input("product description", "bad", "pick one").into();
        assert!(matches!(err, SchedulerError::InvalidInput { .. }));
    }

    #[test]
    fn test_malformed_object_is_source_unavailable() {
        let err: SchedulerError = CoreError::malformed_object("Node", "no name").into();
        assert!(matches!(err, SchedulerError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_no_candidate_nodes_message() {
        let err = SchedulerError::no_candidate_nodes("default/p1", "persistent");
        assert_eq!(err.to_string(), "No persistent nodes available for pod default/p1");
    }
}
