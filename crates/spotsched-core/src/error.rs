// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for object parsing and input validation
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// A cluster object is missing data the scheduler relies on
    #[error("Malformed {kind}: {reason}")]
    #[diagnostic(
        code(spotsched::malformed_object),
        help("The API server returned an object that cannot be interpreted. Check the object with kubectl get -o yaml")
    )]
    MalformedObject {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        reason: String,
    },

    /// Caller supplied an invalid value
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(spotsched::invalid_input), help("{suggestion}"))]
    InvalidInput {
        #[allow(unused)]
        field: String,
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(spotsched::serialization_error),
        help("Ensure the document is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a MalformedObject error
    pub fn malformed_object(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedObject {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input(
        field: impl Into<String>,
        reason: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}
