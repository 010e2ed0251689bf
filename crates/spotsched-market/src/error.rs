use miette::Diagnostic;
use thiserror::Error;

/// Error type for spot market queries
#[derive(Error, Debug, Diagnostic)]
pub enum MarketError {
    /// Price history could not be fetched or was malformed
    #[error("Price history unavailable: {message}")]
    #[diagnostic(
        code(spotsched::market::source_unavailable),
        help("Check connectivity and credentials for the price history source. No partial result is produced")
    )]
    SourceUnavailable {
        #[allow(unused)]
        message: String,
    },

    /// Command execution failed
    #[error("Command '{command}' failed with exit code {exit_code}")]
    #[diagnostic(code(spotsched::market::command_failed), help("stderr: {stderr}"))]
    CommandFailed {
        #[allow(unused)]
        command: String,
        #[allow(unused)]
        exit_code: i32,
        #[allow(unused)]
        stderr: String,
    },

    /// Caller supplied an invalid query parameter
    #[error("Invalid {field}: {reason}")]
    #[diagnostic(code(spotsched::market::invalid_input), help("{suggestion}"))]
    InvalidInput {
        #[allow(unused)]
        field: String,
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] spotsched_core::CoreError),
}

/// Result type for market operations
pub type Result<T> = std::result::Result<T, MarketError>;

impl MarketError {
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    pub fn command_failed(
        command: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

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

    /// True for caller input errors, which are never retried
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            MarketError::InvalidInput { .. }
                | MarketError::CoreError(spotsched_core::CoreError::InvalidInput { .. })
        )
    }
}
