//! Structured error handling and exit codes.

use serde::Serialize;

use crate::pipeline::PipelineError;

/// Exit codes for the platelens binary.
///
/// - 0: Success
/// - 1: General error (configuration, I/O, storage)
/// - 2: The photo does not show food
/// - 3: The model service was unreachable or timed out
/// - 4: The model answered with an unusable response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the command completed.
    Success = 0,
    /// General error: an unexpected failure.
    GeneralError = 1,
    /// Not food: the photo was rejected during identification.
    NotFood = 2,
    /// Model unavailable: transport failure or timeout. Retryable.
    ModelUnavailable = 3,
    /// Malformed response: the model output did not fit. Retryable.
    MalformedResponse = 4,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "PL000",
            Self::GeneralError => "PL001",
            Self::NotFood => "PL002",
            Self::ModelUnavailable => "PL003",
            Self::MalformedResponse => "PL004",
        }
    }

    /// Pick the exit code for an application error.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::NotFood { .. }) => Self::NotFood,
            Some(PipelineError::ModelUnavailable { .. }) => Self::ModelUnavailable,
            Some(PipelineError::MalformedResponse { .. }) => Self::MalformedResponse,
            None => Self::GeneralError,
        }
    }

    /// Whether retrying the same command may succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::ModelUnavailable | Self::MalformedResponse)
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "PL003")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether retrying may succeed
    pub retryable: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{:#}", err),
            retryable: exit_code.is_retryable(),
        }
    }
}
