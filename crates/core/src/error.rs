//! Error types, one `thiserror` enum per concern.
//!
//! Provider and tool errors stay inside an agent run and become
//! observations. Decomposition errors are recovered with the fallback batch.
//! Only [`AggregationError`] ends a whole orchestration run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Decomposition error: {0}")]
    Decomposition(#[from] DecompositionError),

    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A failed model call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// A request that could not be split into task descriptions.
#[derive(Debug, Clone, Error)]
pub enum DecompositionError {
    #[error("task generation call failed: {0}")]
    Generation(#[from] ProviderError),

    #[error("task list could not be parsed: {0}")]
    Unparseable(String),

    #[error("task generation returned no tasks")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error(
        "no agent produced a usable result ({completed} completed, {failed} failed, {timed_out} timed out)"
    )]
    NoUsableResults {
        completed: usize,
        failed: usize,
        timed_out: usize,
    },
}
