//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Tool-side variants (`Validation`, `UnknownTool`, `ToolExecution`,
/// `ToolTimeout`) are normally folded into a `ToolResult` and fed back to
/// the model. The rest end the query.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Query rejected before execution started
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Tool arguments did not match the declared schema
    #[error("Invalid arguments for tool '{tool}': {message}")]
    Validation { tool: String, message: String },

    /// Tool not found in registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool handler reported a failure
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Tool call exceeded its time budget
    #[error("Tool '{tool}' timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    /// Backing model call could not be completed
    #[error("Reasoning unavailable: {0}")]
    ReasoningUnavailable(String),

    /// Maximum tool iterations reached in reasoning loop
    #[error("Maximum iterations ({0}) exceeded")]
    MaxIterationsExceeded(usize),

    /// Whole query exceeded its deadline
    #[error("Query timed out after {0}ms")]
    QueryTimeout(u64),

    /// Caller cancelled or disconnected
    #[error("Query cancelled")]
    Cancelled,

    /// Observability backend failure (never escapes the orchestrator)
    #[error("Observability error: {0}")]
    Observability(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Query task died unexpectedly
    #[error("Internal error: {0}")]
    Internal(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Stable snake_case code used on the wire and in traces
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::InvalidQuery(_) => "invalid_query",
            AgentError::Validation { .. } => "validation_error",
            AgentError::UnknownTool(_) => "unknown_tool",
            AgentError::ToolExecution { .. } => "tool_execution_error",
            AgentError::ToolTimeout { .. } => "tool_timeout",
            AgentError::ReasoningUnavailable(_) => "reasoning_unavailable",
            AgentError::MaxIterationsExceeded(_) => "max_iterations_exceeded",
            AgentError::QueryTimeout(_) => "query_timeout",
            AgentError::Cancelled => "cancelled",
            AgentError::Observability(_) => "observability_error",
            AgentError::Config(_) => "config_error",
            AgentError::Internal(_) => "internal_error",
            AgentError::Json(_) => "json_error",
        }
    }

    /// Whether this error ends the query instead of becoming an observation
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AgentError::Validation { .. }
                | AgentError::UnknownTool(_)
                | AgentError::ToolExecution { .. }
                | AgentError::ToolTimeout { .. }
                | AgentError::Observability(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::InvalidQuery(msg) => format!("Invalid request: {}", msg),
            AgentError::Validation { tool, message } => {
                format!("Invalid input for '{}': {}", tool, message)
            }
            AgentError::UnknownTool(name) => format!("The tool '{}' is not available.", name),
            AgentError::ToolExecution { message, .. } => format!("Tool error: {}", message),
            AgentError::ToolTimeout { tool, .. } => format!("The tool '{}' took too long to respond.", tool),
            AgentError::ReasoningUnavailable(_) => "The AI service is currently unavailable. Please try again.".into(),
            AgentError::MaxIterationsExceeded(_) => "The request took too many steps to process. Please try a simpler query.".into(),
            AgentError::QueryTimeout(_) => "The request took too long to process. Please try again.".into(),
            AgentError::Cancelled => "The request was cancelled.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
