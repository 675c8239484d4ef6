//! Agent Steps
//!
//! [`AgentStep`] is the unit of progress published by the orchestrator. The
//! order of steps within one query is the record of what happened when.
//! [`StreamEvent`] is the `{event_type, data, timestamp}` form sent to
//! streaming callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::tool::{ToolCall, ToolResult};

/// One published step of a query execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStep {
    /// Model reasoning that led to a tool request
    Reasoning { thought: String, at: DateTime<Utc> },

    ToolCall(ToolCall),

    ToolResult(ToolResult),

    FinalAnswer { answer: String, at: DateTime<Utc> },

    /// Fatal condition that ended the query
    Error { kind: String, message: String, at: DateTime<Utc> },
}

impl AgentStep {
    pub fn reasoning(thought: impl Into<String>) -> Self {
        AgentStep::Reasoning {
            thought: thought.into(),
            at: Utc::now(),
        }
    }

    pub fn final_answer(answer: impl Into<String>) -> Self {
        AgentStep::FinalAnswer {
            answer: answer.into(),
            at: Utc::now(),
        }
    }

    pub fn error(error: &AgentError) -> Self {
        AgentStep::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
            at: Utc::now(),
        }
    }

    /// Wire name of the step
    pub fn event_type(&self) -> &'static str {
        match self {
            AgentStep::Reasoning { .. } => "reasoning",
            AgentStep::ToolCall(_) => "tool_call",
            AgentStep::ToolResult(_) => "tool_result",
            AgentStep::FinalAnswer { .. } => "final_answer",
            AgentStep::Error { .. } => "error",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AgentStep::Reasoning { at, .. }
            | AgentStep::FinalAnswer { at, .. }
            | AgentStep::Error { at, .. } => *at,
            AgentStep::ToolCall(call) => call.requested_at,
            AgentStep::ToolResult(result) => result.completed_at,
        }
    }
}

/// Streaming wire record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl StreamEvent {
    /// Terminal error event for failures that happen before any step exists
    pub fn error(error: &AgentError) -> Self {
        Self::from(&AgentStep::error(error))
    }
}

impl From<&AgentStep> for StreamEvent {
    fn from(step: &AgentStep) -> Self {
        let data = match step {
            AgentStep::Reasoning { thought, .. } => serde_json::json!({ "thought": thought }),
            AgentStep::ToolCall(call) => serde_json::json!({
                "id": call.id,
                "tool": call.tool_name,
                "args": call.arguments,
            }),
            AgentStep::ToolResult(result) => serde_json::json!({
                "call_id": result.call_id,
                "tool": result.tool_name,
                "output": result.output,
                "error": result.error,
                "duration_ms": result.duration_ms,
            }),
            AgentStep::FinalAnswer { answer, .. } => serde_json::json!({ "answer": answer }),
            AgentStep::Error { kind, message, .. } => serde_json::json!({
                "kind": kind,
                "error": message,
            }),
        };

        Self {
            event_type: step.event_type().to_string(),
            data,
            timestamp: step.timestamp(),
        }
    }
}
