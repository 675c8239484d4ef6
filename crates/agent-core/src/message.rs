//! Conversation Messages
//!
//! The per-query conversation state. A [`Conversation`] only grows: turns
//! are appended and never edited, removed or reordered.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::tool::{ToolCall, ToolResult};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool observation (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Optional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

/// Additional message metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Tool call ID (tool request and observation messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool name (tool request and observation messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Whether the observation carries a tool error
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn that requests a tool.
    ///
    /// The request is rendered in the same ```tool block format the prompt
    /// asks models to answer with, after any reasoning text.
    pub fn tool_request(thought: &str, call: &ToolCall) -> Self {
        let request = serde_json::json!({
            "tool": call.tool_name,
            "arguments": call.arguments,
        });
        let mut content = String::new();
        if !thought.trim().is_empty() {
            content.push_str(thought.trim());
            content.push_str("\n\n");
        }
        content.push_str(&format!("```tool\n{}\n```", request));

        let mut msg = Self::assistant(content);
        msg.metadata = Some(MessageMetadata {
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.tool_name.clone()),
            is_error: false,
        });
        msg
    }

    /// Tool observation turn built from a result
    pub fn observation(result: &ToolResult) -> Self {
        let content = if result.is_success() {
            format!("[Tool '{}' returned]\n{}", result.tool_name, result.output.render())
        } else {
            format!("[Tool '{}' failed]\n{}", result.tool_name, result.output.render())
        };

        let mut msg = Self::new(Role::Tool, content);
        msg.metadata = Some(MessageMetadata {
            tool_call_id: Some(result.call_id.clone()),
            tool_name: Some(result.tool_name.clone()),
            is_error: !result.is_success(),
        });
        msg
    }
}

/// Conversation history for one query execution
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ToolArguments, ToolErrorKind, ToolFailure, ToolOutput};
    use std::time::Duration;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_conversation_appends() {
        let mut conv = Conversation::new();
        conv.push(Message::user("Hi"));
        conv.push(Message::assistant("Hello!"));

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.last().unwrap().role, Role::Assistant);
        assert_eq!(conv.messages()[0].content, "Hi");
    }

    #[test]
    fn test_tool_turns_carry_call_id() {
        let mut arguments = ToolArguments::new();
        arguments.insert("symbol".into(), serde_json::json!("SYM"));
        let call = ToolCall::new("get_price", arguments);

        let request = Message::tool_request("Need the price.", &call);
        assert!(request.content.starts_with("Need the price."));
        assert!(request.content.contains("```tool"));
        assert!(request.content.contains("\"symbol\":\"SYM\""));
        assert_eq!(request.metadata.unwrap().tool_call_id.as_deref(), Some(call.id.as_str()));

        let ok = ToolResult::success(&call, ToolOutput::from("100.0"), Duration::from_millis(3));
        let observed = Message::observation(&ok);
        assert_eq!(observed.role, Role::Tool);
        assert_eq!(observed.content, "[Tool 'get_price' returned]\n100.0");

        let failed = ToolResult::failure(
            &call,
            ToolFailure::new(ToolErrorKind::Execution, "unknown symbol"),
            Duration::ZERO,
        );
        let observed = Message::observation(&failed);
        assert!(observed.content.starts_with("[Tool 'get_price' failed]"));
        assert!(observed.metadata.unwrap().is_error);
    }
}
