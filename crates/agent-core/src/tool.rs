//! Tool System
//!
//! Tools are registered once at startup and invoked by the orchestrator.
//! Every dispatch goes through [`ToolRegistry::invoke`], which validates the
//! arguments against the tool's declared schema, bounds execution with a
//! timeout, and always answers with a [`ToolResult`]: unknown tools, schema
//! violations, handler failures, panics and timeouts all come back as
//! `ToolResult.error` instead of propagating.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::error::AgentError;

/// Argument mapping passed to tool handlers
pub type ToolArguments = serde_json::Map<String, serde_json::Value>;

/// Tool call requested by the reasoning step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the call with its result
    pub id: String,

    /// Tool identifier
    pub tool_name: String,

    /// Arguments as key-value pairs
    pub arguments: ToolArguments,

    pub requested_at: DateTime<Utc>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            arguments,
            requested_at: Utc::now(),
        }
    }
}

/// Payload produced by a tool handler
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl ToolOutput {
    /// Render as text for the conversation
    pub fn render(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Structured(value) => value.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

impl From<serde_json::Value> for ToolOutput {
    fn from(value: serde_json::Value) -> Self {
        ToolOutput::Structured(value)
    }
}

/// Domain failure raised by a tool handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// Category of a failed dispatch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Validation,
    UnknownTool,
    Execution,
    Timeout,
}

/// Error payload carried by a [`ToolResult`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolFailure {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result from tool execution, correlated 1:1 with a [`ToolCall`] by id
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the originating call
    pub call_id: String,

    /// Tool that was called
    pub tool_name: String,

    /// Output (handler payload, or the error text on failure)
    pub output: ToolOutput,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,

    pub duration_ms: u64,

    pub completed_at: DateTime<Utc>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: ToolOutput, duration: Duration) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            output,
            error: None,
            duration_ms: millis(duration),
            completed_at: Utc::now(),
        }
    }

    pub fn failure(call: &ToolCall, failure: ToolFailure, duration: Duration) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            output: ToolOutput::Text(failure.message.clone()),
            error: Some(failure),
            duration_ms: millis(duration),
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The failure expressed in the agent error taxonomy
    pub fn to_agent_error(&self) -> Option<AgentError> {
        let failure = self.error.as_ref()?;
        let tool = self.tool_name.clone();
        Some(match failure.kind {
            ToolErrorKind::Validation => AgentError::Validation {
                tool,
                message: failure.message.clone(),
            },
            ToolErrorKind::UnknownTool => AgentError::UnknownTool(tool),
            ToolErrorKind::Execution => AgentError::ToolExecution {
                tool,
                message: failure.message.clone(),
            },
            ToolErrorKind::Timeout => AgentError::ToolTimeout {
                tool,
                timeout_ms: self.duration_ms,
            },
        })
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_enum(mut self, values: Vec<serde_json::Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    fn accepts(&self, value: &serde_json::Value) -> bool {
        match self.param_type.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            _ => true,
        }
    }
}

/// Tool definition schema (shown to the reasoning step)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            category: None,
        }
    }

    pub fn param(mut self, parameter: ParameterSchema) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Check arguments against the declared parameters.
    ///
    /// Returns the arguments with declared defaults filled in. Arguments the
    /// schema does not mention are passed through untouched.
    pub fn validate(&self, arguments: &ToolArguments) -> std::result::Result<ToolArguments, String> {
        let mut validated = arguments.clone();

        for param in &self.parameters {
            match arguments.get(&param.name) {
                None | Some(serde_json::Value::Null) => {
                    if let Some(default) = &param.default {
                        validated.insert(param.name.clone(), default.clone());
                    } else if param.required {
                        return Err(format!("missing required parameter '{}'", param.name));
                    } else {
                        validated.remove(&param.name);
                    }
                }
                Some(value) => {
                    if !param.accepts(value) {
                        return Err(format!(
                            "parameter '{}' must be of type {}",
                            param.name, param.param_type
                        ));
                    }
                    if let Some(allowed) = &param.enum_values {
                        if !allowed.contains(value) {
                            return Err(format!(
                                "parameter '{}' must be one of {}",
                                param.name,
                                serde_json::Value::Array(allowed.clone())
                            ));
                        }
                    }
                }
            }
        }

        Ok(validated)
    }
}

/// Tool trait - implement to add new capabilities
///
/// Handlers receive arguments that already passed schema validation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with validated arguments
    async fn execute(&self, arguments: &ToolArguments) -> std::result::Result<ToolOutput, ToolError>;
}

/// Closure-backed tool for `register_fn`
pub struct FnTool<F> {
    schema: ToolSchema,
    handler: F,
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(ToolArguments) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<ToolOutput, ToolError>> + Send,
{
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, arguments: &ToolArguments) -> std::result::Result<ToolOutput, ToolError> {
        (self.handler)(arguments.clone()).await
    }
}

struct RegisteredTool {
    schema: ToolSchema,
    handler: Arc<dyn Tool>,
}

/// Registry for available tools
///
/// Read-only once built; share it behind an `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        let name = schema.name.clone();
        if self
            .tools
            .insert(name.clone(), RegisteredTool { schema, handler: tool })
            .is_some()
        {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
        }
    }

    /// Register a closure as a tool under the given schema
    pub fn register_fn<F, Fut>(&mut self, schema: ToolSchema, handler: F)
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<ToolOutput, ToolError>> + Send + 'static,
    {
        self.register(FnTool { schema, handler });
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.handler.clone())
    }

    /// Dispatch a tool call.
    ///
    /// Never fails: every problem is reported through `ToolResult.error`.
    pub async fn invoke(&self, call: &ToolCall, timeout: Duration) -> ToolResult {
        let started = Instant::now();
        let outcome = self.dispatch(call, timeout).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(output) => {
                tracing::debug!(tool = %call.tool_name, call_id = %call.id, duration_ms = millis(elapsed), "Tool succeeded");
                ToolResult::success(call, output, elapsed)
            }
            Err(failure) => {
                tracing::debug!(
                    tool = %call.tool_name,
                    call_id = %call.id,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "Tool failed"
                );
                ToolResult::failure(call, failure, elapsed)
            }
        }
    }

    async fn dispatch(&self, call: &ToolCall, timeout: Duration) -> std::result::Result<ToolOutput, ToolFailure> {
        let entry = self.tools.get(&call.tool_name).ok_or_else(|| {
            ToolFailure::new(
                ToolErrorKind::UnknownTool,
                format!("Unknown tool '{}'. Available tools: {}", call.tool_name, self.names().join(", ")),
            )
        })?;

        let arguments = entry
            .schema
            .validate(&call.arguments)
            .map_err(|message| ToolFailure::new(ToolErrorKind::Validation, message))?;

        let execution = AssertUnwindSafe(entry.handler.execute(&arguments)).catch_unwind();

        match tokio::time::timeout(timeout, execution).await {
            Err(_) => Err(ToolFailure::new(
                ToolErrorKind::Timeout,
                format!("Tool '{}' timed out after {}ms", call.tool_name, millis(timeout)),
            )),
            Ok(Err(_)) => Err(ToolFailure::new(
                ToolErrorKind::Execution,
                format!("Tool '{}' panicked", call.tool_name),
            )),
            Ok(Ok(Err(e))) => Err(ToolFailure::new(ToolErrorKind::Execution, e.to_string())),
            Ok(Ok(Ok(output))) => Ok(output),
        }
    }

    /// Get all tool schemas, ordered by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema.clone()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Generate system prompt section describing available tools
    pub fn generate_prompt_section(&self) -> String {
        render_tool_catalog(&self.schemas())
    }
}

/// Markdown catalog of tools for prompt-driven models
pub fn render_tool_catalog(schemas: &[ToolSchema]) -> String {
    let mut prompt = String::from("## Available Tools\n\n");
    prompt.push_str("You can use the following tools by responding with a JSON block:\n\n");
    prompt.push_str("```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n");
    prompt.push_str("Use one tool at a time and wait for its result.\n\n");

    for schema in schemas {
        prompt.push_str(&format!("### {}\n", schema.name));
        prompt.push_str(&format!("{}\n", schema.description));

        if !schema.parameters.is_empty() {
            prompt.push_str("**Parameters:**\n");
            for param in &schema.parameters {
                let required = if param.required { " (required)" } else { "" };
                prompt.push_str(&format!(
                    "- `{}` ({}){}: {}\n",
                    param.name, param.param_type, required, param.description
                ));
            }
        }
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    fn price_schema() -> ToolSchema {
        ToolSchema::new("get_price", "Look up a price")
            .param(ParameterSchema::required("symbol", "string", "Ticker symbol"))
            .param(
                ParameterSchema::optional("period", "string", "Granularity")
                    .with_default(json!("1d"))
                    .with_enum(vec![json!("1d"), json!("1wk")]),
            )
            .param(ParameterSchema::optional("limit", "integer", "Max rows"))
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_fn(price_schema(), |args: ToolArguments| async move {
            match args.get("symbol").and_then(|v| v.as_str()) {
                Some("SYM") => Ok(ToolOutput::Structured(json!({"price": 100.0}))),
                Some(other) => Err(ToolError::NotFound(format!("unknown symbol {}", other))),
                None => Err(ToolError::InvalidInput("symbol".into())),
            }
        });
        registry.register_fn(ToolSchema::new("slow", "Never finishes"), |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolOutput::from("late"))
        });
        registry.register_fn(ToolSchema::new("explode", "Panics"), |_| async {
            if true {
                panic!("boom");
            }
            Ok(ToolOutput::from("unreachable"))
        });
        registry
    }

    #[test]
    fn test_validate_fills_defaults_and_keeps_extras() {
        let validated = price_schema()
            .validate(&args(json!({"symbol": "SYM", "note": "extra"})))
            .unwrap();
        assert_eq!(validated["period"], json!("1d"));
        assert_eq!(validated["note"], json!("extra"));
    }

    #[test]
    fn test_validate_rejects_bad_arguments() {
        let schema = price_schema();
        assert!(schema.validate(&args(json!({}))).unwrap_err().contains("symbol"));
        assert!(schema.validate(&args(json!({"symbol": null}))).is_err());
        assert!(schema.validate(&args(json!({"symbol": 42}))).unwrap_err().contains("string"));
        assert!(schema
            .validate(&args(json!({"symbol": "SYM", "period": "1y"})))
            .unwrap_err()
            .contains("one of"));
        assert!(schema.validate(&args(json!({"symbol": "SYM", "limit": 1.5}))).is_err());
        assert!(schema.validate(&args(json!({"symbol": "SYM", "limit": 3}))).is_ok());
    }

    #[tokio::test]
    async fn test_invoke_success_correlates_id() {
        let call = ToolCall::new("get_price", args(json!({"symbol": "SYM"})));
        let result = registry().invoke(&call, Duration::from_secs(1)).await;

        assert!(result.is_success());
        assert_eq!(result.call_id, call.id);
        assert_eq!(result.output, ToolOutput::Structured(json!({"price": 100.0})));
    }

    #[tokio::test]
    async fn test_invoke_reports_failures_as_results() {
        let registry = registry();
        let timeout = Duration::from_secs(1);

        let unknown = registry.invoke(&ToolCall::new("nope", ToolArguments::new()), timeout).await;
        assert_eq!(unknown.error.unwrap().kind, ToolErrorKind::UnknownTool);

        let invalid = registry.invoke(&ToolCall::new("get_price", ToolArguments::new()), timeout).await;
        assert_eq!(invalid.error.as_ref().unwrap().kind, ToolErrorKind::Validation);
        assert!(matches!(invalid.to_agent_error(), Some(AgentError::Validation { .. })));

        let failed = registry
            .invoke(&ToolCall::new("get_price", args(json!({"symbol": "BAD"}))), timeout)
            .await;
        let failure = failed.error.unwrap();
        assert_eq!(failure.kind, ToolErrorKind::Execution);
        assert!(failure.message.contains("BAD"));

        let panicked = registry.invoke(&ToolCall::new("explode", ToolArguments::new()), timeout).await;
        assert_eq!(panicked.error.unwrap().kind, ToolErrorKind::Execution);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let result = registry()
            .invoke(&ToolCall::new("slow", ToolArguments::new()), Duration::from_millis(50))
            .await;
        assert_eq!(result.error.unwrap().kind, ToolErrorKind::Timeout);
    }

    #[test]
    fn test_tool_registry() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["explode", "get_price", "slow"]);
        assert!(registry.get("get_price").is_some());
        assert!(registry.get("unknown").is_none());

        let catalog = registry.generate_prompt_section();
        assert!(catalog.contains("### get_price"));
        assert!(catalog.contains("`symbol` (string) (required)"));
    }
}
