//! Reasoning Port
//!
//! One reasoning turn: given the conversation so far and the tool catalog,
//! decide on either a tool request or a final answer. The orchestrator
//! drives the ReAct loop around this port; implementations only answer one
//! turn at a time and never touch the conversation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{FinishReason, GenerationOptions, LlmProvider};
use crate::tool::{ToolArguments, ToolSchema, render_tool_catalog};

/// What one reasoning turn decided
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasoningOutcome {
    ToolCall {
        /// Reasoning text that preceded the request (may be empty)
        thought: String,
        tool_name: String,
        arguments: ToolArguments,
    },
    FinalAnswer { answer: String },
}

impl ReasoningOutcome {
    /// Tool request from a JSON object of arguments. Non-object values
    /// become an empty argument map.
    pub fn tool_call(
        thought: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        let arguments = match arguments {
            serde_json::Value::Object(map) => map,
            _ => ToolArguments::new(),
        };
        ReasoningOutcome::ToolCall {
            thought: thought.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn final_answer(answer: impl Into<String>) -> Self {
        ReasoningOutcome::FinalAnswer { answer: answer.into() }
    }
}

/// Port to whatever produces reasoning turns
///
/// Failures that prevent a turn from being produced must be reported as
/// `AgentError::ReasoningUnavailable`.
#[async_trait]
pub trait ReasoningPort: Send + Sync {
    async fn reason(&self, conversation: &Conversation, tools: &[ToolSchema]) -> Result<ReasoningOutcome>;
}

/// Reasoner configuration
#[derive(Clone, Debug)]
pub struct LlmReasonerConfig {
    /// System prompt template
    pub system_prompt: String,

    /// Generation options
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,
}

impl Default for LlmReasonerConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant.

When you need to use a tool, first explain briefly what you need, then respond with a JSON block in this exact format:
```tool
{"tool": "tool_name", "arguments": {"arg1": "value1"}}
```

Request one tool at a time and wait for its result.
After receiving tool results, synthesize them into a helpful response.
If a tool fails, decide whether to retry with different arguments or explain what went wrong.
If you can answer directly without tools, do so.
Be concise and accurate."#;

/// Reasoning port backed by a prompt-driven LLM provider
pub struct LlmReasoner {
    provider: Arc<dyn LlmProvider>,
    config: LlmReasonerConfig,
}

impl LlmReasoner {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmReasonerConfig) -> Self {
        Self { provider, config }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(provider, LlmReasonerConfig::default())
    }

    pub fn config(&self) -> &LlmReasonerConfig {
        &self.config
    }

    /// Build the full system prompt including tool descriptions
    fn build_system_prompt(&self, tools: &[ToolSchema]) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if self.config.inject_tool_descriptions && !tools.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&render_tool_catalog(tools));
        }

        prompt
    }

    fn build_messages(&self, conversation: &Conversation, tools: &[ToolSchema]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(Message::system(self.build_system_prompt(tools)));
        messages.extend(conversation.messages().iter().cloned());
        messages
    }
}

#[async_trait]
impl ReasoningPort for LlmReasoner {
    async fn reason(&self, conversation: &Conversation, tools: &[ToolSchema]) -> Result<ReasoningOutcome> {
        let messages = self.build_messages(conversation, tools);

        let completion = self
            .provider
            .complete(&messages, &self.config.generation)
            .await
            .map_err(|e| match e {
                AgentError::ReasoningUnavailable(_) => e,
                other => AgentError::ReasoningUnavailable(other.to_string()),
            })?;

        if let Some(reason @ (FinishReason::Error | FinishReason::ContentFilter)) = &completion.finish_reason {
            return Err(AgentError::ReasoningUnavailable(format!(
                "model '{}' stopped with {:?}",
                completion.model, reason
            )));
        }
        if let Some(usage) = &completion.usage {
            tracing::debug!(
                model = %completion.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion usage"
            );
        }

        let content = completion.content.trim();
        if content.is_empty() {
            return Err(AgentError::ReasoningUnavailable(format!(
                "model '{}' returned an empty completion",
                completion.model
            )));
        }

        let outcome = parse_response(content);
        if let ReasoningOutcome::ToolCall { tool_name, .. } = &outcome {
            tracing::debug!(tool = %tool_name, model = %completion.model, "Model requested tool");
        }
        Ok(outcome)
    }
}

#[derive(Deserialize)]
struct ToolRequest {
    tool: String,
    #[serde(default)]
    arguments: ToolArguments,
}

/// Turn raw model output into a reasoning outcome
fn parse_response(content: &str) -> ReasoningOutcome {
    match parse_tool_block(content).or_else(|| parse_inline_tool_request(content)) {
        Some((thought, request)) => ReasoningOutcome::ToolCall {
            thought,
            tool_name: request.tool,
            arguments: request.arguments,
        },
        None => ReasoningOutcome::final_answer(content),
    }
}

/// Look for ```tool ... ``` blocks
fn parse_tool_block(content: &str) -> Option<(String, ToolRequest)> {
    const TOOL_START: &str = "```tool";
    const TOOL_END: &str = "```";

    let start_idx = content.find(TOOL_START)?;
    let after_marker = &content[start_idx + TOOL_START.len()..];
    let end_idx = after_marker.find(TOOL_END)?;
    let request = serde_json::from_str(after_marker[..end_idx].trim()).ok()?;

    Some((content[..start_idx].trim().to_string(), request))
}

/// Fallback: raw JSON object with a "tool" key
fn parse_inline_tool_request(content: &str) -> Option<(String, ToolRequest)> {
    if !content.contains(r#""tool""#) {
        return None;
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    let request = serde_json::from_str(&content[start..=end]).ok()?;
    Some((content[..start].trim().to_string(), request))
}

/// Reasoner that replays a fixed script of outcomes
///
/// Once the script runs out it repeats the fallback outcome, or fails with
/// `ReasoningUnavailable` when there is none. Records how often it was asked
/// and how long the conversation was each time.
pub struct ScriptedReasoner {
    script: Mutex<VecDeque<Result<ReasoningOutcome>>>,
    fallback: Option<ReasoningOutcome>,
    calls: AtomicUsize,
    observed: Mutex<Vec<usize>>,
}

impl ScriptedReasoner {
    pub fn new(script: impl IntoIterator<Item = Result<ReasoningOutcome>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
            calls: AtomicUsize::new(0),
            observed: Mutex::new(Vec::new()),
        }
    }

    pub fn from_outcomes(outcomes: impl IntoIterator<Item = ReasoningOutcome>) -> Self {
        Self::new(outcomes.into_iter().map(Ok))
    }

    /// Answer every turn with the same outcome
    pub fn repeating(outcome: ReasoningOutcome) -> Self {
        Self::new(Vec::new()).then_repeat(outcome)
    }

    pub fn then_repeat(mut self, outcome: ReasoningOutcome) -> Self {
        self.fallback = Some(outcome);
        self
    }

    /// Number of reasoning turns requested so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conversation length seen on each turn
    pub async fn observed_lengths(&self) -> Vec<usize> {
        self.observed.lock().await.clone()
    }
}

#[async_trait]
impl ReasoningPort for ScriptedReasoner {
    async fn reason(&self, conversation: &Conversation, _tools: &[ToolSchema]) -> Result<ReasoningOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.observed.lock().await.push(conversation.len());

        match self.script.lock().await.pop_front() {
            Some(next) => next,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AgentError::ReasoningUnavailable("script exhausted".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Completion, ModelInfo, ProviderInfo};
    use crate::tool::ParameterSchema;
    use serde_json::json;

    struct CannedProvider {
        reply: std::result::Result<String, String>,
        finish: Option<FinishReason>,
        seen: std::sync::Mutex<Vec<Message>>,
    }

    impl CannedProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                finish: Some(FinishReason::Stop),
                seen: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn stopping_with(reply: &str, finish: FinishReason) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                finish: Some(finish),
                seen: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                finish: None,
                seen: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn info(&self) -> Result<ProviderInfo> {
            Ok(ProviderInfo {
                name: "canned".into(),
                models: Vec::new(),
                supports_tools: false,
            })
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
            *self.seen.lock().unwrap() = messages.to_vec();
            match &self.reply {
                Ok(content) => Ok(Completion {
                    content: content.clone(),
                    model: options.model.clone(),
                    usage: None,
                    finish_reason: self.finish.clone(),
                }),
                Err(message) => Err(AgentError::Config(message.clone())),
            }
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    fn tools() -> Vec<ToolSchema> {
        vec![ToolSchema::new("get_price", "Latest price").param(ParameterSchema::required(
            "symbol",
            "string",
            "Ticker",
        ))]
    }

    fn conversation() -> Conversation {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("price of SYM"));
        conversation
    }

    #[test]
    fn test_parse_tool_block_with_thought() {
        let content = r#"Let me check that for you.
```tool
{"tool": "get_price", "arguments": {"symbol": "SYM"}}
```"#;

        let outcome = parse_response(content);
        assert_eq!(
            outcome,
            ReasoningOutcome::tool_call("Let me check that for you.", "get_price", json!({"symbol": "SYM"}))
        );
    }

    #[test]
    fn test_parse_inline_and_plain_answers() {
        let inline = parse_response(r#"{"tool": "get_price", "arguments": {"symbol": "SYM"}}"#);
        assert!(matches!(inline, ReasoningOutcome::ToolCall { ref thought, .. } if thought.is_empty()));

        let no_args = parse_response(r#"```tool
{"tool": "list_everything"}
```"#);
        assert!(matches!(no_args, ReasoningOutcome::ToolCall { ref arguments, .. } if arguments.is_empty()));

        assert_eq!(
            parse_response("SYM is 100.0"),
            ReasoningOutcome::final_answer("SYM is 100.0")
        );
        // Malformed JSON is an answer, not a request
        assert!(matches!(
            parse_response("```tool\n{\"tool\": \n```"),
            ReasoningOutcome::FinalAnswer { .. }
        ));
    }

    #[tokio::test]
    async fn test_llm_reasoner_injects_catalog() {
        let provider = CannedProvider::replying("SYM is 100.0");
        let reasoner = LlmReasoner::with_defaults(provider.clone());

        let outcome = reasoner.reason(&conversation(), &tools()).await.unwrap();
        assert_eq!(outcome, ReasoningOutcome::final_answer("SYM is 100.0"));

        let seen = provider.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].content.contains("### get_price"));
        assert_eq!(seen[1].content, "price of SYM");
    }

    #[tokio::test]
    async fn test_llm_reasoner_maps_failures() {
        let reasoner = LlmReasoner::with_defaults(CannedProvider::failing("connection refused"));
        let err = reasoner.reason(&conversation(), &tools()).await.unwrap_err();
        assert!(matches!(err, AgentError::ReasoningUnavailable(ref m) if m.contains("connection refused")));

        let reasoner = LlmReasoner::with_defaults(CannedProvider::replying("   "));
        let err = reasoner.reason(&conversation(), &tools()).await.unwrap_err();
        assert!(matches!(err, AgentError::ReasoningUnavailable(_)));

        let reasoner = LlmReasoner::with_defaults(CannedProvider::stopping_with("SYM is", FinishReason::ContentFilter));
        let err = reasoner.reason(&conversation(), &tools()).await.unwrap_err();
        assert!(matches!(err, AgentError::ReasoningUnavailable(ref m) if m.contains("ContentFilter")));

        // Truncated output is still an answer
        let reasoner = LlmReasoner::with_defaults(CannedProvider::stopping_with("SYM is 100", FinishReason::Length));
        assert!(reasoner.reason(&conversation(), &tools()).await.is_ok());
    }

    #[tokio::test]
    async fn test_scripted_reasoner_replays_then_repeats() {
        let reasoner = ScriptedReasoner::from_outcomes([ReasoningOutcome::final_answer("first")])
            .then_repeat(ReasoningOutcome::final_answer("again"));
        let conv = conversation();

        assert_eq!(reasoner.reason(&conv, &[]).await.unwrap(), ReasoningOutcome::final_answer("first"));
        assert_eq!(reasoner.reason(&conv, &[]).await.unwrap(), ReasoningOutcome::final_answer("again"));
        assert_eq!(reasoner.calls(), 2);
        assert_eq!(reasoner.observed_lengths().await, vec![1, 1]);

        let exhausted = ScriptedReasoner::new(Vec::new());
        assert!(matches!(
            exhausted.reason(&conv, &[]).await,
            Err(AgentError::ReasoningUnavailable(_))
        ));
    }
}
