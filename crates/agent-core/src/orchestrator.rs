//! Query Orchestrator
//!
//! Runs one query through the ReAct loop:
//!
//! ```text
//! STARTED ─► REASONING ─┬─► DISPATCHING_TOOL ─► OBSERVING ─┐
//!               ▲       │                                   │
//!               └───────┼───────────────────────────────────┘
//!                       ├─► FINALIZED   (final answer)
//!                       └─► FAILED      (reasoning unavailable, ceiling,
//!                                        timeout, cancel)
//! ```
//!
//! Every step is published once through a [`StepPublisher`], which feeds the
//! trace and, for streaming callers, the event stream. The trace is opened
//! before the loop starts and closed exactly once however the loop ends.
//!
//! The query deadline and cancellation interrupt only the awaits on the
//! reasoner and on tools. A publish that has started always reaches every
//! observer, so the trace and the stream never disagree.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::observability::{NoopObserver, ObservabilityAdapter, TraceId, TraceMetadata, TraceOutcome, TraceRecorder};
use crate::reasoning::{ReasoningOutcome, ReasoningPort};
use crate::step::{AgentStep, StreamEvent};
use crate::stream::{QueryStream, StepPublisher, StreamEmitter};
use crate::tool::{Tool, ToolCall, ToolRegistry, ToolSchema};

/// An incoming question, read-only for the whole execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    user_id: String,
    #[serde(default)]
    trace_metadata: TraceMetadata,
}

impl Query {
    pub fn new(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: user_id.into(),
            trace_metadata: TraceMetadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.trace_metadata.insert(key.into(), value);
        self
    }

    pub fn with_trace_metadata(mut self, metadata: TraceMetadata) -> Self {
        self.trace_metadata.extend(metadata);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn trace_metadata(&self) -> &TraceMetadata {
        &self.trace_metadata
    }
}

/// What to do when a tool request names an unknown tool or carries invalid
/// arguments
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchFailurePolicy {
    /// Feed the error back to the model as an observation
    #[default]
    Recoverable,
    /// End the query
    Fatal,
}

impl DispatchFailurePolicy {
    fn aborts_on(self, error: &AgentError) -> bool {
        error.is_fatal()
            || (self == DispatchFailurePolicy::Fatal
                && matches!(error, AgentError::Validation { .. } | AgentError::UnknownTool(_)))
    }
}

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Name given to every trace
    pub trace_name: String,

    /// Tags attached to every trace
    pub trace_tags: Vec<String>,

    /// Maximum tool dispatches per query
    pub max_iterations: usize,

    /// Time budget for a single tool call
    pub tool_timeout: Duration,

    /// Time budget for the whole reasoning loop
    pub query_timeout: Duration,

    /// Time budget for each observability call
    pub observer_timeout: Duration,

    /// Capacity of the per-query event channel
    pub stream_buffer: usize,

    pub dispatch_failures: DispatchFailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            trace_name: "agent_query".into(),
            trace_tags: vec!["agent_query".into()],
            max_iterations: 10,
            tool_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(120),
            observer_timeout: Duration::from_secs(5),
            stream_buffer: 32,
            dispatch_failures: DispatchFailurePolicy::Recoverable,
        }
    }
}

/// Terminal value of a successful query
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub steps: Vec<AgentStep>,
    pub trace_id: TraceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_url: Option<String>,
    pub execution_time_ms: u64,
}

/// Terminal value of a failed query
#[derive(Debug, Error)]
#[error("{error}")]
pub struct QueryFailure {
    #[source]
    pub error: AgentError,

    /// Steps published before the failure, ending with the error step
    pub steps: Vec<AgentStep>,

    /// Absent when the query was rejected before a trace was opened
    pub trace_id: Option<TraceId>,
}

impl QueryFailure {
    fn rejected(error: AgentError) -> Self {
        Self {
            error,
            steps: Vec::new(),
            trace_id: None,
        }
    }
}

/// Drives queries through reasoning and tool dispatch
///
/// Cheap to clone; every query gets its own conversation, trace and step
/// sequence, so one orchestrator serves concurrent queries.
#[derive(Clone)]
pub struct Orchestrator {
    reasoner: Arc<dyn ReasoningPort>,
    tools: Arc<ToolRegistry>,
    observer: Arc<dyn ObservabilityAdapter>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        reasoner: Arc<dyn ReasoningPort>,
        tools: Arc<ToolRegistry>,
        observer: Arc<dyn ObservabilityAdapter>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            reasoner,
            tools,
            observer,
            config,
        }
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Name of the observability backend in use
    pub fn observer_name(&self) -> &'static str {
        self.observer.name()
    }

    /// Run a query to completion
    pub async fn execute(&self, query: Query) -> std::result::Result<QueryResult, QueryFailure> {
        self.execute_with_cancel(query, CancellationToken::new()).await
    }

    /// Run a query to completion, stopping early if `cancel` fires
    pub async fn execute_with_cancel(
        &self,
        query: Query,
        cancel: CancellationToken,
    ) -> std::result::Result<QueryResult, QueryFailure> {
        self.run(query, cancel, None).await
    }

    /// Run a query in the background and stream its steps.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream(&self, query: Query, cancel: CancellationToken) -> QueryStream {
        let (sender, receiver) = mpsc::channel(self.config.stream_buffer.max(1));
        let token = cancel.child_token();
        let task_token = token.clone();
        let orchestrator = self.clone();

        let task = tokio::spawn(async move {
            let emitter = StreamEmitter::new(sender, task_token.clone());
            let result = orchestrator.run(query, task_token, Some(&emitter)).await;

            // Rejected before a trace existed: nothing was streamed yet
            if let Err(failure) = &result {
                if failure.trace_id.is_none() {
                    emitter.emit(StreamEvent::error(&failure.error)).await.ok();
                }
            }
            result
        });

        QueryStream::new(receiver, task, token)
    }

    async fn run(
        &self,
        query: Query,
        cancel: CancellationToken,
        emitter: Option<&StreamEmitter>,
    ) -> std::result::Result<QueryResult, QueryFailure> {
        let started = Instant::now();

        if query.text().trim().is_empty() {
            return Err(QueryFailure::rejected(AgentError::InvalidQuery(
                "query text must not be empty".into(),
            )));
        }

        let mut metadata = query.trace_metadata().clone();
        metadata
            .entry("tags".into())
            .or_insert_with(|| serde_json::json!(self.config.trace_tags));
        metadata
            .entry("query".into())
            .or_insert_with(|| serde_json::json!(query.text()));

        let recorder = TraceRecorder::open(
            self.observer.clone(),
            self.config.observer_timeout,
            &self.config.trace_name,
            query.user_id(),
            &metadata,
        )
        .await;
        tracing::info!(trace_id = %recorder.trace_id(), user_id = query.user_id(), "Query started");

        let mut publisher = StepPublisher::new(cancel.clone()).observe(&recorder);
        if let Some(emitter) = emitter {
            publisher = publisher.observe(emitter);
        }

        let mut conversation = Conversation::new();
        conversation.push(Message::user(query.text()));

        let interrupts = Interrupts {
            cancel: &cancel,
            deadline: tokio::time::Instant::now().checked_add(self.config.query_timeout),
            limit: self.config.query_timeout,
        };
        let outcome = self.drive(&mut conversation, &mut publisher, &interrupts).await;

        if let Err(error) = &outcome {
            if !matches!(error, AgentError::Cancelled) {
                if let Err(e) = publisher.publish(AgentStep::error(error)).await {
                    tracing::debug!(error = %e, "Error step not delivered");
                }
            }
        }

        let steps = publisher.into_steps();
        let trace_outcome = match &outcome {
            Ok(answer) => TraceOutcome::Success { answer: answer.clone() },
            Err(error) => TraceOutcome::from_error(error),
        };
        let trace_url = recorder.trace_url();
        let trace_id = recorder.close(&trace_outcome).await;
        let execution_time_ms = millis(started.elapsed());

        match outcome {
            Ok(answer) => {
                tracing::info!(%trace_id, steps = steps.len(), execution_time_ms, "Query finalized");
                Ok(QueryResult {
                    answer,
                    steps,
                    trace_id,
                    trace_url,
                    execution_time_ms,
                })
            }
            Err(error) => {
                if matches!(error, AgentError::Cancelled) {
                    tracing::info!(%trace_id, steps = steps.len(), "Query cancelled");
                } else {
                    tracing::warn!(%trace_id, kind = error.kind(), error = %error, "Query failed");
                }
                Err(QueryFailure {
                    error,
                    steps,
                    trace_id: Some(trace_id),
                })
            }
        }
    }

    /// The reasoning loop proper. Returns the final answer.
    async fn drive(
        &self,
        conversation: &mut Conversation,
        publisher: &mut StepPublisher<'_>,
        interrupts: &Interrupts<'_>,
    ) -> Result<String> {
        let schemas = self.tools.schemas();
        let mut dispatched = 0;

        loop {
            tracing::debug!(iteration = dispatched, turns = conversation.len(), "Reasoning");

            let outcome = interrupts.check(self.consult(conversation, &schemas)).await??;

            let (thought, tool_name, arguments) = match outcome {
                ReasoningOutcome::FinalAnswer { answer } => {
                    conversation.push(Message::assistant(&answer));
                    publisher.publish(AgentStep::final_answer(&answer)).await?;
                    return Ok(answer);
                }
                ReasoningOutcome::ToolCall {
                    thought,
                    tool_name,
                    arguments,
                } => (thought, tool_name, arguments),
            };

            if dispatched >= self.config.max_iterations {
                return Err(AgentError::MaxIterationsExceeded(self.config.max_iterations));
            }
            dispatched += 1;

            publisher.publish(AgentStep::reasoning(&thought)).await?;
            let call = ToolCall::new(tool_name, arguments);
            conversation.push(Message::tool_request(&thought, &call));
            publisher.publish(AgentStep::ToolCall(call.clone())).await?;

            tracing::debug!(tool = %call.tool_name, call_id = %call.id, iteration = dispatched, "Dispatching tool");
            let result = interrupts
                .check(self.tools.invoke(&call, self.config.tool_timeout))
                .await?;
            publisher.publish(AgentStep::ToolResult(result.clone())).await?;

            if let Some(error) = result.to_agent_error() {
                if self.config.dispatch_failures.aborts_on(&error) {
                    return Err(error);
                }
            }

            conversation.push(Message::observation(&result));
        }
    }

    /// One reasoning turn; every failure, panics included, is `ReasoningUnavailable`
    async fn consult(&self, conversation: &Conversation, schemas: &[ToolSchema]) -> Result<ReasoningOutcome> {
        match AssertUnwindSafe(self.reasoner.reason(conversation, schemas))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(error @ AgentError::ReasoningUnavailable(_))) => Err(error),
            Ok(Err(other)) => Err(AgentError::ReasoningUnavailable(other.to_string())),
            Err(_) => {
                tracing::error!("Reasoner panicked");
                Err(AgentError::ReasoningUnavailable("reasoner panicked".into()))
            }
        }
    }
}

/// Cancellation and deadline for one query
struct Interrupts<'a> {
    cancel: &'a CancellationToken,
    /// `None` when the limit is too large to represent
    deadline: Option<tokio::time::Instant>,
    limit: Duration,
}

impl Interrupts<'_> {
    /// Await `future` unless the query is cancelled or out of time first
    async fn check<F: Future>(&self, future: F) -> Result<F::Output> {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(AgentError::Cancelled),
            () = expired => Err(AgentError::QueryTimeout(millis(self.limit))),
            output = future => Ok(output),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for Orchestrator configuration
pub struct OrchestratorBuilder {
    reasoner: Option<Arc<dyn ReasoningPort>>,
    tools: ToolRegistry,
    observer: Arc<dyn ObservabilityAdapter>,
    config: OrchestratorConfig,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            reasoner: None,
            tools: ToolRegistry::new(),
            observer: Arc::new(NoopObserver),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn reasoner(mut self, reasoner: Arc<dyn ReasoningPort>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ObservabilityAdapter>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn trace_name(mut self, name: impl Into<String>) -> Self {
        self.config.trace_name = name.into();
        self
    }

    pub fn trace_tags(mut self, tags: Vec<String>) -> Self {
        self.config.trace_tags = tags;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tool_timeout = timeout;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    pub fn observer_timeout(mut self, timeout: Duration) -> Self {
        self.config.observer_timeout = timeout;
        self
    }

    pub fn stream_buffer(mut self, capacity: usize) -> Self {
        self.config.stream_buffer = capacity;
        self
    }

    pub fn dispatch_failures(mut self, policy: DispatchFailurePolicy) -> Self {
        self.config.dispatch_failures = policy;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let reasoner = self
            .reasoner
            .ok_or_else(|| AgentError::Config("Reasoner is required".into()))?;

        if self.config.stream_buffer == 0 {
            return Err(AgentError::Config("stream_buffer must be at least 1".into()));
        }

        Ok(Orchestrator::new(
            reasoner,
            Arc::new(self.tools),
            self.observer,
            self.config,
        ))
    }
}
