//! # agent-core
//!
//! Orchestration core for tool-using agents: a ReAct loop that alternates
//! reasoning turns with tool calls, streams every step to the caller and
//! records the same steps to an observability backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                            │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │ ReasoningPort│   │ ToolRegistry │   │ ObservabilityAdapter │  │
//! │  │ (LlmReasoner)│   │  (dispatch)  │   │ (noop/memory/log/..) │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────────┘  │
//! │            │                 │                    ▲              │
//! │            └──── StepPublisher ───────────────────┤              │
//! │                              └──► StreamEmitter ──┼──► caller    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The reasoning port, the tools and the observability backend are all
//! passed in at construction time, so swapping a model or a tracing
//! backend never touches the loop itself.

pub mod error;
pub mod message;
pub mod observability;
pub mod orchestrator;
pub mod provider;
pub mod reasoning;
pub mod step;
pub mod stream;
pub mod tool;

pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role};
pub use observability::{
    InMemoryObserver, LoggingObserver, NoopObserver, ObservabilityAdapter, TraceId, TraceMetadata, TraceOutcome,
};
pub use orchestrator::{
    DispatchFailurePolicy, Orchestrator, OrchestratorBuilder, OrchestratorConfig, Query, QueryFailure, QueryResult,
};
pub use provider::LlmProvider;
pub use reasoning::{LlmReasoner, LlmReasonerConfig, ReasoningOutcome, ReasoningPort, ScriptedReasoner};
pub use step::{AgentStep, StreamEvent};
pub use stream::QueryStream;
pub use tool::{Tool, ToolCall, ToolError, ToolOutput, ToolRegistry, ToolResult, ToolSchema};

pub use tokio_util::sync::CancellationToken;
