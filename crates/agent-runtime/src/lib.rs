//! # agent-runtime
//!
//! Concrete collaborators for `agent-core`, chosen by configuration.
//!
//! ## Providers
//!
//! - **Ollama** (default feature): local LLM inference behind `LlmProvider`
//!
//! ## Observability
//!
//! - **Langfuse**: batched trace ingestion
//! - **LangSmith**: traces posted as nested runs
//! - `none`, `log` and `memory` map to the adapters shipped by `agent-core`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{OllamaProvider, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_env()?;
//! let provider = Arc::new(OllamaProvider::from_config(config.ollama.clone()));
//! let orchestrator = Orchestrator::builder()
//!     .reasoner(Arc::new(LlmReasoner::with_defaults(provider)))
//!     .observer(config.build_observer()?)
//!     .config(config.orchestrator_config())
//!     .build()?;
//! ```

pub mod config;
pub mod langfuse;
pub mod langsmith;
mod outbox;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use config::{LangSmithConfig, LangfuseConfig, ObservabilityConfig, OllamaConfig, RuntimeConfig};
pub use langfuse::LangfuseObserver;
pub use langsmith::LangSmithObserver;

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;
