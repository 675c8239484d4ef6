//! Application State

use std::sync::Arc;

use agent_core::{LlmProvider, Orchestrator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Query orchestrator (reasoner, tools and observability already wired)
    pub orchestrator: Orchestrator,

    /// Model backend, probed by the health check (None when not applicable)
    pub provider: Option<Arc<dyn LlmProvider>>,
}
