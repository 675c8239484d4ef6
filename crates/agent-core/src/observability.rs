//! Observability Adapters
//!
//! One trace per query. The orchestrator opens it before the first step,
//! records every published step into it and closes it exactly once with a
//! [`TraceOutcome`]. Backends are interchangeable behind
//! [`ObservabilityAdapter`] and are picked at construction time.
//!
//! Adapter failures never reach the query: the orchestrator only talks to
//! adapters through a [`TraceRecorder`], which bounds every call with a
//! timeout and logs and swallows errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::step::AgentStep;

/// Opaque trace handle
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Free-form key-value metadata attached to a trace
pub type TraceMetadata = BTreeMap<String, serde_json::Value>;

/// How a query ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceOutcome {
    Success { answer: String },
    Error { kind: String, message: String },
    Cancelled,
}

impl TraceOutcome {
    pub fn from_error(error: &AgentError) -> Self {
        match error {
            AgentError::Cancelled => TraceOutcome::Cancelled,
            other => TraceOutcome::Error {
                kind: other.kind().to_string(),
                message: other.to_string(),
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TraceOutcome::Success { .. } => "success",
            TraceOutcome::Error { .. } => "error",
            TraceOutcome::Cancelled => "cancelled",
        }
    }
}

/// A complete trace as kept by [`InMemoryObserver`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: TraceId,
    pub name: String,
    pub user_id: String,
    pub metadata: TraceMetadata,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<TraceOutcome>,
    pub steps: Vec<AgentStep>,
}

impl Trace {
    pub fn is_closed(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Observability backend
///
/// Errors are reported as `AgentError::Observability`; callers treat them
/// as diagnostics only.
#[async_trait]
pub trait ObservabilityAdapter: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    async fn open_trace(&self, name: &str, user_id: &str, metadata: &TraceMetadata) -> Result<TraceId>;

    async fn record_step(&self, trace_id: &TraceId, step: &AgentStep) -> Result<()>;

    async fn close_trace(&self, trace_id: &TraceId, outcome: &TraceOutcome) -> Result<()>;

    /// Push anything buffered to the backend
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Link to the trace in the backend UI, if it has one
    fn trace_url(&self, _trace_id: &TraceId) -> Option<String> {
        None
    }
}

/// Adapter that records nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

#[async_trait]
impl ObservabilityAdapter for NoopObserver {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn open_trace(&self, _name: &str, _user_id: &str, _metadata: &TraceMetadata) -> Result<TraceId> {
        Ok(TraceId::new())
    }

    async fn record_step(&self, _trace_id: &TraceId, _step: &AgentStep) -> Result<()> {
        Ok(())
    }

    async fn close_trace(&self, _trace_id: &TraceId, _outcome: &TraceOutcome) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct InMemoryState {
    traces: Vec<Trace>,
    closes: HashMap<TraceId, usize>,
}

impl InMemoryState {
    fn trace_mut(&mut self, trace_id: &TraceId) -> Result<&mut Trace> {
        self.traces
            .iter_mut()
            .find(|t| &t.trace_id == trace_id)
            .ok_or_else(|| AgentError::Observability(format!("unknown trace {}", trace_id)))
    }
}

/// Adapter that keeps whole traces in memory
///
/// Useful in tests and for local inspection. Closing a trace twice is
/// reported as an error but still counted.
#[derive(Default)]
pub struct InMemoryObserver {
    state: RwLock<InMemoryState>,
}

impl InMemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// All traces in the order they were opened
    pub async fn traces(&self) -> Vec<Trace> {
        self.state.read().await.traces.clone()
    }

    pub async fn trace(&self, trace_id: &TraceId) -> Option<Trace> {
        self.state
            .read()
            .await
            .traces
            .iter()
            .find(|t| &t.trace_id == trace_id)
            .cloned()
    }

    /// How many times `close_trace` was called for a trace
    pub async fn close_count(&self, trace_id: &TraceId) -> usize {
        self.state.read().await.closes.get(trace_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ObservabilityAdapter for InMemoryObserver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open_trace(&self, name: &str, user_id: &str, metadata: &TraceMetadata) -> Result<TraceId> {
        let trace = Trace {
            trace_id: TraceId::new(),
            name: name.to_string(),
            user_id: user_id.to_string(),
            metadata: metadata.clone(),
            started_at: Utc::now(),
            ended_at: None,
            outcome: None,
            steps: Vec::new(),
        };
        let trace_id = trace.trace_id.clone();
        self.state.write().await.traces.push(trace);
        Ok(trace_id)
    }

    async fn record_step(&self, trace_id: &TraceId, step: &AgentStep) -> Result<()> {
        let mut state = self.state.write().await;
        let trace = state.trace_mut(trace_id)?;
        if trace.is_closed() {
            return Err(AgentError::Observability(format!("trace {} is already closed", trace_id)));
        }
        trace.steps.push(step.clone());
        Ok(())
    }

    async fn close_trace(&self, trace_id: &TraceId, outcome: &TraceOutcome) -> Result<()> {
        let mut state = self.state.write().await;
        *state.closes.entry(trace_id.clone()).or_insert(0) += 1;

        let trace = state.trace_mut(trace_id)?;
        if trace.is_closed() {
            return Err(AgentError::Observability(format!("trace {} closed twice", trace_id)));
        }
        trace.ended_at = Some(Utc::now());
        trace.outcome = Some(outcome.clone());
        Ok(())
    }
}

/// Adapter that writes the trace as `tracing` events
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingObserver;

#[async_trait]
impl ObservabilityAdapter for LoggingObserver {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn open_trace(&self, name: &str, user_id: &str, metadata: &TraceMetadata) -> Result<TraceId> {
        let trace_id = TraceId::new();
        tracing::info!(%trace_id, trace = name, user_id, metadata = ?metadata, "Trace opened");
        Ok(trace_id)
    }

    async fn record_step(&self, trace_id: &TraceId, step: &AgentStep) -> Result<()> {
        let payload = serde_json::to_string(step)?;
        tracing::info!(%trace_id, step = step.event_type(), %payload, "Trace step");
        Ok(())
    }

    async fn close_trace(&self, trace_id: &TraceId, outcome: &TraceOutcome) -> Result<()> {
        match outcome {
            TraceOutcome::Error { kind, message } => {
                tracing::warn!(%trace_id, outcome = outcome.as_str(), kind, message, "Trace closed");
            }
            _ => tracing::info!(%trace_id, outcome = outcome.as_str(), "Trace closed"),
        }
        Ok(())
    }
}

/// Fault-isolating handle on one open trace
///
/// Every adapter call is bounded by `timeout`; failures are logged at warn
/// and dropped. If the backend cannot open a trace a local id is used so the
/// query still has a handle to report.
pub struct TraceRecorder {
    adapter: Arc<dyn ObservabilityAdapter>,
    timeout: Duration,
    trace_id: TraceId,
}

impl TraceRecorder {
    pub async fn open(
        adapter: Arc<dyn ObservabilityAdapter>,
        timeout: Duration,
        name: &str,
        user_id: &str,
        metadata: &TraceMetadata,
    ) -> Self {
        let opened = guarded(
            adapter.name(),
            "open_trace",
            timeout,
            adapter.open_trace(name, user_id, metadata),
        )
        .await;

        Self {
            trace_id: opened.unwrap_or_default(),
            adapter,
            timeout,
        }
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    pub fn trace_url(&self) -> Option<String> {
        self.adapter.trace_url(&self.trace_id)
    }

    pub async fn record(&self, step: &AgentStep) {
        guarded(
            self.adapter.name(),
            "record_step",
            self.timeout,
            self.adapter.record_step(&self.trace_id, step),
        )
        .await;
    }

    /// Close the trace and flush the backend. Consumes the recorder so a
    /// trace cannot be closed twice.
    pub async fn close(self, outcome: &TraceOutcome) -> TraceId {
        let name = self.adapter.name();
        guarded(name, "close_trace", self.timeout, self.adapter.close_trace(&self.trace_id, outcome)).await;
        guarded(name, "flush", self.timeout, self.adapter.flush()).await;
        self.trace_id
    }
}

async fn guarded<T, F>(adapter: &'static str, operation: &'static str, timeout: Duration, call: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!(adapter, operation, error = %e, "Observability call failed");
            None
        }
        Err(_) => {
            tracing::warn!(adapter, operation, timeout = ?timeout, "Observability call timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenObserver;

    #[async_trait]
    impl ObservabilityAdapter for BrokenObserver {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn open_trace(&self, _: &str, _: &str, _: &TraceMetadata) -> Result<TraceId> {
            Err(AgentError::Observability("backend down".into()))
        }

        async fn record_step(&self, _: &TraceId, _: &AgentStep) -> Result<()> {
            std::future::pending().await
        }

        async fn close_trace(&self, _: &TraceId, _: &TraceOutcome) -> Result<()> {
            Err(AgentError::Observability("backend down".into()))
        }
    }

    #[tokio::test]
    async fn test_in_memory_records_whole_trace() {
        let observer = InMemoryObserver::new();
        let mut metadata = TraceMetadata::new();
        metadata.insert("source".into(), serde_json::json!("test"));

        let id = observer.open_trace("agent_query", "user-1", &metadata).await.unwrap();
        observer.record_step(&id, &AgentStep::final_answer("done")).await.unwrap();
        observer
            .close_trace(&id, &TraceOutcome::Success { answer: "done".into() })
            .await
            .unwrap();

        let trace = observer.trace(&id).await.unwrap();
        assert_eq!(trace.user_id, "user-1");
        assert_eq!(trace.metadata["source"], "test");
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.outcome.unwrap().as_str(), "success");
        assert!(trace.ended_at.is_some());
        assert_eq!(observer.close_count(&id).await, 1);
    }

    #[tokio::test]
    async fn test_in_memory_rejects_use_after_close() {
        let observer = InMemoryObserver::new();
        let id = observer.open_trace("t", "u", &TraceMetadata::new()).await.unwrap();
        observer.close_trace(&id, &TraceOutcome::Cancelled).await.unwrap();

        assert!(observer.record_step(&id, &AgentStep::reasoning("late")).await.is_err());
        assert!(observer.close_trace(&id, &TraceOutcome::Cancelled).await.is_err());
        assert_eq!(observer.close_count(&id).await, 2);
        assert!(observer
            .record_step(&TraceId::from_string("missing"), &AgentStep::reasoning("x"))
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorder_swallows_failures() {
        let recorder = TraceRecorder::open(
            Arc::new(BrokenObserver),
            Duration::from_secs(5),
            "t",
            "u",
            &TraceMetadata::new(),
        )
        .await;

        assert!(!recorder.trace_id().as_str().is_empty());
        recorder.record(&AgentStep::reasoning("hangs")).await;
        let id = recorder.trace_id().clone();
        assert_eq!(recorder.close(&TraceOutcome::Cancelled).await, id);
    }

    #[test]
    fn test_outcome_from_error() {
        assert_eq!(TraceOutcome::from_error(&AgentError::Cancelled), TraceOutcome::Cancelled);
        let outcome = TraceOutcome::from_error(&AgentError::MaxIterationsExceeded(10));
        assert_eq!(outcome.as_str(), "error");
        assert!(matches!(outcome, TraceOutcome::Error { kind, .. } if kind == "max_iterations_exceeded"));
    }
}
