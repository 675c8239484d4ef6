//! LangSmith Observability Backend
//!
//! Maps a query trace onto LangSmith runs. The trace is a root `chain` run;
//! reasoning turns become `llm` child runs and each tool call becomes a
//! `tool` child run completed by its result. Runs are held until the trace
//! closes so every run is posted complete, then `flush` ships the queue to
//! `POST {endpoint}/runs/batch` with the `x-api-key` header.

use std::collections::HashMap;
use std::time::Duration;

use agent_core::error::{AgentError, Result};
use agent_core::observability::{ObservabilityAdapter, TraceId, TraceMetadata, TraceOutcome};
use agent_core::step::AgentStep;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::LangSmithConfig;
use crate::outbox::{DEFAULT_OUTBOX_CAPACITY, Outbox};

pub const DEFAULT_LANGSMITH_ENDPOINT: &str = "https://api.smith.langchain.com";
pub const DEFAULT_LANGSMITH_PROJECT: &str = "agent-orchestrator";

struct OpenTrace {
    root: Value,
    order: String,
    children: Vec<Value>,
    tool_runs: HashMap<String, usize>,
}

/// Observability adapter backed by LangSmith
pub struct LangSmithObserver {
    http_client: reqwest::Client,
    config: LangSmithConfig,
    open: Mutex<HashMap<TraceId, OpenTrace>>,
    outbox: Outbox,
}

impl LangSmithObserver {
    /// `request_timeout` should stay below the orchestrator's observer timeout
    pub fn new(mut config: LangSmithConfig, request_timeout: Duration) -> Result<Self> {
        config.endpoint = config.endpoint.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build LangSmith HTTP client: {}", e)))?;

        tracing::info!(endpoint = %config.endpoint, project = %config.project, "LangSmith observability enabled");

        Ok(Self {
            http_client,
            config,
            open: Mutex::new(HashMap::new()),
            outbox: Outbox::new("langsmith", DEFAULT_OUTBOX_CAPACITY),
        })
    }

    /// Runs queued for the next flush
    pub fn pending_runs(&self) -> usize {
        self.outbox.pending()
    }

    async fn send(&self, runs: &[Value]) -> Result<()> {
        let response = self
            .http_client
            .post(format!("{}/runs/batch", self.config.endpoint))
            .header("x-api-key", &self.config.api_key)
            .json(&json!({ "post": runs }))
            .send()
            .await
            .map_err(|e| AgentError::Observability(format!("LangSmith batch request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Observability(format!(
                "LangSmith batch rejected with status {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

/// Sort key LangSmith uses to nest runs: start time then run id, per level
fn dotted_order(parent: Option<&str>, start: DateTime<Utc>, run_id: &str) -> String {
    let own = format!("{}{}", start.format("%Y%m%dT%H%M%S%6fZ"), run_id);
    match parent {
        Some(parent) => format!("{}.{}", parent, own),
        None => own,
    }
}

fn child_run(
    trace: &OpenTrace,
    trace_id: &TraceId,
    run_id: &str,
    name: &str,
    run_type: &str,
    start: DateTime<Utc>,
    inputs: Value,
) -> Value {
    json!({
        "id": run_id,
        "trace_id": trace_id.as_str(),
        "parent_run_id": trace_id.as_str(),
        "dotted_order": dotted_order(Some(&trace.order), start, run_id),
        "name": name,
        "run_type": run_type,
        "start_time": start.to_rfc3339(),
        "inputs": inputs,
    })
}

fn set(run: &mut Value, key: &str, value: Value) {
    if let Some(fields) = run.as_object_mut() {
        fields.insert(key.into(), value);
    }
}

#[async_trait]
impl ObservabilityAdapter for LangSmithObserver {
    fn name(&self) -> &'static str {
        "langsmith"
    }

    async fn open_trace(&self, name: &str, user_id: &str, metadata: &TraceMetadata) -> Result<TraceId> {
        let trace_id = TraceId::new();
        let started = Utc::now();
        let order = dotted_order(None, started, trace_id.as_str());

        let mut extra = metadata.clone();
        let tags = extra.remove("tags").unwrap_or_else(|| json!([]));
        let query = extra.remove("query");
        extra.insert("user_id".into(), json!(user_id));

        let root = json!({
            "id": trace_id.as_str(),
            "trace_id": trace_id.as_str(),
            "dotted_order": order,
            "name": name,
            "run_type": "chain",
            "start_time": started.to_rfc3339(),
            "inputs": { "query": query },
            "session_name": self.config.project,
            "tags": tags,
            "extra": { "metadata": extra },
        });

        self.open.lock().await.insert(
            trace_id.clone(),
            OpenTrace {
                root,
                order,
                children: Vec::new(),
                tool_runs: HashMap::new(),
            },
        );
        Ok(trace_id)
    }

    async fn record_step(&self, trace_id: &TraceId, step: &AgentStep) -> Result<()> {
        let mut open = self.open.lock().await;
        let trace = open
            .get_mut(trace_id)
            .ok_or_else(|| AgentError::Observability(format!("trace {} is not open", trace_id)))?;

        match step {
            AgentStep::Reasoning { thought, at } => {
                let run_id = Uuid::new_v4().to_string();
                let mut run = child_run(trace, trace_id, &run_id, "reasoning", "llm", *at, json!({}));
                set(&mut run, "end_time", json!(at.to_rfc3339()));
                set(&mut run, "outputs", json!({ "thought": thought }));
                trace.children.push(run);
            }
            AgentStep::ToolCall(call) => {
                let run = child_run(
                    trace,
                    trace_id,
                    &call.id,
                    &format!("tool_{}", call.tool_name),
                    "tool",
                    call.requested_at,
                    json!({ "tool": call.tool_name, "input": call.arguments }),
                );
                trace.tool_runs.insert(call.id.clone(), trace.children.len());
                trace.children.push(run);
            }
            AgentStep::ToolResult(result) => {
                let index = trace.tool_runs.remove(&result.call_id).ok_or_else(|| {
                    AgentError::Observability(format!("no tool run for call {}", result.call_id))
                })?;
                if let Some(run) = trace.children.get_mut(index) {
                    set(run, "end_time", json!(result.completed_at.to_rfc3339()));
                    match &result.error {
                        Some(failure) => set(run, "error", json!(failure.message)),
                        None => set(run, "outputs", json!({ "output": result.output })),
                    }
                }
            }
            // Carried by the root run's outputs when the trace closes
            AgentStep::FinalAnswer { .. } | AgentStep::Error { .. } => {}
        }
        Ok(())
    }

    async fn close_trace(&self, trace_id: &TraceId, outcome: &TraceOutcome) -> Result<()> {
        let OpenTrace {
            mut root, children, ..
        } = self
            .open
            .lock()
            .await
            .remove(trace_id)
            .ok_or_else(|| AgentError::Observability(format!("trace {} is not open", trace_id)))?;

        set(&mut root, "end_time", json!(Utc::now().to_rfc3339()));
        match outcome {
            TraceOutcome::Success { answer } => set(&mut root, "outputs", json!({ "answer": answer })),
            TraceOutcome::Error { kind, message } => {
                set(&mut root, "error", json!(message));
                set(&mut root, "outputs", json!({ "kind": kind }));
            }
            TraceOutcome::Cancelled => set(&mut root, "error", json!("cancelled")),
        }

        self.outbox.push(std::iter::once(root).chain(children));
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let Some(batch) = self.outbox.begin() else {
            return Ok(());
        };

        tracing::debug!(runs = batch.events().len(), "Flushing LangSmith runs");
        self.send(batch.events()).await?;
        batch.delivered();
        Ok(())
    }

    fn trace_url(&self, trace_id: &TraceId) -> Option<String> {
        Some(format!(
            "{}/o/default/projects/p/{}/r/{}",
            self.config.endpoint, self.config.project, trace_id
        ))
    }
}
