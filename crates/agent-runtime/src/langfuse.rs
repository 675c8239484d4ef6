//! Langfuse Observability Backend
//!
//! Maps a query trace onto the Langfuse ingestion API. Events are buffered
//! per trace while the query runs; closing the trace moves them to the
//! outgoing queue and `flush` ships the queue as one batch to
//! `POST {host}/api/public/ingestion` using basic auth. A batch that fails
//! to send stays queued for the next flush.
//!
//! | Step | Ingestion event |
//! |------|-----------------|
//! | open / close | `trace-create` (upsert) |
//! | reasoning | `generation-create` |
//! | tool call | `span-create` |
//! | tool result | `span-update` on the call's span |
//! | final answer / error | `event-create` |

use std::collections::HashMap;
use std::time::Duration;

use agent_core::error::{AgentError, Result};
use agent_core::observability::{ObservabilityAdapter, TraceId, TraceMetadata, TraceOutcome};
use agent_core::step::AgentStep;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::LangfuseConfig;
use crate::outbox::{DEFAULT_OUTBOX_CAPACITY, Outbox};

pub const DEFAULT_LANGFUSE_HOST: &str = "https://us.cloud.langfuse.com";

/// Observability adapter backed by Langfuse
pub struct LangfuseObserver {
    http_client: reqwest::Client,
    config: LangfuseConfig,
    open: Mutex<HashMap<TraceId, Vec<Value>>>,
    outbox: Outbox,
}

impl LangfuseObserver {
    /// `request_timeout` should stay below the orchestrator's observer timeout
    pub fn new(mut config: LangfuseConfig, request_timeout: Duration) -> Result<Self> {
        config.host = config.host.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build Langfuse HTTP client: {}", e)))?;

        tracing::info!(host = %config.host, "Langfuse observability enabled");

        Ok(Self {
            http_client,
            config,
            open: Mutex::new(HashMap::new()),
            outbox: Outbox::new("langfuse", DEFAULT_OUTBOX_CAPACITY),
        })
    }

    /// Events queued for the next flush
    pub fn pending_events(&self) -> usize {
        self.outbox.pending()
    }

    async fn send(&self, batch: &[Value]) -> Result<()> {
        let response = self
            .http_client
            .post(format!("{}/api/public/ingestion", self.config.host))
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
            .json(&json!({ "batch": batch }))
            .send()
            .await
            .map_err(|e| AgentError::Observability(format!("Langfuse ingestion request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Observability(format!(
                "Langfuse ingestion rejected with status {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

fn envelope(kind: &str, body: Value) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "timestamp": Utc::now().to_rfc3339(),
        "type": kind,
        "body": body,
    })
}

fn trace_event(trace_id: &TraceId, name: &str, user_id: &str, metadata: &TraceMetadata) -> Value {
    let mut metadata = metadata.clone();
    let tags = metadata.remove("tags").unwrap_or_else(|| json!([]));
    let input = metadata.remove("query");

    envelope(
        "trace-create",
        json!({
            "id": trace_id.as_str(),
            "name": name,
            "userId": user_id,
            "input": input,
            "metadata": metadata,
            "tags": tags,
            "timestamp": Utc::now().to_rfc3339(),
        }),
    )
}

fn outcome_event(trace_id: &TraceId, outcome: &TraceOutcome) -> Value {
    let output = match outcome {
        TraceOutcome::Success { answer } => json!({ "answer": answer }),
        TraceOutcome::Error { kind, message } => json!({ "error": message, "kind": kind }),
        TraceOutcome::Cancelled => json!({ "cancelled": true }),
    };

    envelope(
        "trace-create",
        json!({
            "id": trace_id.as_str(),
            "output": output,
            "metadata": { "outcome": outcome.as_str() },
        }),
    )
}

/// Ingestion event for one step
fn step_event(trace_id: &TraceId, step: &AgentStep) -> Value {
    let trace = trace_id.as_str();
    match step {
        AgentStep::Reasoning { thought, at } => envelope(
            "generation-create",
            json!({
                "id": Uuid::new_v4().to_string(),
                "traceId": trace,
                "name": "reasoning",
                "startTime": at.to_rfc3339(),
                "endTime": at.to_rfc3339(),
                "output": thought,
            }),
        ),
        AgentStep::ToolCall(call) => envelope(
            "span-create",
            json!({
                "id": call.id,
                "traceId": trace,
                "name": format!("tool_{}", call.tool_name),
                "startTime": call.requested_at.to_rfc3339(),
                "input": call.arguments,
            }),
        ),
        AgentStep::ToolResult(result) => {
            let mut body = json!({
                "id": result.call_id,
                "traceId": trace,
                "endTime": result.completed_at.to_rfc3339(),
                "output": result.output,
                "metadata": { "duration_ms": result.duration_ms },
            });
            if let (Some(failure), Some(fields)) = (&result.error, body.as_object_mut()) {
                fields.insert("level".into(), json!("ERROR"));
                fields.insert("statusMessage".into(), json!(failure.message));
            }
            envelope("span-update", body)
        }
        AgentStep::FinalAnswer { answer, at } => envelope(
            "event-create",
            json!({
                "id": Uuid::new_v4().to_string(),
                "traceId": trace,
                "name": "final_answer",
                "startTime": at.to_rfc3339(),
                "output": answer,
            }),
        ),
        AgentStep::Error { kind, message, at } => envelope(
            "event-create",
            json!({
                "id": Uuid::new_v4().to_string(),
                "traceId": trace,
                "name": "error",
                "startTime": at.to_rfc3339(),
                "level": "ERROR",
                "statusMessage": message,
                "metadata": { "kind": kind },
            }),
        ),
    }
}

#[async_trait]
impl ObservabilityAdapter for LangfuseObserver {
    fn name(&self) -> &'static str {
        "langfuse"
    }

    async fn open_trace(&self, name: &str, user_id: &str, metadata: &TraceMetadata) -> Result<TraceId> {
        let trace_id = TraceId::new();
        let event = trace_event(&trace_id, name, user_id, metadata);
        self.open.lock().await.insert(trace_id.clone(), vec![event]);
        Ok(trace_id)
    }

    async fn record_step(&self, trace_id: &TraceId, step: &AgentStep) -> Result<()> {
        let mut open = self.open.lock().await;
        let events = open
            .get_mut(trace_id)
            .ok_or_else(|| AgentError::Observability(format!("trace {} is not open", trace_id)))?;
        events.push(step_event(trace_id, step));
        Ok(())
    }

    async fn close_trace(&self, trace_id: &TraceId, outcome: &TraceOutcome) -> Result<()> {
        let mut events = self
            .open
            .lock()
            .await
            .remove(trace_id)
            .ok_or_else(|| AgentError::Observability(format!("trace {} is not open", trace_id)))?;
        events.push(outcome_event(trace_id, outcome));

        self.outbox.push(events);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let Some(batch) = self.outbox.begin() else {
            return Ok(());
        };

        tracing::debug!(events = batch.events().len(), "Flushing Langfuse events");
        self.send(batch.events()).await?;
        batch.delivered();
        Ok(())
    }

    fn trace_url(&self, trace_id: &TraceId) -> Option<String> {
        Some(format!("{}/trace/{}", self.config.host, trace_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::tool::{ToolArguments, ToolCall, ToolErrorKind, ToolFailure, ToolResult};

    fn observer_at(host: &str) -> LangfuseObserver {
        LangfuseObserver::new(
            LangfuseConfig {
                public_key: "pk-lf-test".into(),
                secret_key: "sk-lf-test".into(),
                host: host.into(),
            },
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn observer() -> LangfuseObserver {
        observer_at("https://langfuse.example.com/")
    }

    async fn closed_trace(observer: &LangfuseObserver) {
        let id = observer.open_trace("agent_query", "user-1", &TraceMetadata::new()).await.unwrap();
        observer.record_step(&id, &AgentStep::final_answer("SYM is 100.0")).await.unwrap();
        observer
            .close_trace(&id, &TraceOutcome::Success { answer: "SYM is 100.0".into() })
            .await
            .unwrap();
    }

    #[test]
    fn test_trace_url_uses_host() {
        let id = TraceId::from_string("abc");
        assert_eq!(
            observer().trace_url(&id).as_deref(),
            Some("https://langfuse.example.com/trace/abc")
        );
    }

    #[test]
    fn test_step_mapping() {
        let trace = TraceId::from_string("t-1");
        let call = ToolCall::new("get_price", ToolArguments::new());

        let span = step_event(&trace, &AgentStep::ToolCall(call.clone()));
        assert_eq!(span["type"], "span-create");
        assert_eq!(span["body"]["id"], json!(call.id));
        assert_eq!(span["body"]["name"], "tool_get_price");
        assert_eq!(span["body"]["traceId"], "t-1");

        let failed = ToolResult::failure(
            &call,
            ToolFailure::new(ToolErrorKind::Execution, "unknown symbol"),
            Duration::from_millis(4),
        );
        let update = step_event(&trace, &AgentStep::ToolResult(failed));
        assert_eq!(update["type"], "span-update");
        assert_eq!(update["body"]["id"], json!(call.id));
        assert_eq!(update["body"]["level"], "ERROR");

        assert_eq!(step_event(&trace, &AgentStep::reasoning("hmm"))["type"], "generation-create");
        assert_eq!(step_event(&trace, &AgentStep::final_answer("done"))["type"], "event-create");
    }

    #[tokio::test]
    async fn test_events_queue_until_flush() {
        let observer = observer();
        let mut metadata = TraceMetadata::new();
        metadata.insert("tags".into(), json!(["agent_query"]));
        metadata.insert("query".into(), json!("price of SYM"));

        let id = observer.open_trace("agent_query", "user-1", &metadata).await.unwrap();
        observer.record_step(&id, &AgentStep::final_answer("SYM is 100.0")).await.unwrap();
        assert_eq!(observer.pending_events(), 0);

        observer
            .close_trace(&id, &TraceOutcome::Success { answer: "SYM is 100.0".into() })
            .await
            .unwrap();
        assert_eq!(observer.pending_events(), 3);

        // closed traces accept nothing more
        assert!(observer.record_step(&id, &AgentStep::reasoning("late")).await.is_err());
        assert!(observer.close_trace(&id, &TraceOutcome::Cancelled).await.is_err());
    }

    #[test]
    fn test_trace_event_lifts_tags_and_input() {
        let mut metadata = TraceMetadata::new();
        metadata.insert("tags".into(), json!(["agent_query"]));
        metadata.insert("query".into(), json!("price of SYM"));
        metadata.insert("channel".into(), json!("api"));

        let event = trace_event(&TraceId::from_string("t-1"), "agent_query", "user-1", &metadata);
        assert_eq!(event["body"]["tags"], json!(["agent_query"]));
        assert_eq!(event["body"]["input"], "price of SYM");
        assert_eq!(event["body"]["userId"], "user-1");
        assert_eq!(event["body"]["metadata"], json!({ "channel": "api" }));
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_events() {
        let observer = observer_at("http://127.0.0.1:1");
        closed_trace(&observer).await;
        assert_eq!(observer.pending_events(), 3);

        assert!(observer.flush().await.is_err());
        assert_eq!(observer.pending_events(), 3);

        closed_trace(&observer).await;
        assert_eq!(observer.pending_events(), 6);
    }

    #[tokio::test]
    async fn test_abandoned_flush_keeps_events() {
        let observer = observer_at("http://127.0.0.1:1");
        closed_trace(&observer).await;

        // the recorder drops flush futures that outlive its timeout
        let _ = tokio::time::timeout(Duration::ZERO, observer.flush()).await;
        assert_eq!(observer.pending_events(), 3);
    }
}
