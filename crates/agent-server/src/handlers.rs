//! HTTP Handlers

use std::convert::Infallible;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agent_core::{AgentError, AgentStep, CancellationToken, Query, StreamEvent, TraceId, TraceMetadata, ToolSchema};

use crate::state::AppState;

/// Header carrying the caller identity, verified upstream
pub const USER_ID_HEADER: &str = "x-user-id";

pub const MAX_QUERY_CHARS: usize = 2000;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model_connected: bool,
    pub observability: &'static str,
    pub tools: usize,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub metadata: Option<TraceMetadata>,
}

const fn default_stream() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub steps: Vec<AgentStep>,
    pub trace_id: TraceId,
    pub trace_url: Option<String>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing x-user-id header")]
    Unauthorized,

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Agent(AgentError::InvalidQuery(_)) => StatusCode::BAD_REQUEST,
            ApiError::Agent(AgentError::ReasoningUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Agent(AgentError::QueryTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Agent(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::InvalidRequest(_) => "invalid_query",
            ApiError::Agent(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            ApiError::Agent(e) => e.user_message(),
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: self.code().into(),
            }),
        )
            .into_response()
    }
}

fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)
}

fn validate_query(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidRequest("query must not be empty".into()));
    }
    let length = text.chars().count();
    if length > MAX_QUERY_CHARS {
        return Err(ApiError::InvalidRequest(format!(
            "query is {} characters, the limit is {}",
            length, MAX_QUERY_CHARS
        )));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let model_connected = match &state.provider {
        Some(provider) => provider.health_check().await.unwrap_or(false),
        None => false,
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model_connected,
        observability: state.orchestrator.observer_name(),
        tools: state.orchestrator.tools().len(),
    })
}

/// Registered tool schemas
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolSchema>> {
    Json(state.orchestrator.tools().schemas())
}

/// Run a query, as an SSE stream or a single JSON response
pub async fn query_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let user_id = user_id(&headers)?;
    validate_query(&payload.query)?;

    tracing::info!(user_id = %user_id, stream = payload.stream, "Query received");

    let mut query = Query::new(payload.query.clone(), user_id);
    for (key, value) in payload.metadata.unwrap_or_default() {
        query = query.with_metadata(key, value);
    }

    if payload.stream {
        // Dropping the response body drops the stream, which cancels the query
        let events = state.orchestrator.stream(query, CancellationToken::new());
        return Ok(Sse::new(sse_events(events)).keep_alive(KeepAlive::default()).into_response());
    }

    let result = state.orchestrator.execute(query).await.map_err(|failure| {
        tracing::warn!(trace_id = ?failure.trace_id, error = %failure.error, "Query failed");
        ApiError::Agent(failure.error)
    })?;

    Ok(Json(QueryResponse {
        query: payload.query,
        answer: result.answer,
        steps: result.steps,
        trace_id: result.trace_id,
        trace_url: result.trace_url,
        execution_time_ms: result.execution_time_ms,
    })
    .into_response())
}

/// One SSE event per stream event, named by its event type
fn sse_events(events: impl Stream<Item = StreamEvent>) -> impl Stream<Item = Result<Event, Infallible>> {
    events.map(|event| {
        let sse = Event::default().event(&event.event_type);
        Ok(sse.json_data(&event).unwrap_or_else(|e| {
            tracing::warn!(error = %e, event_type = %event.event_type, "Failed to encode stream event");
            Event::default()
                .event("error")
                .data(r#"{"event_type":"error","data":{"kind":"json_error"}}"#)
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agent_core::{InMemoryObserver, Orchestrator, ReasoningOutcome, ScriptedReasoner};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::build_router;

    fn state(reasoner: ScriptedReasoner) -> AppState {
        let orchestrator = Orchestrator::builder()
            .reasoner(Arc::new(reasoner))
            .tools(market_tools::default_registry())
            .observer(Arc::new(InMemoryObserver::new()))
            .build()
            .unwrap();

        AppState {
            orchestrator,
            provider: None,
        }
    }

    fn quote_then_answer() -> ScriptedReasoner {
        ScriptedReasoner::from_outcomes([
            ReasoningOutcome::tool_call(
                "I need the latest quote.",
                "get_realtime_stock_price",
                json!({ "symbol": "AMZN" }),
            ),
            ReasoningOutcome::final_answer("AMZN trades at $186.40."),
        ])
    }

    fn post_query(body: Value, user: Option<&str>) -> Request<Body> {
        let mut request = Request::post("/api/agent/query").header("content-type", "application/json");
        if let Some(user) = user {
            request = request.header(USER_ID_HEADER, user);
        }
        request.body(Body::from(body.to_string())).unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_tools() {
        let app = build_router(state(quote_then_answer()));

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        let health = read_json(health).await;
        assert_eq!(health["tools"], 3);
        assert_eq!(health["observability"], "memory");

        let tools = app
            .oneshot(Request::get("/api/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let tools = read_json(tools).await;
        assert_eq!(tools.as_array().unwrap().len(), 3);
        assert_eq!(tools[0]["name"], "get_historical_stock_prices");
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        let response = build_router(state(quote_then_answer()))
            .oneshot(post_query(json!({ "query": "Price of AMZN?" }), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_json(response).await["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_rejects_blank_and_oversized_queries() {
        let app = build_router(state(quote_then_answer()));

        let blank = app
            .clone()
            .oneshot(post_query(json!({ "query": "   ", "stream": false }), Some("user-1")))
            .await
            .unwrap();
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(blank).await["code"], "invalid_query");

        let long = "a".repeat(MAX_QUERY_CHARS + 1);
        let oversized = app
            .oneshot(post_query(json!({ "query": long }), Some("user-1")))
            .await
            .unwrap();
        assert_eq!(oversized.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_json_mode_returns_result() {
        let response = build_router(state(quote_then_answer()))
            .oneshot(post_query(
                json!({ "query": "What is AMZN trading at?", "stream": false, "metadata": { "channel": "test" } }),
                Some("user-1"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["query"], "What is AMZN trading at?");
        assert_eq!(body["answer"], "AMZN trades at $186.40.");
        assert_eq!(body["steps"].as_array().unwrap().len(), 4);
        assert!(!body["trace_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_mode_emits_sse_events() {
        let response = build_router(state(quote_then_answer()))
            .oneshot(post_query(json!({ "query": "What is AMZN trading at?" }), Some("user-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        let names: Vec<&str> = body.lines().filter_map(|l| l.strip_prefix("event: ")).collect();
        assert_eq!(names, vec!["reasoning", "tool_call", "tool_result", "final_answer"]);
        assert!(body.contains("186.40"));
    }

    #[tokio::test]
    async fn test_reasoning_failure_maps_to_503() {
        let reasoner = ScriptedReasoner::new([Err(AgentError::ReasoningUnavailable("model offline".into()))]);
        let response = build_router(state(reasoner))
            .oneshot(post_query(json!({ "query": "Price of AMZN?", "stream": false }), Some("user-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(read_json(response).await["code"], "reasoning_unavailable");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(AgentError::QueryTimeout(100)).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ApiError::from(AgentError::MaxIterationsExceeded(10)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(AgentError::InvalidQuery("blank".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
