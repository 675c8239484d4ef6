//! Agent HTTP Server
//!
//! Axum-based server exposing the query orchestrator over HTTP. Queries
//! answer either as a server-sent event stream or as one JSON document.
//!
//! The financial analyst tool set (realtime and historical stock prices,
//! filing search) is registered at startup.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{LlmProvider, LlmReasoner, LlmReasonerConfig, ObservabilityAdapter, Orchestrator};
use agent_runtime::{OllamaProvider, RuntimeConfig};
use market_tools::FINANCIAL_ANALYST_PROMPT;

use crate::handlers::{health_check, list_tools, query_handler};
use crate::state::AppState;

/// Routes shared by the binary and the handler tests
pub(crate) fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/tools", get(list_tools))
        .route("/api/agent/query", post(query_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment first so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RuntimeConfig::from_env()?;

    // Initialize LLM provider
    let provider = Arc::new(OllamaProvider::from_config(config.ollama.clone()));

    match provider.health_check().await {
        Ok(true) => {
            tracing::info!(host = %config.ollama.host, port = config.ollama.port, "Connected to Ollama");
            if let Ok(models) = provider.list_models().await {
                for model in models {
                    tracing::info!("  Model: {}", model.id);
                }
            }
        }
        Ok(false) | Err(_) => {
            tracing::warn!("Ollama not available - queries will fail with reasoning_unavailable");
            tracing::warn!("  Make sure Ollama is running: ollama serve");
        }
    }

    let reasoner = LlmReasoner::new(
        provider.clone(),
        LlmReasonerConfig {
            system_prompt: FINANCIAL_ANALYST_PROMPT.into(),
            generation: config.generation_options(),
            inject_tool_descriptions: true,
        },
    );

    let tools = market_tools::default_registry();
    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    let observer = config.build_observer()?;
    tracing::info!(backend = observer.name(), "Observability configured");

    let orchestrator = Orchestrator::builder()
        .reasoner(Arc::new(reasoner))
        .tools(tools)
        .observer(observer)
        .config(config.orchestrator_config())
        .build()?;

    let state = AppState {
        orchestrator,
        provider: Some(provider),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("agent server running on http://{}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  GET  /api/tools       - Registered tool schemas");
    tracing::info!("  POST /api/agent/query - Run a query (SSE or JSON)");

    axum::serve(listener, app).await?;

    Ok(())
}
