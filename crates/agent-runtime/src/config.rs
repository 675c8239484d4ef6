//! Runtime Configuration
//!
//! Environment-driven settings for the model backend, the orchestrator and
//! the observability backend. Parsing goes through a key lookup function so
//! it can be exercised without touching the process environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `OLLAMA_HOST` | `http://localhost` |
//! | `OLLAMA_PORT` | `11434` |
//! | `AGENT_MODEL` | `llama3.2` |
//! | `AGENT_MAX_ITERATIONS` | `10` |
//! | `AGENT_TOOL_TIMEOUT_SECS` | `30` |
//! | `AGENT_QUERY_TIMEOUT_SECS` | `120` |
//! | `OBSERVABILITY_PROVIDER` | `none` (`langfuse`, `langsmith`, `log`, `memory`) |
//! | `OBSERVABILITY_TIMEOUT_SECS` | `5` |
//! | `LANGFUSE_PUBLIC_KEY` / `LANGFUSE_SECRET_KEY` | unset |
//! | `LANGFUSE_HOST` | `https://us.cloud.langfuse.com` |
//! | `LANGSMITH_API_KEY` | unset |
//! | `LANGSMITH_PROJECT` | `agent-orchestrator` |
//! | `LANGSMITH_ENDPOINT` | `https://api.smith.langchain.com` |
//! | `BIND_ADDR` | `0.0.0.0:3000` |

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use agent_core::error::{AgentError, Result};
use agent_core::observability::{InMemoryObserver, LoggingObserver, NoopObserver, ObservabilityAdapter};
use agent_core::orchestrator::OrchestratorConfig;
use agent_core::provider::GenerationOptions;

use crate::langfuse::{DEFAULT_LANGFUSE_HOST, LangfuseObserver};
use crate::langsmith::{DEFAULT_LANGSMITH_ENDPOINT, DEFAULT_LANGSMITH_PROJECT, LangSmithObserver};

/// Ollama connection settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
        }
    }
}

/// Langfuse credentials
#[derive(Clone, PartialEq, Eq)]
pub struct LangfuseConfig {
    pub public_key: String,
    pub secret_key: String,
    pub host: String,
}

impl std::fmt::Debug for LangfuseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangfuseConfig")
            .field("public_key", &self.public_key)
            .field("secret_key", &"***")
            .field("host", &self.host)
            .finish()
    }
}

/// LangSmith credentials and project
#[derive(Clone, PartialEq, Eq)]
pub struct LangSmithConfig {
    pub api_key: String,
    pub project: String,
    pub endpoint: String,
}

impl std::fmt::Debug for LangSmithConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangSmithConfig")
            .field("api_key", &"***")
            .field("project", &self.project)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Which observability backend to run with
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ObservabilityConfig {
    #[default]
    None,
    Log,
    Memory,
    Langfuse(LangfuseConfig),
    LangSmith(LangSmithConfig),
}

impl ObservabilityConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let provider = lookup("OBSERVABILITY_PROVIDER").unwrap_or_else(|| "none".into());

        match provider.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "noop" => Ok(Self::None),
            "log" | "logging" => Ok(Self::Log),
            "memory" => Ok(Self::Memory),
            "langfuse" => {
                let public_key = lookup("LANGFUSE_PUBLIC_KEY").filter(|k| !k.is_empty());
                let secret_key = lookup("LANGFUSE_SECRET_KEY").filter(|k| !k.is_empty());
                match (public_key, secret_key) {
                    (Some(public_key), Some(secret_key)) => Ok(Self::Langfuse(LangfuseConfig {
                        public_key,
                        secret_key,
                        host: lookup("LANGFUSE_HOST").unwrap_or_else(|| DEFAULT_LANGFUSE_HOST.into()),
                    })),
                    _ => {
                        tracing::warn!("Langfuse selected but LANGFUSE_PUBLIC_KEY/LANGFUSE_SECRET_KEY are missing; tracing disabled");
                        Ok(Self::None)
                    }
                }
            }
            "langsmith" => match lookup("LANGSMITH_API_KEY").filter(|k| !k.is_empty()) {
                Some(api_key) => Ok(Self::LangSmith(LangSmithConfig {
                    api_key,
                    project: lookup("LANGSMITH_PROJECT").unwrap_or_else(|| DEFAULT_LANGSMITH_PROJECT.into()),
                    endpoint: lookup("LANGSMITH_ENDPOINT").unwrap_or_else(|| DEFAULT_LANGSMITH_ENDPOINT.into()),
                })),
                None => {
                    tracing::warn!("LangSmith selected but LANGSMITH_API_KEY is missing; tracing disabled");
                    Ok(Self::None)
                }
            },
            other => Err(AgentError::Config(format!(
                "unknown OBSERVABILITY_PROVIDER '{}' (expected langfuse, langsmith, log, memory or none)",
                other
            ))),
        }
    }

    /// Construct the adapter this configuration names.
    ///
    /// `request_timeout` bounds each HTTP call made by remote backends.
    pub fn build(&self, request_timeout: Duration) -> Result<Arc<dyn ObservabilityAdapter>> {
        Ok(match self {
            Self::None => Arc::new(NoopObserver),
            Self::Log => Arc::new(LoggingObserver),
            Self::Memory => Arc::new(InMemoryObserver::new()),
            Self::Langfuse(config) => Arc::new(LangfuseObserver::new(config.clone(), request_timeout)?),
            Self::LangSmith(config) => Arc::new(LangSmithObserver::new(config.clone(), request_timeout)?),
        })
    }
}

/// Complete runtime configuration
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub ollama: OllamaConfig,
    pub model: String,
    pub max_iterations: usize,
    pub tool_timeout: Duration,
    pub query_timeout: Duration,
    pub observer_timeout: Duration,
    pub observability: ObservabilityConfig,
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        Self {
            ollama: OllamaConfig::default(),
            model: GenerationOptions::default().model,
            max_iterations: orchestrator.max_iterations,
            tool_timeout: orchestrator.tool_timeout,
            query_timeout: orchestrator.query_timeout,
            observer_timeout: orchestrator.observer_timeout,
            observability: ObservabilityConfig::None,
            bind_addr: "0.0.0.0:3000".into(),
        }
    }
}

impl RuntimeConfig {
    /// Read from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read from any key-value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            ollama: OllamaConfig {
                host: lookup("OLLAMA_HOST").unwrap_or(defaults.ollama.host),
                port: parse(&lookup, "OLLAMA_PORT")?.unwrap_or(defaults.ollama.port),
            },
            model: lookup("AGENT_MODEL").unwrap_or(defaults.model),
            max_iterations: parse(&lookup, "AGENT_MAX_ITERATIONS")?.unwrap_or(defaults.max_iterations),
            tool_timeout: parse(&lookup, "AGENT_TOOL_TIMEOUT_SECS")?
                .map_or(defaults.tool_timeout, Duration::from_secs),
            query_timeout: parse(&lookup, "AGENT_QUERY_TIMEOUT_SECS")?
                .map_or(defaults.query_timeout, Duration::from_secs),
            observer_timeout: parse(&lookup, "OBSERVABILITY_TIMEOUT_SECS")?
                .map_or(defaults.observer_timeout, Duration::from_secs),
            observability: ObservabilityConfig::from_lookup(&lookup)?,
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    /// Orchestrator settings derived from this configuration
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_iterations: self.max_iterations,
            tool_timeout: self.tool_timeout,
            query_timeout: self.query_timeout,
            observer_timeout: self.observer_timeout,
            ..OrchestratorConfig::default()
        }
    }

    /// HTTP timeout for remote tracing backends, kept inside the observer
    /// timeout so a request settles before the orchestrator abandons it
    pub fn ingestion_timeout(&self) -> Duration {
        self.observer_timeout * 4 / 5
    }

    /// Construct the configured observability adapter
    pub fn build_observer(&self) -> Result<Arc<dyn ObservabilityAdapter>> {
        self.observability.build(self.ingestion_timeout())
    }

    /// Generation options for the configured model
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions::default().with_model(self.model.clone())
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| AgentError::Config(format!("{} = '{}': {}", key, raw, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.ollama, OllamaConfig::default());
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.query_timeout, Duration::from_secs(120));
        assert_eq!(config.observability, ObservabilityConfig::None);
    }

    #[test]
    fn test_reads_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("OLLAMA_PORT", "8080"),
            ("AGENT_MODEL", "mistral"),
            ("AGENT_MAX_ITERATIONS", "4"),
            ("AGENT_TOOL_TIMEOUT_SECS", "5"),
            ("OBSERVABILITY_PROVIDER", "Memory"),
        ]))
        .unwrap();

        assert_eq!(config.ollama.port, 8080);
        assert_eq!(config.generation_options().model, "mistral");
        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.max_iterations, 4);
        assert_eq!(orchestrator.tool_timeout, Duration::from_secs(5));
        assert_eq!(orchestrator.trace_name, "agent_query");
        assert_eq!(config.observability, ObservabilityConfig::Memory);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = RuntimeConfig::from_lookup(lookup(&[("OLLAMA_PORT", "not-a-port")])).unwrap_err();
        assert!(err.to_string().contains("OLLAMA_PORT"));

        assert!(RuntimeConfig::from_lookup(lookup(&[("OBSERVABILITY_PROVIDER", "datadog")])).is_err());
    }

    #[test]
    fn test_langfuse_needs_both_keys() {
        let partial = RuntimeConfig::from_lookup(lookup(&[
            ("OBSERVABILITY_PROVIDER", "langfuse"),
            ("LANGFUSE_PUBLIC_KEY", "pk-lf-1"),
        ]))
        .unwrap();
        assert_eq!(partial.observability, ObservabilityConfig::None);

        let full = RuntimeConfig::from_lookup(lookup(&[
            ("OBSERVABILITY_PROVIDER", "langfuse"),
            ("LANGFUSE_PUBLIC_KEY", "pk-lf-1"),
            ("LANGFUSE_SECRET_KEY", "sk-lf-1"),
        ]))
        .unwrap();
        match full.observability {
            ObservabilityConfig::Langfuse(ref langfuse) => {
                assert_eq!(langfuse.host, DEFAULT_LANGFUSE_HOST);
                assert!(!format!("{:?}", langfuse).contains("sk-lf-1"));
            }
            ref other => panic!("expected langfuse, got {:?}", other),
        }
        assert_eq!(full.build_observer().unwrap().name(), "langfuse");
    }

    #[test]
    fn test_langsmith_needs_api_key() {
        let missing = RuntimeConfig::from_lookup(lookup(&[("OBSERVABILITY_PROVIDER", "langsmith")])).unwrap();
        assert_eq!(missing.observability, ObservabilityConfig::None);

        let config = RuntimeConfig::from_lookup(lookup(&[
            ("OBSERVABILITY_PROVIDER", "LangSmith"),
            ("LANGSMITH_API_KEY", "lsv2_pt_test"),
            ("LANGSMITH_PROJECT", "test-project"),
        ]))
        .unwrap();
        match config.observability {
            ObservabilityConfig::LangSmith(ref langsmith) => {
                assert_eq!(langsmith.project, "test-project");
                assert_eq!(langsmith.endpoint, DEFAULT_LANGSMITH_ENDPOINT);
                assert!(!format!("{:?}", langsmith).contains("lsv2_pt_test"));
            }
            ref other => panic!("expected langsmith, got {:?}", other),
        }
        assert_eq!(config.build_observer().unwrap().name(), "langsmith");
    }

    #[test]
    fn test_ingestion_timeout_stays_inside_observer_timeout() {
        let config = RuntimeConfig::from_lookup(lookup(&[("OBSERVABILITY_TIMEOUT_SECS", "10")])).unwrap();
        assert_eq!(config.orchestrator_config().observer_timeout, Duration::from_secs(10));
        assert_eq!(config.ingestion_timeout(), Duration::from_secs(8));
        assert!(RuntimeConfig::default().ingestion_timeout() < OrchestratorConfig::default().observer_timeout);
    }

    #[test]
    fn test_build_selects_adapter() {
        let timeout = Duration::from_secs(1);
        assert_eq!(ObservabilityConfig::None.build(timeout).unwrap().name(), "none");
        assert_eq!(ObservabilityConfig::Log.build(timeout).unwrap().name(), "log");
        assert_eq!(ObservabilityConfig::Memory.build(timeout).unwrap().name(), "memory");
    }
}
