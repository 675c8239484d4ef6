//! Financial Document Search Tool
//!
//! Keyword search over indexed filings and reports.

use std::sync::Arc;

use agent_core::{Tool, ToolError, ToolOutput, ToolSchema, tool::ParameterSchema, tool::ToolArguments};
use async_trait::async_trait;
use serde_json::json;

use super::string_arg;
use crate::error::MarketError;
use crate::model::DocumentChunk;
use crate::source::DocumentSource;

pub const DEFAULT_MAX_RESULTS: usize = 5;

pub struct DocumentSearchTool {
    source: Arc<dyn DocumentSource>,
}

impl DocumentSearchTool {
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        Self { source }
    }

    fn render(chunks: &[DocumentChunk]) -> String {
        if chunks.is_empty() {
            return "No relevant information found in financial documents.".into();
        }

        let sections: Vec<String> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| format!("[{}] (Relevance: {:.2})\n{}", i + 1, chunk.relevance_score, chunk.content))
            .collect();

        format!("Found {} relevant document sections:\n\n{}", chunks.len(), sections.join("\n\n"))
    }
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "search_financial_documents",
            "Search annual reports and financial filings. Returns the most relevant excerpts with relevance scores.",
        )
        .param(ParameterSchema::required(
            "query",
            "string",
            "What to look for (e.g., 'cloud services operating income')",
        ))
        .param(
            ParameterSchema::optional("max_results", "integer", "Maximum number of excerpts to return (at least 1)")
                .with_default(json!(DEFAULT_MAX_RESULTS)),
        )
        .category("documents")
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolOutput, ToolError> {
        let query = string_arg(arguments, "query")?.trim();
        if query.is_empty() {
            return Err(MarketError::InvalidQuery("query must not be empty".into()).into());
        }

        let max_results = match arguments.get("max_results").and_then(serde_json::Value::as_i64) {
            None => DEFAULT_MAX_RESULTS,
            Some(n) if n >= 1 => usize::try_from(n).unwrap_or(usize::MAX),
            Some(n) => {
                return Err(MarketError::InvalidQuery(format!("max_results must be at least 1, got {}", n)).into());
            }
        };

        let chunks = self.source.search(query, max_results).await?;
        tracing::debug!(hits = chunks.len(), max_results, source = self.source.name(), "Searched documents");

        Ok(ToolOutput::Text(Self::render(&chunks)))
    }
}
