//! # market-tools
//!
//! Stock market and financial document tools for the agent orchestrator.
//!
//! | Tool | Output |
//! |------|--------|
//! | `get_realtime_stock_price` | structured quote |
//! | `get_historical_stock_prices` | text summary with statistics |
//! | `search_financial_documents` | ranked excerpts |
//!
//! Each tool reads from a source trait (`StockSource`, `DocumentSource`);
//! the bundled sources are in-memory.

pub mod error;
pub mod model;
pub mod source;
pub mod svckit;

use std::sync::Arc;

use agent_core::ToolRegistry;

pub use error::{MarketError, Result};
pub use model::{DocumentChunk, HistoricalStockPrice, PricePeriod, StockPrice};
pub use source::{DocumentSource, InMemoryDocumentIndex, MockStockSource, StockSource};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{DocumentSearchTool, HistoricalPriceTool, RealtimePriceTool};
}

/// Register all market tools against the given sources
pub fn register_market_tools(
    registry: &mut ToolRegistry,
    stocks: Arc<dyn StockSource>,
    documents: Arc<dyn DocumentSource>,
) {
    registry.register(tools::RealtimePriceTool::new(stocks.clone()));
    registry.register(tools::HistoricalPriceTool::new(stocks));
    registry.register(tools::DocumentSearchTool::new(documents));
}

/// Registry with every market tool over the in-memory sources
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_market_tools(
        &mut registry,
        Arc::new(MockStockSource::new()),
        Arc::new(InMemoryDocumentIndex::with_sample_filings()),
    );
    registry
}

/// System prompt for the financial analyst agent
pub const FINANCIAL_ANALYST_PROMPT: &str = r#"You are a financial analyst assistant. You answer questions about stock prices and company financials using the tools available to you.

## How to Work

1. Use `get_realtime_stock_price` for current quotes
2. Use `get_historical_stock_prices` for trends over a date range (dates as YYYY-MM-DD)
3. Use `search_financial_documents` for figures from annual reports and filings
4. Call one tool at a time and read its result before deciding the next step

## Answering

- Quote the numbers the tools returned; never invent prices or figures
- Say which period a figure refers to
- If a tool reports an error, explain what was missing instead of guessing

This is information, not investment advice."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_all_tools() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec![
                "get_historical_stock_prices",
                "get_realtime_stock_price",
                "search_financial_documents"
            ]
        );
        for name in registry.names() {
            assert!(FINANCIAL_ANALYST_PROMPT.contains(name));
        }
    }
}
