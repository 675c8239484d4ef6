//! Realtime Stock Price Tool
//!
//! Current quote for one ticker.

use std::sync::Arc;

use agent_core::{Tool, ToolError, ToolOutput, ToolSchema, tool::ParameterSchema, tool::ToolArguments};
use async_trait::async_trait;
use serde_json::json;

use super::string_arg;
use crate::model::normalize_symbol;
use crate::source::StockSource;

pub struct RealtimePriceTool {
    source: Arc<dyn StockSource>,
}

impl RealtimePriceTool {
    pub fn new(source: Arc<dyn StockSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for RealtimePriceTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "get_realtime_stock_price",
            "Get the current stock price for a ticker symbol. Returns price, day range, open, previous close, volume and market cap.",
        )
        .param(ParameterSchema::required(
            "symbol",
            "string",
            "Stock ticker symbol (e.g., 'AMZN', 'AAPL')",
        ))
        .category("market_data")
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolOutput, ToolError> {
        let symbol = normalize_symbol(string_arg(arguments, "symbol")?)?;
        let quote = self.source.realtime_price(&symbol).await?;

        tracing::debug!(symbol = %quote.symbol, price = %quote.price, source = self.source.name(), "Fetched quote");

        Ok(ToolOutput::Structured(json!({
            "symbol": quote.symbol,
            "price": quote.price,
            "currency": quote.currency,
            "change_percent": quote.change_percent(),
            "day_high": quote.day_high,
            "day_low": quote.day_low,
            "open_price": quote.open_price,
            "previous_close": quote.previous_close,
            "volume": quote.volume,
            "market_cap": quote.market_cap,
            "timestamp": quote.timestamp.to_rfc3339(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockStockSource;
    use agent_core::{ToolCall, ToolRegistry};
    use std::time::Duration;

    fn tool() -> RealtimePriceTool {
        RealtimePriceTool::new(Arc::new(MockStockSource::new()))
    }

    fn args(value: serde_json::Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_quote_normalizes_symbol() {
        let output = tool().execute(&args(json!({"symbol": " amzn "}))).await.unwrap();
        match output {
            ToolOutput::Structured(quote) => {
                assert_eq!(quote["symbol"], "AMZN");
                assert_eq!(quote["price"], "186.40");
                assert_eq!(quote["currency"], "USD");
            }
            other => panic!("expected structured output, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_not_found() {
        let err = tool().execute(&args(json!({"symbol": "ZZZZ"}))).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));

        let err = tool().execute(&args(json!({"symbol": "  "}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_dispatch_through_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(tool());

        let call = ToolCall::new("get_realtime_stock_price", args(json!({"symbol": "MSFT"})));
        let result = registry.invoke(&call, Duration::from_secs(1)).await;
        assert!(result.is_success());
        assert!(result.output.render().contains("418.20"));
    }
}
