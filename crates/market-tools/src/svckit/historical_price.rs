//! Historical Stock Price Tool
//!
//! Summarizes closing prices over a date range.

use std::sync::Arc;

use agent_core::{Tool, ToolError, ToolOutput, ToolSchema, tool::ParameterSchema, tool::ToolArguments};
use async_trait::async_trait;
use serde_json::json;

use super::{optional_string_arg, string_arg};
use crate::error::MarketError;
use crate::model::{HistoricalStockPrice, PricePeriod, normalize_symbol, parse_date};
use crate::source::StockSource;

/// Samples listed under "Recent prices"
const RECENT_POINTS: usize = 5;

pub struct HistoricalPriceTool {
    source: Arc<dyn StockSource>,
}

impl HistoricalPriceTool {
    pub fn new(source: Arc<dyn StockSource>) -> Self {
        Self { source }
    }

    fn summarize(history: &HistoricalStockPrice) -> String {
        let mut output = format!(
            "Historical Stock Prices for {}\n\
             Period: {} to {}\n\
             Granularity: {} ({})\n\
             Number of data points: {}\n\n\
             Statistics:\n  \
             Average: ${:.2}\n  \
             Highest: ${:.2}\n  \
             Lowest: ${:.2}\n\n\
             Recent prices:\n",
            history.symbol,
            history.start_date,
            history.end_date,
            history.period.label(),
            history.period,
            history.prices.len(),
            history.average(),
            history.highest(),
            history.lowest(),
        );

        for point in history.recent(RECENT_POINTS) {
            output.push_str(&format!("  {}: ${:.2}\n", point.date, point.close));
        }

        output.trim_end().to_string()
    }
}

#[async_trait]
impl Tool for HistoricalPriceTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "get_historical_stock_prices",
            "Get historical closing prices for a ticker between two dates. Returns average, highest and lowest close plus the most recent prices.",
        )
        .param(ParameterSchema::required("symbol", "string", "Stock ticker symbol (e.g., 'AMZN')"))
        .param(ParameterSchema::required("start_date", "string", "Start date, YYYY-MM-DD"))
        .param(ParameterSchema::required("end_date", "string", "End date, YYYY-MM-DD"))
        .param(
            ParameterSchema::optional("period", "string", "Sampling granularity: 1d, 1wk or 1mo")
                .with_default(json!("1d"))
                .with_enum(vec![json!("1d"), json!("1wk"), json!("1mo")]),
        )
        .category("market_data")
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolOutput, ToolError> {
        let symbol = normalize_symbol(string_arg(arguments, "symbol")?)?;
        let start = parse_date(string_arg(arguments, "start_date")?)?;
        let end = parse_date(string_arg(arguments, "end_date")?)?;
        let period: PricePeriod = optional_string_arg(arguments, "period")
            .map_or(Ok(PricePeriod::default()), str::parse)?;

        if start >= end {
            return Err(MarketError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            }
            .into());
        }

        let history = self.source.historical_prices(&symbol, start, end, period).await?;
        tracing::debug!(symbol = %symbol, points = history.prices.len(), %period, "Fetched price history");

        Ok(ToolOutput::Text(Self::summarize(&history)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockStockSource;

    fn tool() -> HistoricalPriceTool {
        HistoricalPriceTool::new(Arc::new(MockStockSource::new()))
    }

    fn args(value: serde_json::Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_weekly_summary() {
        let output = tool()
            .execute(&args(json!({
                "symbol": "aapl",
                "start_date": "2024-01-01",
                "end_date": "2024-03-31",
                "period": "1wk",
            })))
            .await
            .unwrap()
            .render();

        assert!(output.starts_with("Historical Stock Prices for AAPL"));
        assert!(output.contains("Period: 2024-01-01 to 2024-03-31"));
        assert!(output.contains("Granularity: weekly (1wk)"));
        assert!(output.contains("Number of data points: 13"));
        assert!(output.contains("Average: $"));
        assert!(output.contains("  2024-03-25: $"));
        let recent = output.split("Recent prices:\n").nth(1).unwrap();
        assert_eq!(recent.lines().count(), 5);
    }

    #[tokio::test]
    async fn test_period_defaults_to_daily() {
        let output = tool()
            .execute(&args(json!({
                "symbol": "AAPL",
                "start_date": "2024-01-01",
                "end_date": "2024-01-03",
            })))
            .await
            .unwrap()
            .render();

        assert!(output.contains("Granularity: daily (1d)"));
        assert!(output.contains("Number of data points: 3"));
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let tool = tool();
        let reversed = tool
            .execute(&args(json!({"symbol": "AAPL", "start_date": "2024-02-01", "end_date": "2024-01-01"})))
            .await;
        assert!(matches!(reversed, Err(ToolError::InvalidInput(ref m)) if m.contains("before")));

        let bad_date = tool
            .execute(&args(json!({"symbol": "AAPL", "start_date": "Jan 1", "end_date": "2024-01-01"})))
            .await;
        assert!(matches!(bad_date, Err(ToolError::InvalidInput(_))));

        let bad_period = tool
            .execute(&args(json!({
                "symbol": "AAPL",
                "start_date": "2024-01-01",
                "end_date": "2024-02-01",
                "period": "1y",
            })))
            .await;
        assert!(matches!(bad_period, Err(ToolError::InvalidInput(_))));

        let unknown = tool
            .execute(&args(json!({"symbol": "ZZZZ", "start_date": "2024-01-01", "end_date": "2024-02-01"})))
            .await;
        assert!(matches!(unknown, Err(ToolError::NotFound(_))));
    }
}
