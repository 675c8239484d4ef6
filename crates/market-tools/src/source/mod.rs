//! Market Data Sources
//!
//! Abstractions the tools read from, plus in-memory implementations.

mod documents;
mod mock;

pub use documents::InMemoryDocumentIndex;
pub use mock::MockStockSource;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::model::{DocumentChunk, HistoricalStockPrice, PricePeriod, StockPrice};

/// Stock quote provider (Strategy pattern)
///
/// Implement this for each market data vendor. Symbols arrive normalized.
#[async_trait]
pub trait StockSource: Send + Sync {
    /// Current quote for a symbol
    async fn realtime_price(&self, symbol: &str) -> Result<StockPrice>;

    /// Closing prices between two dates, inclusive
    async fn historical_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        period: PricePeriod,
    ) -> Result<HistoricalStockPrice>;

    /// Source name
    fn name(&self) -> &str;
}

/// Financial document search backend
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Best matching chunks, highest relevance first, at most `max_results`
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<DocumentChunk>>;

    fn name(&self) -> &str;
}
