//! Domain Models for Market Data
//!
//! Prices are `Decimal` throughout. Relevance scores are plain `f64` ratios.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};

/// Normalize a ticker: trimmed, upper-cased, 1-10 alphanumeric chars (plus `.` and `-`)
pub fn normalize_symbol(raw: &str) -> Result<String> {
    let symbol = raw.trim().to_ascii_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= 10
        && symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

    if valid {
        Ok(symbol)
    } else {
        Err(MarketError::InvalidSymbol(raw.to_string()))
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| MarketError::InvalidDate(raw.to_string()))
}

/// Realtime quote
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockPrice {
    pub symbol: String,
    pub price: Decimal,
    pub currency: String,
    pub day_high: Decimal,
    pub day_low: Decimal,
    pub open_price: Decimal,
    pub previous_close: Decimal,
    pub volume: u64,
    pub market_cap: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl StockPrice {
    /// Change against the previous close, in percent
    pub fn change_percent(&self) -> Decimal {
        if self.previous_close.is_zero() {
            return Decimal::ZERO;
        }
        ((self.price - self.previous_close) / self.previous_close * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

/// Sampling granularity for historical prices
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricePeriod {
    #[default]
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1wk")]
    Weekly,
    #[serde(rename = "1mo")]
    Monthly,
}

impl PricePeriod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "1d",
            Self::Weekly => "1wk",
            Self::Monthly => "1mo",
        }
    }

    /// Human label used in tool output
    pub const fn label(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// The sample date following `date`
    pub fn step(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Daily => date.checked_add_days(Days::new(1)),
            Self::Weekly => date.checked_add_days(Days::new(7)),
            Self::Monthly => date.checked_add_months(Months::new(1)),
        }
    }
}

impl FromStr for PricePeriod {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1d" => Ok(Self::Daily),
            "1wk" => Ok(Self::Weekly),
            "1mo" => Ok(Self::Monthly),
            other => Err(MarketError::UnsupportedPeriod(other.to_string())),
        }
    }
}

impl fmt::Display for PricePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One historical sample
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: Decimal,
    pub volume: u64,
}

/// Validated historical series for one symbol
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalStockPrice {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period: PricePeriod,
    pub prices: Vec<PricePoint>,
}

impl HistoricalStockPrice {
    pub fn new(
        symbol: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        period: PricePeriod,
        prices: Vec<PricePoint>,
    ) -> Result<Self> {
        let symbol = symbol.into();
        if start_date >= end_date {
            return Err(MarketError::InvalidDateRange {
                start: start_date.to_string(),
                end: end_date.to_string(),
            });
        }
        if prices.is_empty() {
            return Err(MarketError::NoData(symbol));
        }

        Ok(Self {
            symbol,
            start_date,
            end_date,
            period,
            prices,
        })
    }

    /// Mean close over the series; zero when there are no samples
    pub fn average(&self) -> Decimal {
        if self.prices.is_empty() {
            return Decimal::ZERO;
        }
        let total: Decimal = self.prices.iter().map(|p| p.close).sum();
        (total / Decimal::from(self.prices.len())).round_dp(2)
    }

    pub fn highest(&self) -> Decimal {
        self.prices.iter().map(|p| p.close).max().unwrap_or_default()
    }

    pub fn lowest(&self) -> Decimal {
        self.prices.iter().map(|p| p.close).min().unwrap_or_default()
    }

    /// The last `n` samples, oldest first
    pub fn recent(&self, n: usize) -> &[PricePoint] {
        &self.prices[self.prices.len().saturating_sub(n)..]
    }
}

/// Source document held by a document index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub title: String,
    /// Page texts, in order
    pub pages: Vec<String>,
}

/// Ranked excerpt returned by a document search
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub document_id: String,
    pub chunk_id: String,
    pub content: String,
    /// In `[0, 1]`
    pub relevance_score: f64,
    pub page_number: Option<u32>,
}
