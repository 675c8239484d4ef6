//! Mock Stock Source
//!
//! For testing and demo purposes. Returns realistic static quotes and a
//! deterministic price series, so repeated queries give identical answers.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::StockSource;
use crate::error::{MarketError, Result};
use crate::model::{HistoricalStockPrice, PricePeriod, PricePoint, StockPrice};

/// Upper bound on generated samples per request
const MAX_POINTS: usize = 5_000;

/// Static quote table entry
struct Listing {
    price: Decimal,
    previous_close: Decimal,
    volume: u64,
    market_cap: Decimal,
}

/// Mock quote source with static prices
#[derive(Default)]
pub struct MockStockSource;

impl MockStockSource {
    pub const fn new() -> Self {
        Self
    }

    fn listing(symbol: &str) -> Option<Listing> {
        // (price, previous close, volume, market cap)
        let (price, previous_close, volume, market_cap) = match symbol {
            "AMZN" => (dec!(186.40), dec!(184.15), 41_250_000, dec!(1940000000000)),
            "AAPL" => (dec!(227.55), dec!(228.90), 52_800_000, dec!(3450000000000)),
            "MSFT" => (dec!(418.20), dec!(415.75), 19_600_000, dec!(3110000000000)),
            "GOOGL" => (dec!(164.75), dec!(163.30), 24_100_000, dec!(2030000000000)),
            "NVDA" => (dec!(121.40), dec!(118.65), 310_500_000, dec!(2980000000000)),
            "TSLA" => (dec!(248.50), dec!(252.10), 88_700_000, dec!(793000000000)),
            "META" => (dec!(563.30), dec!(558.95), 11_900_000, dec!(1420000000000)),
            _ => return None,
        };
        Some(Listing {
            price,
            previous_close,
            volume,
            market_cap,
        })
    }

    fn lookup(symbol: &str) -> Result<Listing> {
        Self::listing(symbol).ok_or_else(|| MarketError::UnknownSymbol(symbol.to_string()))
    }

    /// Deterministic close for a date: the listing price moved by up to +/-5%
    fn close_on(listing: &Listing, date: NaiveDate) -> Decimal {
        let wave = i64::from((date.ordinal() * 7 + date.year().unsigned_abs()) % 11) - 5;
        (listing.price * (Decimal::ONE + Decimal::new(wave, 2))).round_dp(2)
    }
}

#[async_trait]
impl StockSource for MockStockSource {
    async fn realtime_price(&self, symbol: &str) -> Result<StockPrice> {
        let listing = Self::lookup(symbol)?;
        let spread = (listing.price * dec!(0.015)).round_dp(2);

        Ok(StockPrice {
            symbol: symbol.to_string(),
            price: listing.price,
            currency: "USD".into(),
            day_high: listing.price + spread,
            day_low: listing.price - spread,
            open_price: listing.previous_close,
            previous_close: listing.previous_close,
            volume: listing.volume,
            market_cap: Some(listing.market_cap),
            timestamp: Utc::now(),
        })
    }

    async fn historical_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        period: PricePeriod,
    ) -> Result<HistoricalStockPrice> {
        let listing = Self::lookup(symbol)?;

        let mut prices = Vec::new();
        let mut date = Some(start);
        while let Some(current) = date.filter(|d| *d <= end) {
            if prices.len() == MAX_POINTS {
                tracing::debug!(symbol, max = MAX_POINTS, "Truncating mock price series");
                break;
            }
            prices.push(PricePoint {
                date: current,
                close: Self::close_on(&listing, current),
                volume: listing.volume,
            });
            date = period.step(current);
        }

        HistoricalStockPrice::new(symbol, start, end, period, prices)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
