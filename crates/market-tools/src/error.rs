//! Error Types for Market Tools

use agent_core::ToolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarketError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Start date {start} must be before end date {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Unsupported period '{0}', expected 1d, 1wk or 1mo")]
    UnsupportedPeriod(String),

    #[error("No price data for {0} in the requested range")]
    NoData(String),

    #[error("Invalid search: {0}")]
    InvalidQuery(String),

    #[error("Data source unavailable: {0}")]
    SourceUnavailable(String),
}

impl From<MarketError> for ToolError {
    fn from(err: MarketError) -> Self {
        let message = err.to_string();
        match err {
            MarketError::InvalidSymbol(_)
            | MarketError::InvalidDate(_)
            | MarketError::InvalidDateRange { .. }
            | MarketError::UnsupportedPeriod(_)
            | MarketError::InvalidQuery(_) => ToolError::InvalidInput(message),
            MarketError::UnknownSymbol(_) | MarketError::NoData(_) => ToolError::NotFound(message),
            MarketError::SourceUnavailable(_) => ToolError::Unavailable(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_mapping() {
        assert!(matches!(
            ToolError::from(MarketError::UnknownSymbol("ZZZZ".into())),
            ToolError::NotFound(ref m) if m.contains("ZZZZ")
        ));
        assert!(matches!(
            ToolError::from(MarketError::UnsupportedPeriod("1y".into())),
            ToolError::InvalidInput(_)
        ));
        assert!(matches!(
            ToolError::from(MarketError::SourceUnavailable("quote feed".into())),
            ToolError::Unavailable(_)
        ));
    }
}
