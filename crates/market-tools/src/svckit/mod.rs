//! Market Tools
//!
//! Tool-contract handlers over the market data sources.

mod document_search;
mod historical_price;
mod realtime_price;

pub use document_search::DocumentSearchTool;
pub use historical_price::HistoricalPriceTool;
pub use realtime_price::RealtimePriceTool;

use agent_core::ToolError;
use agent_core::tool::ToolArguments;

/// String argument; the registry has already checked presence and type
fn string_arg<'a>(arguments: &'a ToolArguments, name: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidInput(format!("'{}' must be a string", name)))
}

fn optional_string_arg<'a>(arguments: &'a ToolArguments, name: &str) -> Option<&'a str> {
    arguments.get(name).and_then(|v| v.as_str())
}
