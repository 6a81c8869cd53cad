//! Market data: exchange access, pagination, canonicalization

pub mod binance;
pub mod canonicalize;
pub mod fetcher;
pub mod provider;
pub mod retry;
pub mod synthetic;

use std::sync::Arc;

pub use binance::BinanceExchange;
pub use canonicalize::{AnomalyReport, AnomalyType, Canonicalizer, Severity};
pub use fetcher::{fetch, parse_since, FetchError, FetchRequest, Fetcher};
pub use provider::{DataError, Exchange, RawCandle};
pub use retry::RetryPolicy;
pub use synthetic::SyntheticExchange;

/// Exchange identifiers understood by [`exchange_for`].
pub const KNOWN_EXCHANGES: &[&str] = &["binance", "synthetic"];

/// Resolve an exchange identifier to a live client.
pub fn exchange_for(id: &str) -> Result<Arc<dyn Exchange>, DataError> {
    match id.trim().to_ascii_lowercase().as_str() {
        "binance" => Ok(Arc::new(BinanceExchange::new()?)),
        "synthetic" => Ok(Arc::new(SyntheticExchange::default())),
        other => Err(DataError::UnknownExchange(other.to_string())),
    }
}
