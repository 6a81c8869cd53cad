//! Exchange capability trait and structured error types.
//!
//! The Exchange trait abstracts over market data sources (Binance REST, the
//! offline synthetic generator) so the fetcher can be driven by a fake in
//! tests. The fetcher only depends on this capability set.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timeframe::Timeframe;

/// Raw OHLCV row from an exchange, `[timestamp_ms, open, high, low, close, volume]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl RawCandle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Structured error types for exchange operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by exchange (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("exchange unavailable: {0}")]
    ExchangeUnavailable(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("request rejected: {0}")]
    BadRequest(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("unknown exchange '{0}'")]
    UnknownExchange(String),

    #[error("exchange '{exchange}' does not support timeframe {timeframe}")]
    UnsupportedTimeframe { exchange: String, timeframe: String },

    #[error("canonicalization failed: {0}")]
    Canonicalize(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether waiting and retrying the same request can succeed.
    ///
    /// Network failures, rate limits, server-side outages and garbled
    /// payloads are transient. Bad symbols, credentials and configuration
    /// are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_)
                | DataError::RateLimited { .. }
                | DataError::ExchangeUnavailable(_)
                | DataError::ResponseFormatChanged(_)
                | DataError::Other(_)
        )
    }

    /// Minimum wait the exchange asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DataError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

/// Capability set the fetcher needs from an exchange.
///
/// Implementations handle the specifics of a particular venue. Retrying,
/// pagination and deduplication live above this trait in the fetcher.
pub trait Exchange: Send + Sync {
    /// Exchange identifier, e.g. `binance`.
    fn id(&self) -> &str;

    /// Load the tradable markets as unified symbols (`BASE/QUOTE`).
    fn load_markets(&self) -> Result<Vec<String>, DataError>;

    /// Fetch up to `limit` candles with open time `>= since` (ms).
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: i64,
        limit: usize,
    ) -> Result<Vec<RawCandle>, DataError>;

    /// Whether the exchange serves candles at this granularity.
    fn supports_timeframe(&self, timeframe: Timeframe) -> bool;

    /// Minimum interval between two requests.
    fn rate_limit(&self) -> Duration;

    /// Largest page size the endpoint accepts.
    fn max_page_size(&self) -> usize {
        1000
    }

    /// Current exchange time in milliseconds since the epoch.
    fn milliseconds(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
