//! VPR Core — candles, timeframes, exchange fetcher, aggregation, signals, charts.
//!
//! This crate contains the signal computation pipeline:
//! - Domain types (candles, series, buckets)
//! - Timeframe parsing and bucket alignment
//! - Exchange capability trait with Binance and synthetic implementations
//! - Paginated fetcher with bounded retry and cancellation
//! - Resampling with the volume/price ratio per bucket
//! - Threshold classification and the alert decision
//! - PNG chart rendering

pub mod chart;
pub mod data;
pub mod domain;
pub mod signal;
pub mod timeframe;

pub use timeframe::{TimeUnit, Timeframe, TimeframeError};
