//! VPR signal computation: resampling, ratio, classification

pub mod aggregate;
pub mod classify;
pub mod vpr;

pub use aggregate::aggregate;
pub use classify::{completed, evaluate, format_vpr, SignalFlags, SignalReport, Thresholds};
pub use vpr::{candle_returns, round3, volume_price_ratio, VprAccumulator};
