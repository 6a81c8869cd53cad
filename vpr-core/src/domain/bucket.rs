//! Bucket — one resampled target-timeframe row with its VPR and signal flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate of all source candles that fall into `[start, next_start)`.
///
/// `vpr` is `None` when the volume/price ratio is undefined for the bucket
/// (an empty return group or a zero return sum). Both flags are false then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub symbol: String,
    /// Bucket open time, milliseconds since the Unix epoch.
    pub start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Number of source candles aggregated into this bucket.
    pub candle_count: usize,
    pub vpr: Option<f64>,
    pub hard_to_grow: bool,
    pub hard_to_fall: bool,
}

impl Bucket {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start)
    }

    /// True when either signal flag is raised.
    pub fn is_triggered(&self) -> bool {
        self.hard_to_grow || self.hard_to_fall
    }
}
