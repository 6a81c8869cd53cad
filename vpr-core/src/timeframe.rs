//! Timeframe parsing and bucket alignment.
//!
//! Timeframes use exchange notation: `<count><unit>` with unit `m`/`min`
//! (minute), `h` (hour), `d` (day), `w` (week) or `M` (calendar month).
//!
//! Bucket boundaries are anchored to a canonical origin so that every
//! timestamp maps to exactly one bucket:
//! - minutes, hours and days are aligned to the Unix epoch;
//! - weeks start on Monday 00:00 UTC (counted from 1970-01-05);
//! - months start on the first day of a calendar month.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;
/// 1970-01-05T00:00:00Z, the first Monday after the epoch.
const WEEK_ORIGIN_MS: i64 = 4 * DAY_MS;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("invalid timeframe '{0}': expected <count><unit> with unit m, h, d, w or M")]
    Invalid(String),

    #[error("invalid timeframe '{0}': count must be at least 1")]
    ZeroCount(String),
}

/// Calendar unit of a timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeUnit {
    fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Minute => "m",
            TimeUnit::Hour => "h",
            TimeUnit::Day => "d",
            TimeUnit::Week => "w",
            TimeUnit::Month => "M",
        }
    }
}

/// A candle or bucket width such as `5m` or `1h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    count: u32,
    unit: TimeUnit,
}

impl Timeframe {
    pub fn new(count: u32, unit: TimeUnit) -> Result<Self, TimeframeError> {
        if count == 0 {
            return Err(TimeframeError::ZeroCount(format!("{count}{}", unit.suffix())));
        }
        Ok(Self { count, unit })
    }

    pub fn minutes(count: u32) -> Self {
        Self {
            count: count.max(1),
            unit: TimeUnit::Minute,
        }
    }

    pub fn hours(count: u32) -> Self {
        Self {
            count: count.max(1),
            unit: TimeUnit::Hour,
        }
    }

    pub fn days(count: u32) -> Self {
        Self {
            count: count.max(1),
            unit: TimeUnit::Day,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Width in milliseconds, or `None` for calendar months.
    pub fn fixed_width_ms(&self) -> Option<i64> {
        let unit_ms = match self.unit {
            TimeUnit::Minute => MINUTE_MS,
            TimeUnit::Hour => HOUR_MS,
            TimeUnit::Day => DAY_MS,
            TimeUnit::Week => WEEK_MS,
            TimeUnit::Month => return None,
        };
        Some(unit_ms * i64::from(self.count))
    }

    /// Start of the bucket containing `ts_ms`.
    pub fn bucket_start(&self, ts_ms: i64) -> i64 {
        match self.unit {
            TimeUnit::Minute | TimeUnit::Hour | TimeUnit::Day => {
                let width = self.fixed_width_ms().unwrap_or(MINUTE_MS);
                ts_ms - ts_ms.rem_euclid(width)
            }
            TimeUnit::Week => {
                let width = WEEK_MS * i64::from(self.count);
                ts_ms - (ts_ms - WEEK_ORIGIN_MS).rem_euclid(width)
            }
            TimeUnit::Month => {
                let Some(dt) = DateTime::from_timestamp_millis(ts_ms) else {
                    return ts_ms;
                };
                let index = i64::from(dt.year()) * 12 + i64::from(dt.month0());
                let aligned = index - index.rem_euclid(i64::from(self.count));
                month_index_to_ms(aligned).unwrap_or(ts_ms)
            }
        }
    }

    /// Exclusive end of the bucket starting at `start_ms`.
    pub fn next_start(&self, start_ms: i64) -> i64 {
        match self.fixed_width_ms() {
            Some(width) => start_ms + width,
            None => {
                let Some(dt) = DateTime::from_timestamp_millis(start_ms) else {
                    return start_ms;
                };
                let index = i64::from(dt.year()) * 12 + i64::from(dt.month0());
                month_index_to_ms(index + i64::from(self.count)).unwrap_or(start_ms)
            }
        }
    }
}

fn month_index_to_ms(index: i64) -> Option<i64> {
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12) + 1).ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || TimeframeError::Invalid(s.to_string());

        let (digits, unit) = if let Some(rest) = trimmed.strip_suffix("min") {
            (rest, TimeUnit::Minute)
        } else {
            let mut chars = trimmed.chars();
            let unit = match chars.next_back().ok_or_else(invalid)? {
                'm' => TimeUnit::Minute,
                'h' | 'H' => TimeUnit::Hour,
                'd' | 'D' => TimeUnit::Day,
                'w' | 'W' => TimeUnit::Week,
                'M' => TimeUnit::Month,
                _ => return Err(invalid()),
            };
            (chars.as_str(), unit)
        };

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let count: u32 = digits.parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(TimeframeError::ZeroCount(s.to_string()));
        }
        Ok(Self { count, unit })
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}
