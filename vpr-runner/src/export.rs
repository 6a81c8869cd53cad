//! CSV export of fetched candles and aggregated buckets.
//!
//! Dates are written as UTC `YYYY-MM-DD HH:MM:SS`. A bucket without a VPR
//! gets an empty `vpr` cell.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use vpr_core::domain::{Bucket, CandleSeries};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CANDLE_HEADER: [&str; 7] = ["date", "open", "high", "low", "close", "volume", "symbol"];

const BUCKET_HEADER: [&str; 10] = [
    "date",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "symbol",
    "vpr",
    "hard_to_grow",
    "hard_to_fall",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush CSV writer: {0}")]
    Flush(#[from] std::io::Error),
}

fn format_date(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Write the series as CSV to any writer.
pub fn write_candles<W: Write>(writer: W, series: &CandleSeries) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CANDLE_HEADER)?;
    for c in series.iter() {
        wtr.write_record([
            &format_date(c.timestamp),
            &c.open.to_string(),
            &c.high.to_string(),
            &c.low.to_string(),
            &c.close.to_string(),
            &c.volume.to_string(),
            &c.symbol,
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write buckets with their VPR and flags as CSV to any writer.
pub fn write_buckets<W: Write>(writer: W, buckets: &[Bucket]) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(BUCKET_HEADER)?;
    for b in buckets {
        wtr.write_record([
            &format_date(b.start),
            &b.open.to_string(),
            &b.high.to_string(),
            &b.low.to_string(),
            &b.close.to_string(),
            &b.volume.to_string(),
            &b.symbol,
            &b.vpr.map(|v| format!("{v:.3}")).unwrap_or_default(),
            &b.hard_to_grow.to_string(),
            &b.hard_to_fall.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_candles_csv(path: &Path, series: &CandleSeries) -> Result<(), ExportError> {
    write_candles(create(path)?, series)?;
    info!(path = %path.display(), rows = series.len(), "candles exported");
    Ok(())
}

pub fn write_buckets_csv(path: &Path, buckets: &[Bucket]) -> Result<(), ExportError> {
    write_buckets(create(path)?, buckets)?;
    info!(path = %path.display(), rows = buckets.len(), "buckets exported");
    Ok(())
}

fn create(path: &Path) -> Result<File, ExportError> {
    File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
