use polars::prelude::*;

use super::provider::{DataError, RawCandle};
use crate::domain::{Candle, CandleSeries};
use crate::timeframe::Timeframe;

/// Canonicalizer for fetched candle pages
pub struct Canonicalizer;

impl Canonicalizer {
    /// Turn concatenated pages into a sorted, deduplicated series.
    ///
    /// Rows sharing a timestamp collapse to the one fetched first.
    pub fn canonicalize(symbol: &str, raw: Vec<RawCandle>) -> Result<CandleSeries, DataError> {
        if raw.is_empty() {
            return Ok(CandleSeries::new(symbol));
        }
        let frame = Self::to_frame(&raw).map_err(polars_err)?;
        let df = Self::canonical_frame(frame.lazy())
            .collect()
            .map_err(polars_err)?;
        Self::from_frame(symbol, &df)
    }

    /// Sort by timestamp (stable), then keep the first row per timestamp.
    pub fn canonical_frame(df: LazyFrame) -> LazyFrame {
        df.sort(
            ["timestamp"],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .unique_stable(Some(vec!["timestamp".into()]), UniqueKeepStrategy::First)
    }

    fn to_frame(raw: &[RawCandle]) -> PolarsResult<DataFrame> {
        df!(
            "timestamp" => raw.iter().map(|c| c.timestamp).collect::<Vec<_>>(),
            "open" => raw.iter().map(|c| c.open).collect::<Vec<_>>(),
            "high" => raw.iter().map(|c| c.high).collect::<Vec<_>>(),
            "low" => raw.iter().map(|c| c.low).collect::<Vec<_>>(),
            "close" => raw.iter().map(|c| c.close).collect::<Vec<_>>(),
            "volume" => raw.iter().map(|c| c.volume).collect::<Vec<_>>(),
        )
    }

    fn from_frame(symbol: &str, df: &DataFrame) -> Result<CandleSeries, DataError> {
        let ts = df
            .column("timestamp")
            .and_then(|c| c.i64())
            .map_err(polars_err)?;
        let float = |name: &str| df.column(name).and_then(|c| c.f64()).map_err(polars_err);
        let (open, high, low, close, volume) = (
            float("open")?,
            float("high")?,
            float("low")?,
            float("close")?,
            float("volume")?,
        );

        let mut candles = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let timestamp = ts
                .get(i)
                .ok_or_else(|| DataError::Canonicalize(format!("null timestamp at row {i}")))?;
            candles.push(Candle {
                symbol: symbol.to_string(),
                timestamp,
                open: open.get(i).unwrap_or(f64::NAN),
                high: high.get(i).unwrap_or(f64::NAN),
                low: low.get(i).unwrap_or(f64::NAN),
                close: close.get(i).unwrap_or(f64::NAN),
                volume: volume.get(i).unwrap_or(f64::NAN),
            });
        }

        CandleSeries::from_sorted(symbol, candles).map_err(|e| DataError::Canonicalize(e.to_string()))
    }

    /// Detect anomalies (zero volume, gaps wider than one source interval).
    ///
    /// Gaps are reported, never filled.
    pub fn detect_anomalies(series: &CandleSeries, timeframe: Timeframe) -> Vec<AnomalyReport> {
        let mut anomalies = Vec::new();

        let zero_volume_count = series.iter().filter(|c| c.volume == 0.0).count();
        if zero_volume_count > 0 {
            anomalies.push(AnomalyReport {
                anomaly_type: AnomalyType::ZeroVolume,
                count: zero_volume_count,
                severity: Severity::Warning,
            });
        }

        let gap_count = series
            .candles()
            .windows(2)
            .filter(|pair| pair[1].timestamp > timeframe.next_start(pair[0].timestamp))
            .count();
        if gap_count > 0 {
            anomalies.push(AnomalyReport {
                anomaly_type: AnomalyType::SuspiciousGap,
                count: gap_count,
                severity: Severity::Warning,
            });
        }

        let insane_count = series.iter().filter(|c| !c.is_sane()).count();
        if insane_count > 0 {
            anomalies.push(AnomalyReport {
                anomaly_type: AnomalyType::InconsistentPrice,
                count: insane_count,
                severity: Severity::Error,
            });
        }

        anomalies
    }
}

fn polars_err(e: PolarsError) -> DataError {
    DataError::Canonicalize(e.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyReport {
    pub anomaly_type: AnomalyType,
    pub count: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyType {
    ZeroVolume,
    SuspiciousGap,
    /// high below low, or open/close outside the high-low range
    InconsistentPrice,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_MIN: i64 = 300_000;

    fn raw(ts: i64, close: f64) -> RawCandle {
        RawCandle::new(ts, close, close + 1.0, close - 1.0, close, 10.0)
    }

    #[test]
    fn canonicalize_sorts_candles() {
        let series = Canonicalizer::canonicalize(
            "BTC/USDT",
            vec![raw(3 * FIVE_MIN, 3.0), raw(FIVE_MIN, 1.0), raw(2 * FIVE_MIN, 2.0)],
        )
        .unwrap();

        let ts: Vec<i64> = series.iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![FIVE_MIN, 2 * FIVE_MIN, 3 * FIVE_MIN]);
        assert!(series.iter().all(|c| c.symbol == "BTC/USDT"));
    }

    #[test]
    fn canonicalize_keeps_first_duplicate() {
        // Page boundaries repeat the cursor candle; the first copy wins.
        let series = Canonicalizer::canonicalize(
            "BTC/USDT",
            vec![raw(0, 100.0), raw(FIVE_MIN, 101.0), raw(FIVE_MIN, 999.0), raw(2 * FIVE_MIN, 102.0)],
        )
        .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.candles()[1].close, 101.0);
    }

    #[test]
    fn canonicalize_empty_input() {
        let series = Canonicalizer::canonicalize("BTC/USDT", Vec::new()).unwrap();
        assert!(series.is_empty());
        assert_eq!(series.symbol(), "BTC/USDT");
    }

    #[test]
    fn detects_zero_volume_and_gaps() {
        let mut quiet = raw(FIVE_MIN, 1.0);
        quiet.volume = 0.0;
        let series = Canonicalizer::canonicalize(
            "BTC/USDT",
            vec![raw(0, 1.0), quiet, raw(4 * FIVE_MIN, 1.0)],
        )
        .unwrap();

        let anomalies = Canonicalizer::detect_anomalies(&series, Timeframe::minutes(5));
        assert_eq!(
            anomalies,
            vec![
                AnomalyReport {
                    anomaly_type: AnomalyType::ZeroVolume,
                    count: 1,
                    severity: Severity::Warning,
                },
                AnomalyReport {
                    anomaly_type: AnomalyType::SuspiciousGap,
                    count: 1,
                    severity: Severity::Warning,
                },
            ]
        );
    }

    #[test]
    fn clean_series_has_no_anomalies() {
        let series = Canonicalizer::canonicalize(
            "BTC/USDT",
            (0..12).map(|i| raw(i * FIVE_MIN, 100.0 + i as f64)).collect(),
        )
        .unwrap();
        assert!(Canonicalizer::detect_anomalies(&series, Timeframe::minutes(5)).is_empty());
    }
}
