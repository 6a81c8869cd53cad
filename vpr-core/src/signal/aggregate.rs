//! Resample a candle series into target-timeframe buckets with VPR and flags.

use super::classify::Thresholds;
use super::vpr::{candle_returns, VprAccumulator};
use crate::domain::{Bucket, Candle, CandleSeries};
use crate::timeframe::Timeframe;

/// Bucket under construction.
struct Pending {
    bucket: Bucket,
    vpr: VprAccumulator,
}

impl Pending {
    fn open(symbol: &str, start: i64, candle: &Candle) -> Self {
        Self {
            bucket: Bucket {
                symbol: symbol.to_string(),
                start,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: 0.0,
                candle_count: 0,
                vpr: None,
                hard_to_grow: false,
                hard_to_fall: false,
            },
            vpr: VprAccumulator::new(),
        }
    }

    fn add(&mut self, candle: &Candle, ret: Option<f64>) {
        let b = &mut self.bucket;
        b.high = b.high.max(candle.high);
        b.low = b.low.min(candle.low);
        b.close = candle.close;
        if !candle.volume.is_nan() {
            b.volume += candle.volume;
        }
        b.candle_count += 1;
        self.vpr.push(ret, candle.volume);
    }

    fn close(self, thresholds: &Thresholds) -> Bucket {
        let mut bucket = self.bucket;
        bucket.vpr = self.vpr.finish();
        let flags = thresholds.classify(bucket.vpr);
        bucket.hard_to_grow = flags.hard_to_grow;
        bucket.hard_to_fall = flags.hard_to_fall;
        bucket
    }
}

/// Resample `series` into `target` buckets.
///
/// Returns are computed across the whole series before bucketing, so the
/// first candle of a bucket compares against the last candle of the previous
/// one. Buckets with no candles are omitted. Output is ordered by start.
pub fn aggregate(series: &CandleSeries, target: Timeframe, thresholds: &Thresholds) -> Vec<Bucket> {
    let candles = series.candles();
    let returns = candle_returns(candles);
    let mut buckets = Vec::new();
    let mut pending: Option<Pending> = None;

    for (candle, ret) in candles.iter().zip(returns) {
        let start = target.bucket_start(candle.timestamp);

        if let Some(p) = pending.as_mut().filter(|p| p.bucket.start == start) {
            p.add(candle, ret);
            continue;
        }

        if let Some(done) = pending.take() {
            buckets.push(done.close(thresholds));
        }
        let mut p = Pending::open(series.symbol(), start, candle);
        p.add(candle, ret);
        pending = Some(p);
    }

    if let Some(done) = pending {
        buckets.push(done.close(thresholds));
    }
    buckets
}
