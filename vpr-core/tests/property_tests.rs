//! Property tests for canonicalization and resampling.
//!
//! Uses proptest to verify:
//! 1. Dedup — canonical series has strictly increasing, unique timestamps,
//!    and the first fetched copy of each timestamp wins
//! 2. Identity resample — target == source reproduces every candle
//! 3. Coverage — every candle lands in exactly one aligned bucket
//! 4. Threshold inclusivity — flags match `>=` / `<=` exactly

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use vpr_core::data::{Canonicalizer, RawCandle};
use vpr_core::domain::{Candle, CandleSeries};
use vpr_core::signal::{aggregate, Thresholds};
use vpr_core::Timeframe;

const FIVE_MIN: i64 = 300_000;
const HOUR: i64 = 3_600_000;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (10.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_volume() -> impl Strategy<Value = f64> {
    (0.0..1000.0_f64).prop_map(|v| (v * 10.0).round() / 10.0)
}

/// Raw rows with repeated timestamps in arbitrary order, as overlapping
/// pages would deliver them.
fn arb_raw_pages() -> impl Strategy<Value = Vec<RawCandle>> {
    prop::collection::vec((0..200i64, arb_price(), arb_volume()), 0..300).prop_map(|rows| {
        rows.into_iter()
            .map(|(slot, close, volume)| {
                RawCandle::new(slot * FIVE_MIN, close, close + 1.0, close - 1.0, close, volume)
            })
            .collect()
    })
}

/// A valid series: unique, increasing five-minute timestamps with gaps.
fn arb_series() -> impl Strategy<Value = CandleSeries> {
    prop::collection::btree_set(0..2_000i64, 1..200)
        .prop_flat_map(|slots| {
            let n = slots.len();
            (
                Just(slots),
                prop::collection::vec((arb_price(), arb_price(), arb_volume()), n),
            )
        })
        .prop_map(|(slots, prices)| {
            let candles = slots
                .into_iter()
                .zip(prices)
                .map(|(slot, (open, close, volume))| Candle {
                    symbol: "BTC/USDT".into(),
                    timestamp: slot * FIVE_MIN,
                    open,
                    high: open.max(close) + 0.5,
                    low: open.min(close) - 0.5,
                    close,
                    volume,
                })
                .collect();
            CandleSeries::from_sorted("BTC/USDT", candles).unwrap()
        })
}

// ── 1. Dedup ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn dedup_yields_strictly_increasing_unique_timestamps(rows in arb_raw_pages()) {
        let mut first_close: BTreeMap<i64, f64> = BTreeMap::new();
        for row in &rows {
            first_close.entry(row.timestamp).or_insert(row.close);
        }

        let series = Canonicalizer::canonicalize("BTC/USDT", rows).unwrap();

        for pair in series.candles().windows(2) {
            prop_assert!(pair[0].timestamp < pair[1].timestamp);
        }
        prop_assert_eq!(series.len(), first_close.len());
        for candle in series.iter() {
            prop_assert_eq!(Some(&candle.close), first_close.get(&candle.timestamp));
        }
    }
}

// ── 2. Identity resample ─────────────────────────────────────────────

proptest! {
    #[test]
    fn identity_resample_reproduces_ohlcv(series in arb_series()) {
        let buckets = aggregate(&series, Timeframe::minutes(5), &Thresholds::default());

        prop_assert_eq!(buckets.len(), series.len());
        for (bucket, candle) in buckets.iter().zip(series.iter()) {
            prop_assert_eq!(bucket.start, candle.timestamp);
            prop_assert_eq!(bucket.open, candle.open);
            prop_assert_eq!(bucket.high, candle.high);
            prop_assert_eq!(bucket.low, candle.low);
            prop_assert_eq!(bucket.close, candle.close);
            prop_assert_eq!(bucket.volume, candle.volume);
            prop_assert_eq!(bucket.candle_count, 1);
        }
    }
}

// ── 3. Coverage ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn every_candle_lands_in_one_aligned_bucket(series in arb_series()) {
        let target = Timeframe::hours(1);
        let buckets = aggregate(&series, target, &Thresholds::default());

        let total: usize = buckets.iter().map(|b| b.candle_count).sum();
        prop_assert_eq!(total, series.len());

        for pair in buckets.windows(2) {
            prop_assert!(pair[0].start < pair[1].start);
        }
        for bucket in &buckets {
            prop_assert_eq!(bucket.start.rem_euclid(HOUR), 0);
            prop_assert!(bucket.candle_count >= 1);
        }

        let starts: BTreeSet<i64> = buckets.iter().map(|b| b.start).collect();
        for candle in series.iter() {
            prop_assert!(starts.contains(&target.bucket_start(candle.timestamp)));
        }
    }

    #[test]
    fn bucket_volume_is_sum_of_members(series in arb_series()) {
        let target = Timeframe::hours(1);
        let buckets = aggregate(&series, target, &Thresholds::default());
        for bucket in &buckets {
            let expected: f64 = series
                .iter()
                .filter(|c| target.bucket_start(c.timestamp) == bucket.start)
                .map(|c| c.volume)
                .sum();
            prop_assert!((bucket.volume - expected).abs() < 1e-6);
        }
    }
}

// ── 4. Threshold inclusivity ─────────────────────────────────────────

proptest! {
    #[test]
    fn flags_follow_inclusive_thresholds(
        vpr in 0.0..100.0_f64,
        grow in 0.0..100.0_f64,
        fall in 0.0..100.0_f64,
    ) {
        let th = Thresholds::new(grow, fall);
        let flags = th.classify(Some(vpr));
        prop_assert_eq!(flags.hard_to_grow, vpr >= grow);
        prop_assert_eq!(flags.hard_to_fall, vpr <= fall);

        let at_grow = th.classify(Some(grow));
        prop_assert!(at_grow.hard_to_grow);
        let at_fall = th.classify(Some(fall));
        prop_assert!(at_fall.hard_to_fall);
    }

    #[test]
    fn vpr_stays_on_percent_scale(series in arb_series()) {
        let buckets = aggregate(&series, Timeframe::hours(1), &Thresholds::default());
        for bucket in &buckets {
            if let Some(v) = bucket.vpr {
                prop_assert!((0.0..=100.0).contains(&v));
            } else {
                prop_assert!(!bucket.hard_to_grow && !bucket.hard_to_fall);
            }
        }
    }
}
