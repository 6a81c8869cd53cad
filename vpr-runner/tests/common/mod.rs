//! Shared fixtures: an exchange that replays a fixed candle history.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use vpr_core::data::{DataError, Exchange, RawCandle};
use vpr_core::Timeframe;
use vpr_runner::SignalConfig;

pub const FIVE_MIN: i64 = 300_000;
pub const HOUR: i64 = 3_600_000;

/// Serves every candle at or after `since`, like a real exchange would, so
/// each pipeline run sees the same history.
pub struct ReplayExchange {
    candles: Vec<RawCandle>,
    now_ms: i64,
    fetches: AtomicUsize,
}

impl ReplayExchange {
    pub fn new(candles: Vec<RawCandle>, now_ms: i64) -> Self {
        Self {
            candles,
            now_ms,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Exchange for ReplayExchange {
    fn id(&self) -> &str {
        "replay"
    }

    fn load_markets(&self) -> Result<Vec<String>, DataError> {
        Ok(vec!["BTC/USDT".into()])
    }

    fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        since: i64,
        limit: usize,
    ) -> Result<Vec<RawCandle>, DataError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .candles
            .iter()
            .filter(|c| c.timestamp >= since)
            .take(limit)
            .copied()
            .collect())
    }

    fn supports_timeframe(&self, _timeframe: Timeframe) -> bool {
        true
    }

    fn rate_limit(&self) -> Duration {
        Duration::ZERO
    }

    fn milliseconds(&self) -> i64 {
        self.now_ms
    }

    fn sleep(&self, _duration: Duration) {}
}

pub fn candle(ts: i64, close: f64, volume: f64) -> RawCandle {
    RawCandle::new(ts, close, close + 0.5, close - 0.5, close, volume)
}

/// One flat hour, one V-shaped hour with heavier volume on the way up
/// (VPR 75), then a single candle opening the third hour.
pub fn v_shape_history() -> Vec<RawCandle> {
    let mut candles: Vec<RawCandle> = (0..12).map(|i| candle(i * FIVE_MIN, 100.0, 10.0)).collect();
    let v_closes = [99.0, 98.0, 97.0, 96.0, 95.0, 94.0, 95.0, 96.0, 97.0, 98.0, 99.0, 100.0];
    for (i, close) in v_closes.iter().enumerate() {
        let volume = if i < 6 { 10.0 } else { 30.0 };
        candles.push(candle(HOUR + i as i64 * FIVE_MIN, *close, volume));
    }
    candles.push(candle(2 * HOUR, 101.0, 5.0));
    candles
}

/// Every hour climbs steadily: no negative returns after the first candle.
pub fn rising_history(hours: i64) -> Vec<RawCandle> {
    (0..hours * 12 + 1)
        .map(|i| candle(i * FIVE_MIN, 100.0 + i as f64, 10.0))
        .collect()
}

pub fn test_config() -> SignalConfig {
    let mut config = SignalConfig::default_binance();
    config.market.exchange_id = "replay".into();
    config.market.since = "1970-01-01T00:00:00Z".into();
    config.chart.width = 200;
    config.chart.height = 160;
    config
}
