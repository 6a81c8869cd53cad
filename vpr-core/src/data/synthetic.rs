//! Offline exchange that generates deterministic candles.
//!
//! Every candle is a pure function of `(seed, symbol, open time)`, so pages
//! requested with different cursors and limits always agree on overlapping
//! candles. Useful for demos, benches and tests without network access.

use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataError, Exchange, RawCandle};
use crate::timeframe::Timeframe;

const DEFAULT_SEED: u64 = 42;
const DEFAULT_SYMBOLS: &[&str] = &["BTC/USDT", "ETH/USDT"];

/// Seeded random-walk exchange.
#[derive(Debug, Clone)]
pub struct SyntheticExchange {
    seed: u64,
    symbols: Vec<String>,
    now_ms: Option<i64>,
}

impl Default for SyntheticExchange {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl SyntheticExchange {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            now_ms: None,
        }
    }

    /// Freeze the exchange clock.
    pub fn with_now(mut self, now_ms: i64) -> Self {
        self.now_ms = Some(now_ms);
        self
    }

    pub fn with_symbols(mut self, symbols: &[&str]) -> Self {
        self.symbols = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    fn symbol_salt(symbol: &str) -> u64 {
        symbol
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3))
    }

    fn rng_at(&self, salt: u64, index: i64) -> StdRng {
        let mixed = self.seed ^ salt ^ (index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        StdRng::seed_from_u64(mixed)
    }

    /// Close price of the candle with the given index.
    fn close_at(&self, salt: u64, base: f64, index: i64) -> f64 {
        let mut rng = self.rng_at(salt, index);
        let wave = (index as f64 / 48.0).sin() * 0.04 + (index as f64 / 7.0).sin() * 0.01;
        let noise: f64 = rng.gen_range(-0.004..0.004);
        base * (1.0 + wave + noise)
    }

    fn candle_at(&self, symbol: &str, width: i64, index: i64) -> RawCandle {
        let salt = Self::symbol_salt(symbol);
        let base = 1_000.0 + (salt % 50_000) as f64;
        let open = self.close_at(salt, base, index - 1);
        let close = self.close_at(salt, base, index);

        let mut rng = self.rng_at(salt.rotate_left(17), index);
        let wick_up: f64 = rng.gen_range(0.0..0.002);
        let wick_down: f64 = rng.gen_range(0.0..0.002);
        let volume: f64 = rng.gen_range(10.0..500.0);

        RawCandle {
            timestamp: index * width,
            open,
            high: open.max(close) * (1.0 + wick_up),
            low: open.min(close) * (1.0 - wick_down),
            close,
            volume,
        }
    }
}

impl Exchange for SyntheticExchange {
    fn id(&self) -> &str {
        "synthetic"
    }

    fn load_markets(&self) -> Result<Vec<String>, DataError> {
        Ok(self.symbols.clone())
    }

    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: i64,
        limit: usize,
    ) -> Result<Vec<RawCandle>, DataError> {
        if !self.symbols.iter().any(|s| s == symbol) {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        let width = timeframe
            .fixed_width_ms()
            .ok_or_else(|| DataError::UnsupportedTimeframe {
                exchange: self.id().to_string(),
                timeframe: timeframe.to_string(),
            })?;

        let now = self.milliseconds();
        let first = since.div_euclid(width) + i64::from(since.rem_euclid(width) != 0);
        Ok((first..)
            .take(limit)
            .map(|index| self.candle_at(symbol, width, index))
            .take_while(|c| c.timestamp <= now)
            .collect())
    }

    fn supports_timeframe(&self, timeframe: Timeframe) -> bool {
        timeframe.fixed_width_ms().is_some()
    }

    fn rate_limit(&self) -> Duration {
        Duration::ZERO
    }

    fn milliseconds(&self) -> i64 {
        self.now_ms.unwrap_or_else(|| Utc::now().timestamp_millis())
    }
}
