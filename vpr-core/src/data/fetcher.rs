//! Paginated OHLCV fetcher.
//!
//! Walks an exchange's candle endpoint forward from `since`, one page at a
//! time, until the exchange stops making progress or the cursor reaches the
//! exchange clock. Transient failures are retried under a [`RetryPolicy`];
//! everything else surfaces immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::canonicalize::Canonicalizer;
use super::exchange_for;
use super::provider::{DataError, Exchange, RawCandle};
use super::retry::RetryPolicy;
use crate::domain::CandleSeries;
use crate::timeframe::{Timeframe, TimeframeError};

/// Longest uninterrupted sleep; cancellation is checked between slices.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid fetch configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Timeframe(#[from] TimeframeError),

    #[error(transparent)]
    Exchange(#[from] DataError),

    #[error("gave up after {attempts} attempts over {elapsed_secs}s: {last}")]
    RetriesExhausted {
        attempts: u32,
        elapsed_secs: u64,
        last: DataError,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

/// What to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub since: DateTime<Utc>,
    /// Candles per page.
    pub limit: usize,
}

impl FetchRequest {
    /// Build a request from user-facing strings.
    pub fn parse(symbol: &str, timeframe: &str, since: &str, limit: usize) -> Result<Self, FetchError> {
        if symbol.trim().is_empty() {
            return Err(FetchError::Config("symbol must not be empty".into()));
        }
        Ok(Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.parse()?,
            since: parse_since(since)?,
            limit,
        })
    }
}

/// Parse an ISO-8601 start time. Naive values are taken as UTC.
pub fn parse_since(s: &str) -> Result<DateTime<Utc>, FetchError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| FetchError::Config(format!("unparseable start time '{s}'")))
}

/// Fetches one symbol's candle history from one exchange.
pub struct Fetcher {
    exchange: Arc<dyn Exchange>,
    request: FetchRequest,
    retry: RetryPolicy,
    cancel: Arc<AtomicBool>,
}

impl Fetcher {
    /// Validate the request against the exchange's capabilities.
    pub fn new(
        exchange: Arc<dyn Exchange>,
        mut request: FetchRequest,
        retry: RetryPolicy,
    ) -> Result<Self, FetchError> {
        if request.limit == 0 {
            return Err(FetchError::Config("limit must be at least 1".into()));
        }
        if !exchange.supports_timeframe(request.timeframe) {
            return Err(FetchError::Config(
                DataError::UnsupportedTimeframe {
                    exchange: exchange.id().to_string(),
                    timeframe: request.timeframe.to_string(),
                }
                .to_string(),
            ));
        }
        let max_page = exchange.max_page_size();
        if request.limit > max_page {
            warn!(
                exchange = exchange.id(),
                requested = request.limit,
                max = max_page,
                "page limit above exchange maximum, clamping"
            );
            request.limit = max_page;
        }

        Ok(Self {
            exchange,
            request,
            retry,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Resolve the exchange by identifier and validate everything up front.
    pub fn from_ids(
        exchange_id: &str,
        symbol: &str,
        timeframe: &str,
        since: &str,
        limit: usize,
        retry: RetryPolicy,
    ) -> Result<Self, FetchError> {
        let exchange = exchange_for(exchange_id).map_err(|e| FetchError::Config(e.to_string()))?;
        let request = FetchRequest::parse(symbol, timeframe, since, limit)?;
        Self::new(exchange, request, retry)
    }

    /// Share an external cancellation flag.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    pub fn exchange(&self) -> &dyn Exchange {
        self.exchange.as_ref()
    }

    /// Fetch every page and return the canonical series.
    pub fn fetch(&self) -> Result<CandleSeries, FetchError> {
        let symbol = self.request.symbol.as_str();
        let timeframe = self.request.timeframe;
        let limit = self.request.limit;

        let markets = self.with_retry("load_markets", || self.exchange.load_markets())?;
        if !markets.is_empty() && !markets.iter().any(|m| m == symbol) {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            }
            .into());
        }

        let mut cursor = self.request.since.timestamp_millis();
        let mut rows: Vec<RawCandle> = Vec::new();
        let mut pages = 0usize;

        while cursor < self.exchange.milliseconds() {
            let page = self.with_retry("fetch_ohlcv", || {
                self.exchange.fetch_ohlcv(symbol, timeframe, cursor, limit)
            })?;
            pages += 1;

            // A lone candle is the cursor candle coming back: nothing new.
            let last_ts = match page.last() {
                Some(last) if page.len() > 1 => last.timestamp,
                _ => {
                    debug!(page = pages, candles = page.len(), cursor, "end of history");
                    break;
                }
            };

            debug!(page = pages, candles = page.len(), cursor, last_ts, "page fetched");
            rows.extend(page);

            if last_ts <= cursor {
                warn!(cursor, last_ts, "exchange did not advance, stopping pagination");
                break;
            }
            cursor = last_ts;
            self.pause(self.exchange.rate_limit())?;
        }

        let fetched = rows.len();
        let series = Canonicalizer::canonicalize(symbol, rows)?;
        for anomaly in Canonicalizer::detect_anomalies(&series, timeframe) {
            warn!(
                symbol,
                kind = ?anomaly.anomaly_type,
                count = anomaly.count,
                severity = ?anomaly.severity,
                "data anomaly"
            );
        }

        info!(
            exchange = self.exchange.id(),
            symbol,
            %timeframe,
            pages,
            fetched,
            candles = series.len(),
            "fetch complete"
        );
        Ok(series)
    }

    fn check_cancelled(&self) -> Result<(), FetchError> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep through the exchange in short slices so cancellation stays responsive.
    fn pause(&self, total: Duration) -> Result<(), FetchError> {
        let mut remaining = total;
        while !remaining.is_zero() {
            self.check_cancelled()?;
            let slice = remaining.min(SLEEP_SLICE);
            self.exchange.sleep(slice);
            remaining -= slice;
        }
        self.check_cancelled()
    }

    fn with_retry<T>(
        &self,
        op: &'static str,
        mut call: impl FnMut() -> Result<T, DataError>,
    ) -> Result<T, FetchError> {
        let started = Instant::now();
        let base = self.exchange.rate_limit() * 2;
        let mut attempts = 0u32;

        loop {
            self.check_cancelled()?;
            attempts += 1;

            let err = match call() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e.into()),
                Err(e) => e,
            };

            let elapsed = started.elapsed();
            if !self.retry.allows(attempts, elapsed) {
                warn!(op, attempts, error = %err, "retry budget exhausted");
                return Err(FetchError::RetriesExhausted {
                    attempts,
                    elapsed_secs: elapsed.as_secs(),
                    last: err,
                });
            }

            let delay = self.retry.delay_for(base, attempts, &err);
            warn!(
                op,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient exchange error, retrying"
            );
            self.pause(delay)?;
        }
    }
}

/// One-shot fetch with the default retry policy.
pub fn fetch(
    symbol: &str,
    exchange_id: &str,
    timeframe: &str,
    since: &str,
    limit: usize,
) -> Result<CandleSeries, FetchError> {
    Fetcher::from_ids(exchange_id, symbol, timeframe, since, limit, RetryPolicy::default())?.fetch()
}
