//! Fetch → aggregate → evaluate against a scripted exchange.
//!
//! The fake exchange replays canned pages and errors, records every request
//! and never sleeps for real.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vpr_core::data::{
    DataError, Exchange, FetchError, FetchRequest, Fetcher, RawCandle, RetryPolicy,
};
use vpr_core::signal::{aggregate, evaluate, Thresholds};
use vpr_core::Timeframe;

const FIVE_MIN: i64 = 300_000;
const HOUR: i64 = 3_600_000;

// ── Fake exchange ────────────────────────────────────────────────────

struct FakeExchange {
    pages: Mutex<VecDeque<Result<Vec<RawCandle>, DataError>>>,
    requests: Mutex<Vec<i64>>,
    sleeps: Mutex<Vec<Duration>>,
    market_calls: Mutex<usize>,
    market_errors: Mutex<VecDeque<DataError>>,
    now_ms: i64,
    cancel_on_sleep: Option<Arc<AtomicBool>>,
}

impl FakeExchange {
    fn new(now_ms: i64, pages: Vec<Result<Vec<RawCandle>, DataError>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            requests: Mutex::new(Vec::new()),
            sleeps: Mutex::new(Vec::new()),
            market_calls: Mutex::new(0),
            market_errors: Mutex::new(VecDeque::new()),
            now_ms,
            cancel_on_sleep: None,
        }
    }

    /// Fail the next `load_markets` calls with these errors, in order.
    fn with_market_errors(self, errors: Vec<DataError>) -> Self {
        *self.market_errors.lock().unwrap() = errors.into();
        self
    }

    fn requests(&self) -> Vec<i64> {
        self.requests.lock().unwrap().clone()
    }

    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Exchange for FakeExchange {
    fn id(&self) -> &str {
        "fake"
    }

    fn load_markets(&self) -> Result<Vec<String>, DataError> {
        *self.market_calls.lock().unwrap() += 1;
        match self.market_errors.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(vec!["BTC/USDT".into()]),
        }
    }

    fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        since: i64,
        _limit: usize,
    ) -> Result<Vec<RawCandle>, DataError> {
        self.requests.lock().unwrap().push(since);
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn supports_timeframe(&self, _timeframe: Timeframe) -> bool {
        true
    }

    fn rate_limit(&self) -> Duration {
        Duration::from_millis(10)
    }

    fn milliseconds(&self) -> i64 {
        self.now_ms
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        if let Some(flag) = &self.cancel_on_sleep {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn candle(ts: i64, close: f64, volume: f64) -> RawCandle {
    RawCandle::new(ts, close, close + 0.5, close - 0.5, close, volume)
}

fn flat(range: std::ops::Range<i64>) -> Vec<RawCandle> {
    range.map(|i| candle(i * FIVE_MIN, 100.0, 10.0)).collect()
}

fn fetcher(exchange: Arc<FakeExchange>, policy: RetryPolicy) -> Fetcher {
    let request = FetchRequest::parse("BTC/USDT", "5m", "1970-01-01T00:00:00Z", 1000).unwrap();
    Fetcher::new(exchange, request, policy).unwrap()
}

fn timestamps(series: &vpr_core::domain::CandleSeries) -> Vec<i64> {
    series.iter().map(|c| c.timestamp).collect()
}

// ── Pagination ───────────────────────────────────────────────────────

#[test]
fn single_candle_page_ends_pagination() {
    let exchange = Arc::new(FakeExchange::new(
        10 * HOUR,
        vec![
            Ok(flat(0..3)),
            Ok(flat(2..5)),
            Ok(vec![candle(4 * FIVE_MIN, 999.0, 1.0)]),
            Ok(flat(10..20)),
        ],
    ));
    let series = fetcher(exchange.clone(), RetryPolicy::default()).fetch().unwrap();

    assert_eq!(timestamps(&series), vec![0, FIVE_MIN, 2 * FIVE_MIN, 3 * FIVE_MIN, 4 * FIVE_MIN]);
    // The lone candle page is discarded.
    assert_eq!(series.last().unwrap().close, 100.0);
    assert_eq!(exchange.requests(), vec![0, 2 * FIVE_MIN, 4 * FIVE_MIN]);
    assert_eq!(*exchange.market_calls.lock().unwrap(), 1);
}

#[test]
fn empty_page_ends_pagination() {
    let exchange = Arc::new(FakeExchange::new(10 * HOUR, vec![Ok(flat(0..4)), Ok(Vec::new())]));
    let series = fetcher(exchange.clone(), RetryPolicy::default()).fetch().unwrap();
    assert_eq!(series.len(), 4);
    assert_eq!(exchange.requests().len(), 2);
}

#[test]
fn cursor_at_wall_clock_stops_without_request() {
    let exchange = Arc::new(FakeExchange::new(0, vec![Ok(flat(0..4))]));
    let series = fetcher(exchange.clone(), RetryPolicy::default()).fetch().unwrap();
    assert!(series.is_empty());
    assert!(exchange.requests().is_empty());
}

#[test]
fn overlapping_pages_keep_first_copy() {
    let mut second = flat(3..6);
    second[0].close = 555.0;
    let exchange = Arc::new(FakeExchange::new(10 * HOUR, vec![Ok(flat(0..4)), Ok(second)]));
    let series = fetcher(exchange, RetryPolicy::default()).fetch().unwrap();

    assert_eq!(series.len(), 6);
    assert_eq!(series.candles()[3].close, 100.0);
}

// ── Retry ────────────────────────────────────────────────────────────

#[test]
fn transient_failures_then_success() {
    let exchange = Arc::new(FakeExchange::new(
        10 * HOUR,
        vec![
            Err(DataError::NetworkUnreachable("reset".into())),
            Err(DataError::ExchangeUnavailable("HTTP 502".into())),
            Ok(flat(0..4)),
        ],
    ));
    let series = fetcher(exchange.clone(), RetryPolicy::default()).fetch().unwrap();

    assert_eq!(series.len(), 4);
    assert_eq!(exchange.requests(), vec![0, 0, 0, 3 * FIVE_MIN]);

    // Backoff from 2 × rate limit, doubling; then the inter-page pause.
    let sleeps = exchange.sleeps();
    assert_eq!(
        sleeps,
        vec![
            Duration::from_millis(20),
            Duration::from_millis(40),
            Duration::from_millis(10),
        ]
    );
}

#[test]
fn load_markets_is_retried() {
    let exchange = Arc::new(
        FakeExchange::new(10 * HOUR, vec![Ok(flat(0..4))])
            .with_market_errors(vec![DataError::RateLimited { retry_after_secs: 0 }]),
    );
    let series = fetcher(exchange.clone(), RetryPolicy::default()).fetch().unwrap();

    assert_eq!(series.len(), 4);
    assert_eq!(*exchange.market_calls.lock().unwrap(), 2);
    assert_eq!(exchange.requests(), vec![0, 3 * FIVE_MIN]);
    assert_eq!(exchange.sleeps()[0], Duration::from_millis(20));
}

#[test]
fn load_markets_failure_is_bounded() {
    let policy = RetryPolicy {
        max_attempts: 2,
        ..RetryPolicy::default()
    };
    let exchange = Arc::new(
        FakeExchange::new(10 * HOUR, vec![Ok(flat(0..4))]).with_market_errors(vec![
            DataError::ExchangeUnavailable("HTTP 503".into()),
            DataError::ExchangeUnavailable("HTTP 503".into()),
        ]),
    );
    let err = fetcher(exchange.clone(), policy).fetch().unwrap_err();

    assert!(matches!(err, FetchError::RetriesExhausted { attempts: 2, .. }));
    assert!(exchange.requests().is_empty());
}

#[test]
fn persistent_failure_exhausts_retries() {
    let policy = RetryPolicy {
        max_attempts: 3,
        ..RetryPolicy::default()
    };
    let errors = (0..10)
        .map(|_| Err(DataError::NetworkUnreachable("down".into())))
        .collect();
    let exchange = Arc::new(FakeExchange::new(10 * HOUR, errors));
    let err = fetcher(exchange.clone(), policy).fetch().unwrap_err();

    match err {
        FetchError::RetriesExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(last, DataError::NetworkUnreachable("down".into()));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(exchange.requests().len(), 3);
}

#[test]
fn non_transient_error_is_not_retried() {
    let exchange = Arc::new(FakeExchange::new(
        10 * HOUR,
        vec![
            Err(DataError::AuthenticationRequired("HTTP 401".into())),
            Ok(flat(0..4)),
        ],
    ));
    let err = fetcher(exchange.clone(), RetryPolicy::default()).fetch().unwrap_err();
    assert!(matches!(
        err,
        FetchError::Exchange(DataError::AuthenticationRequired(_))
    ));
    assert_eq!(exchange.requests().len(), 1);
    assert!(exchange.sleeps().is_empty());
}

#[test]
fn cancellation_during_backoff() {
    let cancel = Arc::new(AtomicBool::new(false));
    let mut fake = FakeExchange::new(
        10 * HOUR,
        vec![
            Err(DataError::NetworkUnreachable("reset".into())),
            Ok(flat(0..4)),
        ],
    );
    fake.cancel_on_sleep = Some(cancel.clone());
    let exchange = Arc::new(fake);

    let err = fetcher(exchange.clone(), RetryPolicy::default())
        .with_cancel_flag(cancel)
        .fetch()
        .unwrap_err();
    assert!(matches!(err, FetchError::Cancelled));
    assert_eq!(exchange.requests().len(), 1);
}

// ── End to end ───────────────────────────────────────────────────────

/// Hour 0 flat, hour 1 a V (six -1 steps on volume 10, six +1 steps on
/// volume 30), hour 2 a single open candle.
fn v_shape_day() -> Vec<RawCandle> {
    let mut candles = flat(0..12);
    let v_closes = [99.0, 98.0, 97.0, 96.0, 95.0, 94.0, 95.0, 96.0, 97.0, 98.0, 99.0, 100.0];
    for (i, close) in v_closes.iter().enumerate() {
        let volume = if i < 6 { 10.0 } else { 30.0 };
        candles.push(candle(HOUR + i as i64 * FIVE_MIN, *close, volume));
    }
    candles.push(candle(2 * HOUR, 101.0, 5.0));
    candles
}

#[test]
fn v_shape_raises_hard_to_grow() {
    let exchange = Arc::new(FakeExchange::new(
        2 * HOUR + 2 * FIVE_MIN,
        vec![Ok(v_shape_day()), Ok(vec![candle(2 * HOUR, 101.0, 5.0)])],
    ));
    let series = fetcher(exchange, RetryPolicy::default()).fetch().unwrap();
    assert_eq!(series.len(), 25);

    let buckets = aggregate(&series, Timeframe::hours(1), &Thresholds::new(60.0, 40.0));
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[0].vpr, None);

    let report = evaluate(&buckets, 60).unwrap();
    assert_eq!(report.bucket.start, HOUR);
    assert_eq!(report.vpr, Some(75.0));
    assert!(report.flags.hard_to_grow);
    assert!(!report.flags.hard_to_fall);
    assert_eq!(report.window.len(), 2);
    assert_eq!(
        report.alert_caption().as_deref(),
        Some("\u{1F534}Hard to grow: 75.0")
    );
}

#[test]
fn too_short_history_has_nothing_to_evaluate() {
    let exchange = Arc::new(FakeExchange::new(HOUR, vec![Ok(flat(0..6))]));
    let series = fetcher(exchange, RetryPolicy::default()).fetch().unwrap();
    let buckets = aggregate(&series, Timeframe::hours(1), &Thresholds::default());
    assert_eq!(buckets.len(), 1);
    assert!(evaluate(&buckets, 60).is_none());
}
