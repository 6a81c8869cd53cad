//! Binance spot market data provider.
//!
//! Serves klines from the public `/api/v3/klines` endpoint and the market list
//! from `/api/v3/exchangeInfo`. No API key is needed. HTTP status codes are
//! mapped onto [`DataError`] so the fetcher can tell transient failures from
//! permanent ones; this type never retries on its own.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::provider::{DataError, Exchange, RawCandle};
use crate::timeframe::Timeframe;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Intervals accepted by the klines endpoint.
const SUPPORTED_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    base_asset: String,
    quote_asset: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

/// Binance spot REST client.
pub struct BinanceExchange {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl BinanceExchange {
    pub fn new() -> Result<Self, DataError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Client pointed at a different host (testnet, proxy).
    pub fn with_base_url(base_url: &str) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("vpr-signal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `BTC/USDT` → `BTCUSDT`.
    pub fn market_id(symbol: &str) -> String {
        symbol.replace('/', "").to_uppercase()
    }

    fn get(&self, path: &str, query: &[(&str, String)], symbol: &str) -> Result<Value, DataError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(DataError::AuthenticationRequired(format!(
                "HTTP {status} from {path}"
            )));
        }

        if status.is_server_error() {
            return Err(DataError::ExchangeUnavailable(format!("HTTP {status} from {path}")));
        }

        let body = resp
            .text()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(parse_client_error(symbol, status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse {path} response: {e}"))
        })
    }
}

/// Map a 4xx body onto a structured error.
fn parse_client_error(symbol: &str, status: u16, body: &str) -> DataError {
    match serde_json::from_str::<ApiError>(body) {
        // -1121: Invalid symbol.
        Ok(err) if err.code == -1121 => DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        },
        Ok(err) => DataError::BadRequest(format!("HTTP {status}: {} ({})", err.msg, err.code)),
        Err(_) => DataError::BadRequest(format!("HTTP {status}: {body}")),
    }
}

/// Parse one kline row: `[openTime, "open", "high", "low", "close", "volume", ...]`.
fn parse_kline(row: &Value) -> Result<RawCandle, DataError> {
    let fields = row
        .as_array()
        .filter(|f| f.len() >= 6)
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("unexpected kline row: {row}")))?;

    let timestamp = fields[0]
        .as_i64()
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("bad open time: {}", fields[0])))?;

    let number = |i: usize| -> Result<f64, DataError> {
        let parsed = match &fields[i] {
            Value::String(s) => s.parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        parsed.ok_or_else(|| {
            DataError::ResponseFormatChanged(format!("bad numeric field {i}: {}", fields[i]))
        })
    };

    Ok(RawCandle {
        timestamp,
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(4)?,
        volume: number(5)?,
    })
}

fn parse_klines(body: &Value) -> Result<Vec<RawCandle>, DataError> {
    body.as_array()
        .ok_or_else(|| DataError::ResponseFormatChanged("klines response is not an array".into()))?
        .iter()
        .map(parse_kline)
        .collect()
}

impl Exchange for BinanceExchange {
    fn id(&self) -> &str {
        "binance"
    }

    fn load_markets(&self) -> Result<Vec<String>, DataError> {
        let body = self.get("/api/v3/exchangeInfo", &[], "")?;
        let info: ExchangeInfo = serde_json::from_value(body).map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse exchangeInfo: {e}"))
        })?;

        Ok(info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING")
            .map(|s| format!("{}/{}", s.base_asset, s.quote_asset))
            .collect())
    }

    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: i64,
        limit: usize,
    ) -> Result<Vec<RawCandle>, DataError> {
        let query = [
            ("symbol", Self::market_id(symbol)),
            ("interval", timeframe.to_string()),
            ("startTime", since.to_string()),
            ("limit", limit.min(MAX_KLINES_PER_REQUEST).to_string()),
        ];
        let body = self.get("/api/v3/klines", &query, symbol)?;
        parse_klines(&body)
    }

    fn supports_timeframe(&self, timeframe: Timeframe) -> bool {
        SUPPORTED_INTERVALS.contains(&timeframe.to_string().as_str())
    }

    fn rate_limit(&self) -> Duration {
        Duration::from_millis(50)
    }

    fn max_page_size(&self) -> usize {
        MAX_KLINES_PER_REQUEST
    }
}
