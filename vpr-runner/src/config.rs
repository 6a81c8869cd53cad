//! Typed run configuration and bot secrets.
//!
//! Every field that shapes a signal run is required in the TOML file; only
//! retry and schedule tuning have defaults. Secrets never live in the file:
//! they come from `BOT_TOKEN` / `USER_ID` in the environment.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use vpr_core::chart::ChartConfig;
use vpr_core::data::{parse_since, RetryPolicy};
use vpr_core::signal::Thresholds;
use vpr_core::Timeframe;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("environment variable {name} is malformed: {reason}")]
    BadEnv { name: &'static str, reason: String },
}

/// Complete configuration for one signal pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SignalConfig {
    pub market: MarketConfig,
    pub signal: SignalSettings,
    pub chart: ChartSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MarketConfig {
    /// Exchange identifier, e.g. `binance`
    pub exchange_id: String,
    /// Unified symbol, e.g. `BTC/USDT`
    pub symbol: String,
    /// Source candle timeframe
    pub timeframe_from: String,
    /// Resample target timeframe
    pub timeframe_to: String,
    /// ISO-8601 start of history
    pub since: String,
    /// Candles per page
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SignalSettings {
    pub hard_to_grow_th: f64,
    pub hard_to_fall_th: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ChartSettings {
    /// Complete buckets shown on the chart.
    pub data_horizon: usize,
    #[serde(default = "default_chart_width")]
    pub width: u32,
    #[serde(default = "default_chart_height")]
    pub height: u32,
}

fn default_chart_width() -> u32 {
    1000
}

fn default_chart_height() -> u32 {
    900
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub max_elapsed_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            max_elapsed_secs: 900,
            max_delay_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSettings {
    /// Delay after each target-timeframe boundary before a tick fires.
    pub grace_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self { grace_secs: 5 }
    }
}

impl SignalConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// BTC/USDT on Binance, 5m candles resampled to 1h, thresholds 60/40.
    pub fn default_binance() -> Self {
        Self {
            market: MarketConfig {
                exchange_id: "binance".into(),
                symbol: "BTC/USDT".into(),
                timeframe_from: "5m".into(),
                timeframe_to: "1h".into(),
                since: "2023-01-01T00:00:00Z".into(),
                limit: 1000,
            },
            signal: SignalSettings {
                hard_to_grow_th: 60.0,
                hard_to_fall_th: 40.0,
            },
            chart: ChartSettings {
                data_horizon: 60,
                width: default_chart_width(),
                height: default_chart_height(),
            },
            retry: RetrySettings::default(),
            schedule: ScheduleSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.market;
        if m.exchange_id.trim().is_empty() {
            return Err(ConfigError::Invalid("market.exchange_id must not be empty".into()));
        }
        if m.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("market.symbol must not be empty".into()));
        }
        let source = self.source_timeframe()?;
        let target = self.target_timeframe()?;
        parse_since(&m.since).map_err(|e| ConfigError::Invalid(format!("market.since: {e}")))?;
        if m.limit == 0 {
            return Err(ConfigError::Invalid("market.limit must be at least 1".into()));
        }
        if self.chart.data_horizon == 0 {
            return Err(ConfigError::Invalid("chart.data_horizon must be at least 1".into()));
        }

        let s = &self.signal;
        if !s.hard_to_grow_th.is_finite() || !s.hard_to_fall_th.is_finite() {
            return Err(ConfigError::Invalid("signal thresholds must be finite".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }

        // A grace of a full period or more would skip every other tick.
        let period_ms = shortest_period_ms(target);
        let grace_ms = i64::try_from(self.schedule.grace_secs)
            .ok()
            .and_then(|s| s.checked_mul(1000))
            .unwrap_or(i64::MAX);
        if grace_ms >= period_ms {
            return Err(ConfigError::Invalid(format!(
                "schedule.grace_secs must be shorter than one {target} period ({}s)",
                period_ms / 1000
            )));
        }

        if s.hard_to_grow_th < s.hard_to_fall_th {
            warn!(
                hard_to_grow_th = s.hard_to_grow_th,
                hard_to_fall_th = s.hard_to_fall_th,
                "thresholds overlap, a single VPR can raise both flags"
            );
        }
        if let (Some(src), Some(dst)) = (source.fixed_width_ms(), target.fixed_width_ms()) {
            if dst < src {
                warn!(%source, %target, "target timeframe is finer than the source");
            }
        }
        Ok(())
    }

    pub fn source_timeframe(&self) -> Result<Timeframe, ConfigError> {
        parse_timeframe("market.timeframe_from", &self.market.timeframe_from)
    }

    pub fn target_timeframe(&self) -> Result<Timeframe, ConfigError> {
        parse_timeframe("market.timeframe_to", &self.market.timeframe_to)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.signal.hard_to_grow_th, self.signal.hard_to_fall_th)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            max_elapsed: std::time::Duration::from_secs(self.retry.max_elapsed_secs),
            max_delay: std::time::Duration::from_secs(self.retry.max_delay_secs),
        }
    }

    pub fn chart_config(&self) -> ChartConfig {
        ChartConfig::default()
            .with_size(self.chart.width, self.chart.height)
            .with_thresholds(self.thresholds())
    }

    /// Content hash of the config, for log correlation.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex()[..16].to_string()
    }
}

/// Shortest span of one bucket; calendar months count as 28 days.
fn shortest_period_ms(tf: Timeframe) -> i64 {
    tf.fixed_width_ms()
        .unwrap_or_else(|| i64::from(tf.count()) * 28 * 86_400_000)
}

fn parse_timeframe(field: &str, value: &str) -> Result<Timeframe, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{field}: {e}")))
}

/// Chat bot credentials and the alert recipient.
#[derive(Clone, PartialEq)]
pub struct BotConfig {
    pub token: String,
    pub user_id: i64,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl BotConfig {
    pub const TOKEN_VAR: &'static str = "BOT_TOKEN";
    pub const USER_VAR: &'static str = "USER_ID";

    /// Read `BOT_TOKEN` and `USER_ID` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the credentials through an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup(Self::TOKEN_VAR)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(Self::TOKEN_VAR))?;
        let raw_user = lookup(Self::USER_VAR).ok_or(ConfigError::MissingEnv(Self::USER_VAR))?;
        let user_id = raw_user.trim().parse().map_err(|e| ConfigError::BadEnv {
            name: Self::USER_VAR,
            reason: format!("{e}"),
        })?;
        Ok(Self {
            token: token.trim().to_string(),
            user_id,
        })
    }
}
