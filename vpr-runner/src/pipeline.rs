//! One signal run: fetch → aggregate → evaluate, plus chart rendering.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::info;

use vpr_core::chart::{ChartError, ChartRenderer};
use vpr_core::data::{exchange_for, Exchange, FetchError, FetchRequest, Fetcher};
use vpr_core::domain::{Bucket, CandleSeries};
use vpr_core::signal::{aggregate, evaluate, SignalReport, Thresholds};
use vpr_core::Timeframe;

use crate::config::{ConfigError, SignalConfig};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("chart error: {0}")]
    Chart(#[from] ChartError),
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub series: CandleSeries,
    pub buckets: Vec<Bucket>,
    /// `None` when no bucket is complete yet.
    pub report: Option<SignalReport>,
}

/// A validated, reusable signal pipeline.
///
/// Each [`run`](Self::run) fetches the full history from `since` again and
/// shares nothing with previous runs.
pub struct SignalPipeline {
    config: SignalConfig,
    fetcher: Fetcher,
    target: Timeframe,
    thresholds: Thresholds,
    renderer: ChartRenderer,
}

impl SignalPipeline {
    /// Resolve the configured exchange and validate everything up front.
    pub fn from_config(config: SignalConfig) -> Result<Self, PipelineError> {
        let exchange = exchange_for(&config.market.exchange_id).map_err(|e| {
            ConfigError::Invalid(format!("market.exchange_id: {e}"))
        })?;
        Self::with_exchange(config, exchange)
    }

    /// Build against a specific exchange client.
    pub fn with_exchange(
        config: SignalConfig,
        exchange: Arc<dyn Exchange>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let m = &config.market;
        let request = FetchRequest::parse(&m.symbol, &m.timeframe_from, &m.since, m.limit)?;
        let fetcher = Fetcher::new(exchange, request, config.retry_policy())?;
        let target = config.target_timeframe()?;
        let thresholds = config.thresholds();
        let renderer = ChartRenderer::new(config.chart_config());

        Ok(Self {
            config,
            fetcher,
            target,
            thresholds,
            renderer,
        })
    }

    /// Share a cancellation flag with the in-flight fetch.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.fetcher = self.fetcher.with_cancel_flag(cancel);
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.fetcher.cancel_flag()
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn exchange_id(&self) -> &str {
        self.fetcher.exchange().id()
    }

    pub fn fetch_series(&self) -> Result<CandleSeries, PipelineError> {
        Ok(self.fetcher.fetch()?)
    }

    pub fn run(&self) -> Result<PipelineOutput, PipelineError> {
        let started = Instant::now();
        let series = self.fetch_series()?;
        let buckets = aggregate(&series, self.target, &self.thresholds);
        let report = evaluate(&buckets, self.config.chart.data_horizon);

        info!(
            config = %self.config.fingerprint(),
            symbol = series.symbol(),
            candles = series.len(),
            buckets = buckets.len(),
            vpr = ?report.as_ref().and_then(|r| r.vpr),
            triggered = report.as_ref().is_some_and(|r| r.is_triggered()),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "signal run complete"
        );

        Ok(PipelineOutput {
            series,
            buckets,
            report,
        })
    }

    /// PNG of the report's chart window.
    pub fn render(&self, report: &SignalReport) -> Result<Vec<u8>, PipelineError> {
        Ok(self.renderer.render(&report.window)?)
    }
}
