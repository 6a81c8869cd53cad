//! VPR CLI — one-shot signal runs, candle dumps and the alert bot.
//!
//! Commands:
//! - `signal` — fetch, aggregate and report on the latest complete bucket
//! - `fetch` — fetch the configured history and write it as CSV
//! - `serve` — run the scheduled alert bot until killed or for a fixed time

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vpr_core::data::KNOWN_EXCHANGES;
use vpr_core::signal::format_vpr;
use vpr_runner::{
    write_buckets_csv, write_candles_csv, BotConfig, ConfigError, LogNotifier, SignalConfig,
    SignalPipeline, SignalService,
};

#[derive(Parser)]
#[command(name = "vpr", about = "Volume/price ratio signals for crypto markets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once and print the latest complete bucket.
    Signal {
        /// Path to a TOML config file. Defaults to BTC/USDT on Binance.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured exchange (binance, synthetic).
        #[arg(long)]
        exchange: Option<String>,

        /// Write the chart of the report window as PNG.
        #[arg(long)]
        chart: Option<PathBuf>,

        /// Write every bucket with its VPR and flags as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Fetch the configured candle history and write it as CSV.
    Fetch {
        /// Path to a TOML config file. Defaults to BTC/USDT on Binance.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured exchange (binance, synthetic).
        #[arg(long)]
        exchange: Option<String>,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
    },
    /// Run the alert bot. Reads BOT_TOKEN and USER_ID from the environment.
    Serve {
        /// Path to a TOML config file. Defaults to BTC/USDT on Binance.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop after this many seconds instead of running until killed.
        #[arg(long)]
        run_for_secs: Option<u64>,

        /// Log alerts instead of sending them; no bot token needed.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Signal {
            config,
            exchange,
            chart,
            csv,
        } => run_signal(config, exchange, chart, csv),
        Commands::Fetch {
            config,
            exchange,
            out,
        } => run_fetch(config, exchange, out),
        Commands::Serve {
            config,
            run_for_secs,
            dry_run,
        } => run_serve(config, run_for_secs, dry_run),
    }
}

fn load_config(path: Option<PathBuf>, exchange: Option<String>) -> Result<SignalConfig> {
    let mut config = match path {
        Some(path) => SignalConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            info!("no --config given, using BTC/USDT on binance defaults");
            SignalConfig::default_binance()
        }
    };

    if let Some(exchange) = exchange {
        if !KNOWN_EXCHANGES.contains(&exchange.as_str()) {
            bail!(
                "unknown exchange '{exchange}'. Valid: {}",
                KNOWN_EXCHANGES.join(", ")
            );
        }
        config.market.exchange_id = exchange;
    }
    Ok(config)
}

fn run_signal(
    config_path: Option<PathBuf>,
    exchange: Option<String>,
    chart: Option<PathBuf>,
    csv: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, exchange)?;
    let pipeline = SignalPipeline::from_config(config)?;
    let output = pipeline.run()?;

    if let Some(path) = &csv {
        write_buckets_csv(path, &output.buckets)?;
        println!("Buckets written to: {}", path.display());
    }

    let Some(report) = output.report else {
        println!(
            "No complete bucket yet ({} candles, {} buckets).",
            output.series.len(),
            output.buckets.len()
        );
        if chart.is_some() {
            warn!("no chart written: nothing to draw");
        }
        return Ok(());
    };

    let bucket = &report.bucket;
    println!();
    println!("=== {} {} ===", bucket.symbol, pipeline.config().market.timeframe_to);
    println!(
        "Bucket:        {}",
        bucket
            .datetime()
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| bucket.start.to_string())
    );
    println!(
        "OHLC:          {:.2} / {:.2} / {:.2} / {:.2}",
        bucket.open, bucket.high, bucket.low, bucket.close
    );
    println!("Volume:        {:.4}", bucket.volume);
    println!("Candles:       {}", bucket.candle_count);
    println!("VPR:           {}", format_vpr(report.vpr));
    println!("Hard to grow:  {}", report.flags.hard_to_grow);
    println!("Hard to fall:  {}", report.flags.hard_to_fall);
    if let Some(caption) = report.alert_caption() {
        println!();
        println!("{caption}");
    }

    if let Some(path) = &chart {
        let png = pipeline.render(&report)?;
        std::fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;
        println!("Chart written to: {}", path.display());
    }

    Ok(())
}

fn run_fetch(config_path: Option<PathBuf>, exchange: Option<String>, out: PathBuf) -> Result<()> {
    let config = load_config(config_path, exchange)?;
    let pipeline = SignalPipeline::from_config(config)?;
    let series = pipeline.fetch_series()?;

    if series.is_empty() {
        warn!("exchange returned no candles");
    }
    write_candles_csv(&out, &series)?;
    println!("{} candles written to: {}", series.len(), out.display());
    Ok(())
}

fn run_serve(config_path: Option<PathBuf>, run_for_secs: Option<u64>, dry_run: bool) -> Result<()> {
    let config = load_config(config_path, None)?;

    let mut service = if dry_run {
        let pipeline = SignalPipeline::from_config(config)?;
        let recipient = BotConfig::from_env().map(|b| b.user_id).unwrap_or(0);
        SignalService::with_parts(pipeline, Arc::new(LogNotifier), None, recipient)?
    } else {
        let bot = match BotConfig::from_env() {
            Ok(bot) => bot,
            Err(e @ (ConfigError::MissingEnv(_) | ConfigError::BadEnv { .. })) => {
                bail!("{e}. Set it in the environment or .env, or pass --dry-run")
            }
            Err(e) => return Err(e.into()),
        };
        SignalService::init(config, &bot)?
    };

    service.run()?;

    match run_for_secs {
        Some(secs) => {
            info!(secs, "running for a fixed time");
            std::thread::sleep(Duration::from_secs(secs));
            service.shutdown();
        }
        None => service.wait(),
    }
    Ok(())
}
