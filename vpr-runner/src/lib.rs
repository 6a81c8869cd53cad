//! VPR Runner — config, pipeline orchestration, alerts, bot service, export.
//!
//! This crate builds on `vpr-core` to provide:
//! - Typed TOML configuration and environment secrets
//! - The fetch → aggregate → evaluate pipeline with chart rendering
//! - Alert decision and delivery through a `Notifier`
//! - A Telegram client for alerts and chat commands
//! - The bot service with its scheduler and command loop
//! - CSV export of candles and buckets

pub mod alert;
pub mod commands;
pub mod config;
pub mod export;
pub mod notifier;
pub mod pipeline;
pub mod service;
pub mod telegram;

pub use alert::{AlertDriver, AlertOutcome, NO_COMPLETE_BUCKET};
pub use commands::{BotCommand, CommandSource, IncomingMessage};
pub use config::{BotConfig, ConfigError, SignalConfig};
pub use export::{write_buckets_csv, write_candles_csv, ExportError};
pub use notifier::{ChatId, LogNotifier, Notifier, NotifyError, RecordingNotifier, Sent};
pub use pipeline::{PipelineError, PipelineOutput, SignalPipeline};
pub use service::{next_tick_after, Clock, ServiceError, SignalService};
pub use telegram::TelegramNotifier;
