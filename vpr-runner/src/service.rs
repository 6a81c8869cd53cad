//! Bot service lifecycle: init → run → shutdown.
//!
//! `run` spawns two threads. The scheduler fires an alert check a few seconds
//! after every target-timeframe boundary; the command loop long-polls the
//! chat API and answers `/signal`, `/start`, `/help` and plain text. Pipeline
//! runs from both threads are serialized by one mutex. `shutdown` raises the
//! stop flag, cancels any in-flight fetch and joins both threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use vpr_core::Timeframe;

use crate::alert::{AlertDriver, AlertOutcome};
use crate::commands::{BotCommand, CommandSource, IncomingMessage};
use crate::config::{BotConfig, ConfigError, SignalConfig};
use crate::notifier::{ChatId, Notifier, NotifyError};
use crate::pipeline::{PipelineError, SignalPipeline};
use crate::telegram::TelegramNotifier;

/// How often the scheduler compares the clock with the next tick.
const CHECK_INTERVAL: Duration = Duration::from_secs(1);
const POLL_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after a failed poll before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("notifier error: {0}")]
    Notify(#[from] NotifyError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("service is already running")]
    AlreadyRunning,
}

/// Milliseconds since the epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Next tick strictly after `now_ms`: a target boundary plus `grace`.
pub fn next_tick_after(now_ms: i64, target: Timeframe, grace: Duration) -> i64 {
    let grace_ms = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX / 2);
    let boundary = target.bucket_start(now_ms);
    let candidate = boundary + grace_ms;
    if candidate > now_ms {
        candidate
    } else {
        target.next_start(boundary) + grace_ms
    }
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

/// Sleep up to `total`, waking early once `stop` is raised.
fn sleep_unless_stopped(stop: &AtomicBool, total: Duration) {
    let slice = Duration::from_millis(100);
    let mut remaining = total;
    while !remaining.is_zero() && !stop.load(Ordering::SeqCst) {
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining -= step;
    }
}

pub struct SignalService {
    driver: Arc<AlertDriver>,
    commands: Option<Arc<dyn CommandSource>>,
    target: Timeframe,
    grace: Duration,
    clock: Clock,
    check_interval: Duration,
    poll_timeout: Duration,
    stop: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    run_lock: Arc<Mutex<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl SignalService {
    /// Validate config and build the Telegram-backed service.
    pub fn init(config: SignalConfig, bot: &BotConfig) -> Result<Self, ServiceError> {
        let telegram = Arc::new(TelegramNotifier::new(&bot.token)?);
        let pipeline = SignalPipeline::from_config(config)?;
        let commands: Arc<dyn CommandSource> = telegram.clone();
        Self::with_parts(pipeline, telegram, Some(commands), bot.user_id)
    }

    /// Assemble from already-built parts. Without a command source only the
    /// scheduler runs.
    pub fn with_parts(
        pipeline: SignalPipeline,
        notifier: Arc<dyn Notifier>,
        commands: Option<Arc<dyn CommandSource>>,
        recipient: ChatId,
    ) -> Result<Self, ServiceError> {
        let target = pipeline.config().target_timeframe()?;
        let grace = Duration::from_secs(pipeline.config().schedule.grace_secs);
        let cancel = Arc::new(AtomicBool::new(false));
        let pipeline = pipeline.with_cancel_flag(cancel.clone());

        info!(
            config = %pipeline.config().fingerprint(),
            exchange = pipeline.exchange_id(),
            symbol = %pipeline.config().market.symbol,
            %target,
            recipient,
            commands = commands.is_some(),
            "service initialised"
        );

        Ok(Self {
            driver: Arc::new(AlertDriver::new(pipeline, notifier, recipient)),
            commands,
            target,
            grace,
            clock: Arc::new(|| Utc::now().timestamp_millis()),
            check_interval: CHECK_INTERVAL,
            poll_timeout: POLL_TIMEOUT,
            stop: Arc::new(AtomicBool::new(false)),
            cancel,
            run_lock: Arc::new(Mutex::new(())),
            threads: Vec::new(),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn driver(&self) -> &AlertDriver {
        &self.driver
    }

    pub fn is_running(&self) -> bool {
        !self.threads.is_empty()
    }

    /// Spawn the scheduler and, if configured, the command loop.
    pub fn run(&mut self) -> Result<(), ServiceError> {
        if self.is_running() {
            return Err(ServiceError::AlreadyRunning);
        }
        self.stop.store(false, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);

        let scheduler = Scheduler {
            driver: self.driver.clone(),
            target: self.target,
            grace: self.grace,
            clock: self.clock.clone(),
            check_interval: self.check_interval,
            stop: self.stop.clone(),
            run_lock: self.run_lock.clone(),
        };
        self.threads.push(
            std::thread::Builder::new()
                .name("vpr-scheduler".into())
                .spawn(move || scheduler.run())?,
        );

        if let Some(source) = &self.commands {
            let commands = CommandLoop {
                driver: self.driver.clone(),
                source: source.clone(),
                poll_timeout: self.poll_timeout,
                stop: self.stop.clone(),
                run_lock: self.run_lock.clone(),
            };
            self.threads.push(
                std::thread::Builder::new()
                    .name("vpr-commands".into())
                    .spawn(move || commands.run())?,
            );
        }

        info!(threads = self.threads.len(), "service running");
        Ok(())
    }

    /// Block until the worker threads exit.
    pub fn wait(&mut self) {
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }

    /// Stop both loops, cancel any in-flight fetch and join the threads.
    pub fn shutdown(&mut self) {
        if !self.is_running() {
            return;
        }
        info!("service shutting down");
        self.stop.store(true, Ordering::SeqCst);
        self.cancel.store(true, Ordering::SeqCst);
        self.wait();
        info!("service stopped");
    }
}

impl Drop for SignalService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Scheduler {
    driver: Arc<AlertDriver>,
    target: Timeframe,
    grace: Duration,
    clock: Clock,
    check_interval: Duration,
    stop: Arc<AtomicBool>,
    run_lock: Arc<Mutex<()>>,
}

impl Scheduler {
    fn run(self) {
        let mut next = next_tick_after((self.clock)(), self.target, self.grace);
        info!(next = %format_ms(next), "scheduler started");

        while !self.stop.load(Ordering::SeqCst) {
            let now = (self.clock)();
            if now >= next {
                self.tick();
                next = next_tick_after((self.clock)().max(next), self.target, self.grace);
                debug!(next = %format_ms(next), "next tick scheduled");
            }
            sleep_unless_stopped(&self.stop, self.check_interval);
        }

        info!("scheduler stopped");
    }

    fn tick(&self) {
        let _guard = self.run_lock.lock().unwrap_or_else(|p| p.into_inner());
        if self.stop.load(Ordering::SeqCst) {
            return;
        }
        match self.driver.on_tick() {
            Ok(AlertOutcome::DeliveryFailed { start, error }) => {
                warn!(start, %error, "tick finished without delivering the alert");
            }
            Ok(outcome) => debug!(?outcome, "tick finished"),
            Err(e) => error!(error = %e, "signal run failed"),
        }
    }
}

struct CommandLoop {
    driver: Arc<AlertDriver>,
    source: Arc<dyn CommandSource>,
    poll_timeout: Duration,
    stop: Arc<AtomicBool>,
    run_lock: Arc<Mutex<()>>,
}

impl CommandLoop {
    fn run(self) {
        info!("command loop started");
        while !self.stop.load(Ordering::SeqCst) {
            match self.source.poll(self.poll_timeout) {
                Ok(messages) => {
                    for message in messages {
                        if self.stop.load(Ordering::SeqCst) {
                            break;
                        }
                        self.handle(message);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "polling for commands failed");
                    sleep_unless_stopped(&self.stop, POLL_ERROR_BACKOFF);
                }
            }
        }
        info!("command loop stopped");
    }

    fn handle(&self, message: IncomingMessage) {
        let chat = message.chat;
        let command = BotCommand::parse(&message.text);
        debug!(chat, ?command, "command received");

        let reply = match command {
            BotCommand::Signal => {
                let _guard = self.run_lock.lock().unwrap_or_else(|p| p.into_inner());
                if let Err(e) = self.driver.on_manual_request(chat) {
                    error!(chat, error = %e, "manual report failed");
                }
                return;
            }
            BotCommand::Start | BotCommand::Help => BotCommand::GREETING.to_string(),
            BotCommand::Echo(text) => text,
        };

        if let Err(e) = self.driver.notifier().send_text(chat, &reply) {
            warn!(chat, error = %e, "reply failed");
        }
    }
}
