//! Alert decision and delivery.
//!
//! The driver runs the pipeline, looks at the latest complete bucket and,
//! when a flag is raised, renders the chart and sends it to the configured
//! recipient. Delivery failures are logged and reported, never retried.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::notifier::{ChatId, Notifier};
use crate::pipeline::{PipelineError, SignalPipeline};

/// Reply when `/signal` arrives before any bucket has closed.
pub const NO_COMPLETE_BUCKET: &str = "No complete bucket yet.";

#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    /// Not enough history for a closed bucket.
    NoCompleteBucket,
    /// Latest bucket raised no flag.
    NotTriggered { start: i64, vpr: Option<f64> },
    /// This bucket was already alerted on.
    AlreadySent { start: i64 },
    Sent { start: i64, caption: String },
    DeliveryFailed { start: i64, error: String },
}

pub struct AlertDriver {
    pipeline: SignalPipeline,
    notifier: Arc<dyn Notifier>,
    recipient: ChatId,
    /// Start of the last bucket that produced a delivered alert.
    last_alerted: Mutex<Option<i64>>,
}

impl AlertDriver {
    pub fn new(pipeline: SignalPipeline, notifier: Arc<dyn Notifier>, recipient: ChatId) -> Self {
        Self {
            pipeline,
            notifier,
            recipient,
            last_alerted: Mutex::new(None),
        }
    }

    pub fn pipeline(&self) -> &SignalPipeline {
        &self.pipeline
    }

    pub fn recipient(&self) -> ChatId {
        self.recipient
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Scheduled evaluation: alert the recipient if the latest complete bucket fired.
    pub fn on_tick(&self) -> Result<AlertOutcome, PipelineError> {
        let output = self.pipeline.run()?;
        let Some(report) = output.report else {
            info!("no complete bucket, skipping alert");
            return Ok(AlertOutcome::NoCompleteBucket);
        };
        let start = report.bucket.start;

        let Some(caption) = report.alert_caption() else {
            info!(start, vpr = ?report.vpr, "no signal");
            return Ok(AlertOutcome::NotTriggered {
                start,
                vpr: report.vpr,
            });
        };

        if self.last_alerted() == Some(start) {
            info!(start, "alert for this bucket already sent");
            return Ok(AlertOutcome::AlreadySent { start });
        }

        let png = self.pipeline.render(&report)?;
        match self.notifier.send_photo(self.recipient, &png, &caption) {
            Ok(()) => {
                if let Ok(mut last) = self.last_alerted.lock() {
                    *last = Some(start);
                }
                info!(start, recipient = self.recipient, %caption, "alert sent");
                Ok(AlertOutcome::Sent { start, caption })
            }
            Err(e) => {
                warn!(start, recipient = self.recipient, error = %e, "alert delivery failed");
                Ok(AlertOutcome::DeliveryFailed {
                    start,
                    error: e.to_string(),
                })
            }
        }
    }

    /// On-demand report: always send the chart with the current VPR.
    pub fn on_manual_request(&self, chat: ChatId) -> Result<AlertOutcome, PipelineError> {
        let output = self.pipeline.run()?;
        let Some(report) = output.report else {
            if let Err(e) = self.notifier.send_text(chat, NO_COMPLETE_BUCKET) {
                warn!(chat, error = %e, "reply failed");
            }
            return Ok(AlertOutcome::NoCompleteBucket);
        };
        let start = report.bucket.start;
        let caption = report.summary_caption();
        let png = self.pipeline.render(&report)?;

        match self.notifier.send_photo(chat, &png, &caption) {
            Ok(()) => {
                info!(start, chat, %caption, "manual report sent");
                Ok(AlertOutcome::Sent { start, caption })
            }
            Err(e) => {
                warn!(start, chat, error = %e, "manual report delivery failed");
                Ok(AlertOutcome::DeliveryFailed {
                    start,
                    error: e.to_string(),
                })
            }
        }
    }

    fn last_alerted(&self) -> Option<i64> {
        self.last_alerted.lock().ok().and_then(|last| *last)
    }
}
