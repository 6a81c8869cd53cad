//! Alert delivery boundary.

use std::sync::Mutex;

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("chat API rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected chat API response: {0}")]
    BadResponse(String),
}

/// Chat identifier (user or group).
pub type ChatId = i64;

/// Something that can deliver text and images to a chat.
///
/// Delivery is fire-and-forget from the caller's point of view: failures are
/// reported once and never retried.
pub trait Notifier: Send + Sync {
    fn send_photo(&self, chat: ChatId, png: &[u8], caption: &str) -> Result<(), NotifyError>;

    fn send_text(&self, chat: ChatId, text: &str) -> Result<(), NotifyError>;
}

/// Writes alerts to the log instead of a chat. Used when no bot token is set.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_photo(&self, chat: ChatId, png: &[u8], caption: &str) -> Result<(), NotifyError> {
        info!(chat, bytes = png.len(), caption, "photo");
        Ok(())
    }

    fn send_text(&self, chat: ChatId, text: &str) -> Result<(), NotifyError> {
        info!(chat, text, "message");
        Ok(())
    }
}

/// A delivered message, as seen by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Photo {
        chat: ChatId,
        bytes: usize,
        caption: String,
    },
    Text {
        chat: ChatId,
        text: String,
    },
}

/// Keeps every delivery in memory. Handy for dry runs and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, item: Sent) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Transport("connection refused".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(item);
        }
        Ok(())
    }
}

impl Notifier for RecordingNotifier {
    fn send_photo(&self, chat: ChatId, png: &[u8], caption: &str) -> Result<(), NotifyError> {
        self.record(Sent::Photo {
            chat,
            bytes: png.len(),
            caption: caption.to_string(),
        })
    }

    fn send_text(&self, chat: ChatId, text: &str) -> Result<(), NotifyError> {
        self.record(Sent::Text {
            chat,
            text: text.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_keeps_order() {
        let n = RecordingNotifier::new();
        n.send_text(1, "hi").unwrap();
        n.send_photo(2, &[1, 2, 3], "VPR: 50.0").unwrap();
        assert_eq!(
            n.sent(),
            vec![
                Sent::Text {
                    chat: 1,
                    text: "hi".into()
                },
                Sent::Photo {
                    chat: 2,
                    bytes: 3,
                    caption: "VPR: 50.0".into()
                },
            ]
        );
    }

    #[test]
    fn failing_notifier_records_nothing() {
        let n = RecordingNotifier::failing();
        assert!(n.send_text(1, "hi").is_err());
        assert!(n.sent().is_empty());
    }
}
