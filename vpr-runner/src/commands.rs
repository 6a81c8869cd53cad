//! Incoming chat commands.

use std::time::Duration;

use crate::notifier::{ChatId, NotifyError};

/// A text message received by the bot.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub chat: ChatId,
    pub text: String,
}

/// Source of incoming messages, e.g. a long-polling chat API client.
pub trait CommandSource: Send + Sync {
    /// Wait up to `timeout` for new messages. Each message is returned once.
    fn poll(&self, timeout: Duration) -> Result<Vec<IncomingMessage>, NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// `/signal`: chart and current VPR on demand
    Signal,
    /// `/start`
    Start,
    /// `/help`
    Help,
    /// Anything else, echoed back.
    Echo(String),
}

impl BotCommand {
    pub const GREETING: &'static str = "Hi!";

    /// Parse a message. `/cmd@botname args` is accepted for group chats.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return BotCommand::Echo(text.to_string());
        };
        let word = rest.split_whitespace().next().unwrap_or("");
        let name = word.split('@').next().unwrap_or("");
        match name.to_ascii_lowercase().as_str() {
            "signal" => BotCommand::Signal,
            "start" => BotCommand::Start,
            "help" => BotCommand::Help,
            _ => BotCommand::Echo(text.to_string()),
        }
    }
}
