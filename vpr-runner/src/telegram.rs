//! Telegram Bot API client: alert delivery and command polling.
//!
//! Uses `sendPhoto` (multipart), `sendMessage` and `getUpdates` long polling.
//! Requests are made once; a failed delivery is returned to the caller and
//! never retried here.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::commands::{CommandSource, IncomingMessage};
use crate::notifier::{ChatId, NotifyError, Notifier};

const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Envelope around every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    api_url: String,
    token: String,
    /// Next `getUpdates` offset: one past the last update seen.
    offset: AtomicI64,
}

impl TelegramNotifier {
    pub fn new(token: &str) -> Result<Self, NotifyError> {
        Self::with_api_url(token, DEFAULT_API_URL)
    }

    /// Client against a different Bot API server (local bot API, test double).
    pub fn with_api_url(token: &str, api_url: &str) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotifyError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            offset: AtomicI64::new(0),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.token)
    }

    fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<T, NotifyError> {
        // reqwest errors can carry the URL, and the URL carries the token.
        let resp = request
            .send()
            .map_err(|e| NotifyError::Transport(format!("{method}: {}", e.without_url())))?;
        let body = resp
            .text()
            .map_err(|e| NotifyError::Transport(format!("{method}: {}", e.without_url())))?;
        parse_response(method, &body)
    }

    pub fn send_message(&self, chat: ChatId, text: &str) -> Result<(), NotifyError> {
        let request = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": chat, "text": text }));
        self.send::<serde_json::Value>("sendMessage", request)?;
        Ok(())
    }

    pub fn send_photo_bytes(&self, chat: ChatId, png: &[u8], caption: &str) -> Result<(), NotifyError> {
        let photo = Part::bytes(png.to_vec())
            .file_name("chart.png")
            .mime_str("image/png")
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let form = Form::new()
            .text("chat_id", chat.to_string())
            .text("caption", caption.to_string())
            .part("photo", photo);
        let request = self.client.post(self.method_url("sendPhoto")).multipart(form);
        self.send::<serde_json::Value>("sendPhoto", request)?;
        Ok(())
    }

    /// Long-poll for updates and advance the offset past them.
    pub fn get_updates(&self, timeout: Duration) -> Result<Vec<IncomingMessage>, NotifyError> {
        let offset = self.offset.load(Ordering::SeqCst);
        let request = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.as_secs().to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .timeout(timeout + Duration::from_secs(10));
        let updates: Vec<Update> = self.send("getUpdates", request)?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }
        let messages = messages_from(updates);
        debug!(count = messages.len(), "updates received");
        Ok(messages)
    }
}

fn parse_response<T: DeserializeOwned>(method: &str, body: &str) -> Result<T, NotifyError> {
    let envelope: ApiResponse<T> = serde_json::from_str(body)
        .map_err(|e| NotifyError::BadResponse(format!("{method}: {e}")))?;
    if !envelope.ok {
        return Err(NotifyError::Rejected(format!(
            "{method}: {}",
            envelope.description.unwrap_or_else(|| "no description".into())
        )));
    }
    envelope
        .result
        .ok_or_else(|| NotifyError::BadResponse(format!("{method}: missing result")))
}

fn messages_from(updates: Vec<Update>) -> Vec<IncomingMessage> {
    updates
        .into_iter()
        .filter_map(|u| u.message)
        .filter_map(|m| {
            m.text.map(|text| IncomingMessage {
                chat: m.chat.id,
                text,
            })
        })
        .collect()
}

impl Notifier for TelegramNotifier {
    fn send_photo(&self, chat: ChatId, png: &[u8], caption: &str) -> Result<(), NotifyError> {
        self.send_photo_bytes(chat, png, caption)
    }

    fn send_text(&self, chat: ChatId, text: &str) -> Result<(), NotifyError> {
        self.send_message(chat, text)
    }
}

impl CommandSource for TelegramNotifier {
    fn poll(&self, timeout: Duration) -> Result<Vec<IncomingMessage>, NotifyError> {
        self.get_updates(timeout)
    }
}
