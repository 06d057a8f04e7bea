//! Telegram channel. Long-polls the Bot API for updates.
//!
//! Talks to the Bot API directly over reqwest: `getUpdates` for inbound
//! messages, `sendMessage` with reply keyboards for outbound, and
//! `getFile` plus the file endpoint for photo downloads.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{
    Channel, GeoPoint, IncomingMessage, MessageContent, MessageStream, OutgoingResponse, PhotoRef,
    ReplyMarkup,
};
use crate::config::TelegramConfig;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Attachment kinds we recognise but do not handle.
const UNSUPPORTED_KINDS: &[&str] = &[
    "sticker", "voice", "audio", "video", "video_note", "document", "animation", "contact", "poll",
];

/// Telegram channel. Connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    poll_timeout: Duration,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token,
            allowed_users: config.allowed_users,
            poll_timeout: config.poll_timeout,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token.expose_secret()
        )
    }

    /// Check if a username is in the allowed list.
    pub fn is_user_allowed(&self, username: &str) -> bool {
        check_user_allowed(&self.allowed_users, [username])
    }

    /// Send a text message, splitting past Telegram's 4096 char limit.
    /// The reply markup rides on the last chunk.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        markup: &ReplyMarkup,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { markup } else { &ReplyMarkup::None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        markup: &ReplyMarkup,
    ) -> Result<(), ChannelError> {
        let body = send_message_body(chat_id, text, markup);

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage returned {status}: {err}"),
            });
        }

        Ok(())
    }

    /// Resolve a file id to its download path via `getFile`.
    async fn resolve_file_path(&self, file_id: &str) -> Result<String, ChannelError> {
        let download_err = |reason: String| ChannelError::DownloadFailed {
            name: "telegram".into(),
            file_id: file_id.to_string(),
            reason,
        };

        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(download_err(format!("getFile returned {}", resp.status())));
        }

        let data: Value = resp.json().await.map_err(|e| download_err(e.to_string()))?;
        data.get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| download_err("getFile response has no file_path".into()))
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();
        let poll_timeout = self.poll_timeout.as_secs();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": poll_timeout,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                if let Some(description) = poll_rejection(&data) {
                    tracing::warn!(description, "Telegram getUpdates rejected");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        if msg.chat_id.is_empty() {
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "message has no chat_id".into(),
            });
        }
        self.send_message(&msg.chat_id, &response.content, &response.markup)
            .await
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        let file_path = self.resolve_file_path(file_id).await?;

        let download_err = |reason: String| ChannelError::DownloadFailed {
            name: "telegram".into(),
            file_id: file_id.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(download_err(format!("file endpoint returned {}", resp.status())));
        }

        let bytes = resp.bytes().await.map_err(|e| download_err(e.to_string()))?;
        tracing::debug!(file_id, size = bytes.len(), "Telegram file downloaded");
        Ok(bytes.to_vec())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Description of a `getUpdates` reply the API marked `"ok": false`.
fn poll_rejection(data: &Value) -> Option<&str> {
    if data.get("ok").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    Some(
        data.get("description")
            .and_then(Value::as_str)
            .unwrap_or("no description"),
    )
}

fn api_url(token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        token.expose_secret()
    )
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Turn one `getUpdates` entry into an [`IncomingMessage`].
///
/// Returns `None` for non-message updates and for senders outside the
/// allowlist.
fn parse_update(update: &Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let from = message.get("from");

    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string());

    let is_allowed = {
        let mut identities = vec![username];
        if let Some(ref id) = user_id {
            identities.push(id.as_str());
        }
        check_user_allowed(allowed_users, identities)
    };

    if !is_allowed {
        tracing::warn!(
            "Telegram: ignoring message from unauthorized user: \
             username={username}, user_id={}",
            user_id.as_deref().unwrap_or("unknown")
        );
        return None;
    }

    let sender = user_id.as_deref().unwrap_or(username);
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_else(|| sender.to_string());

    let first_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str);

    let incoming = IncomingMessage::new("telegram", sender, parse_content(message))
        .with_chat_id(chat_id)
        .with_user_name(first_name.unwrap_or(username))
        .with_metadata(serde_json::json!({
            "username": username,
            "message_id": message.get("message_id").cloned().unwrap_or(Value::Null),
        }));

    Some(incoming)
}

fn parse_content(message: &Value) -> MessageContent {
    if let Some(text) = message.get("text").and_then(Value::as_str) {
        return MessageContent::text(text);
    }

    // Sizes arrive smallest first.
    if let Some(largest) = message
        .get("photo")
        .and_then(Value::as_array)
        .and_then(|sizes| sizes.last())
    {
        if let Some(file_id) = largest.get("file_id").and_then(Value::as_str) {
            let dim = |key: &str| {
                largest
                    .get(key)
                    .and_then(Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(0)
            };
            return MessageContent::Photo {
                photo: PhotoRef {
                    file_id: file_id.to_string(),
                    width: dim("width"),
                    height: dim("height"),
                    file_size: largest.get("file_size").and_then(Value::as_u64),
                },
            };
        }
    }

    if let Some(location) = message.get("location") {
        let lat = location.get("latitude").and_then(Value::as_f64);
        let lon = location.get("longitude").and_then(Value::as_f64);
        if let (Some(latitude), Some(longitude)) = (lat, lon) {
            return MessageContent::Location {
                location: GeoPoint::new(latitude, longitude),
            };
        }
    }

    let kind = UNSUPPORTED_KINDS
        .iter()
        .find(|k| message.get(**k).is_some())
        .copied()
        .unwrap_or("unknown");
    MessageContent::Unsupported {
        kind: kind.to_string(),
    }
}

/// JSON form of a reply markup, or `None` when nothing should be attached.
fn markup_json(markup: &ReplyMarkup) -> Option<Value> {
    match markup {
        ReplyMarkup::None => None,
        ReplyMarkup::Keyboard {
            rows,
            one_time,
            placeholder,
        } => {
            let keyboard: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|label| serde_json::json!({ "text": label }))
                        .collect()
                })
                .collect();
            let mut json = serde_json::json!({
                "keyboard": keyboard,
                "one_time_keyboard": one_time,
            });
            if let Some(p) = placeholder {
                json["input_field_placeholder"] = Value::String(p.clone());
            }
            Some(json)
        }
        ReplyMarkup::Remove => Some(serde_json::json!({ "remove_keyboard": true })),
    }
}

fn send_message_body(chat_id: &str, text: &str, markup: &ReplyMarkup) -> Value {
    let mut body = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
    });
    if let Some(markup) = markup_json(markup) {
        body["reply_markup"] = markup;
    }
    body
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Largest char boundary within the limit
        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }

        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
