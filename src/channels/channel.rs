//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Reference to a photo held by the gateway. Only the largest size is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
    /// Gateway-specific identifier used to download the file.
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    pub file_size: Option<u64>,
}

/// What an inbound message carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Photo { photo: PhotoRef },
    Location { location: GeoPoint },
    /// Stickers, voice notes, documents and anything else.
    Unsupported { kind: String },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A message received from a channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel that delivered it.
    pub channel: String,
    /// Sender identity within the channel.
    pub user_id: String,
    /// Chat the message was posted in. Defaults to the sender for direct chats.
    pub chat_id: String,
    /// Display name, when the gateway provides one.
    pub user_name: Option<String>,
    pub content: MessageContent,
    /// Channel-specific extras (username, raw ids).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            chat_id: user_id.to_string(),
            user_name: None,
            content,
            metadata: serde_json::json!({}),
            received_at: Utc::now(),
        }
    }

    /// Shorthand for a text message.
    pub fn text(channel: &str, user_id: &str, text: &str) -> Self {
        Self::new(channel, user_id, MessageContent::text(text))
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = chat_id.into();
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Name to use in log lines.
    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or(&self.user_id)
    }
}

/// Quick-reply markup attached to an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReplyMarkup {
    /// Leave whatever the client currently shows.
    #[default]
    None,
    /// Offer a closed set of choices.
    Keyboard {
        rows: Vec<Vec<String>>,
        one_time: bool,
        placeholder: Option<String>,
    },
    /// Hide a previously shown keyboard.
    Remove,
}

/// A response to send back through a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
    pub markup: ReplyMarkup,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            markup: ReplyMarkup::None,
        }
    }

    /// Attach a one-time keyboard with a single row of options.
    pub fn with_choices<I, S>(mut self, choices: I, placeholder: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.markup = ReplyMarkup::Keyboard {
            rows: vec![choices.into_iter().map(Into::into).collect()],
            one_time: true,
            placeholder: placeholder.map(String::from),
        };
        self
    }

    pub fn remove_keyboard(mut self) -> Self {
        self.markup = ReplyMarkup::Remove;
        self
    }

    /// All options offered by the keyboard, if any.
    pub fn choices(&self) -> Vec<&str> {
        match &self.markup {
            ReplyMarkup::Keyboard { rows, .. } => {
                rows.iter().flatten().map(String::as_str).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// A bidirectional message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel name, matched against [`IncomingMessage::channel`].
    fn name(&self) -> &str;

    /// Begin listening and return the inbound stream.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Reply to the chat `msg` came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Fetch the bytes of a file the gateway holds.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        Err(ChannelError::DownloadFailed {
            name: self.name().to_string(),
            file_id: file_id.to_string(),
            reason: "channel does not support file downloads".to_string(),
        })
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_message_defaults_chat_to_sender() {
        let msg = IncomingMessage::text("cli", "local-user", "hi");
        assert_eq!(msg.chat_id, "local-user");
        assert_eq!(msg.display_name(), "local-user");
        assert_eq!(msg.content.as_text(), Some("hi"));
    }

    #[test]
    fn incoming_message_builders() {
        let msg = IncomingMessage::text("telegram", "42", "hi")
            .with_chat_id("-100")
            .with_user_name("Alice")
            .with_metadata(serde_json::json!({"username": "alice"}));
        assert_eq!(msg.chat_id, "-100");
        assert_eq!(msg.display_name(), "Alice");
        assert_eq!(msg.metadata["username"], "alice");
    }

    #[test]
    fn choices_builds_single_one_time_row() {
        let resp = OutgoingResponse::text("pick").with_choices(["A", "B"], Some("A or B?"));
        assert_eq!(resp.choices(), vec!["A", "B"]);
        match resp.markup {
            ReplyMarkup::Keyboard {
                one_time,
                placeholder,
                ..
            } => {
                assert!(one_time);
                assert_eq!(placeholder.as_deref(), Some("A or B?"));
            }
            other => panic!("expected keyboard, got {other:?}"),
        }
    }

    #[test]
    fn remove_keyboard_has_no_choices() {
        let resp = OutgoingResponse::text("bye").remove_keyboard();
        assert_eq!(resp.markup, ReplyMarkup::Remove);
        assert!(resp.choices().is_empty());
    }

    #[test]
    fn message_content_serde_is_tagged() {
        let content = MessageContent::Location {
            location: GeoPoint::new(52.5, 13.4),
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "location");
        assert_eq!(json["location"]["latitude"], 52.5);
    }
}
