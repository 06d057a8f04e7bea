//! ChannelManager: owns every active channel and routes replies back to
//! the one a message arrived on.

use futures::stream::{self, StreamExt};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

#[derive(Default)]
pub struct ChannelManager {
    channels: Vec<Box<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: Box<dyn Channel>) {
        tracing::debug!(channel = channel.name(), "Registered channel");
        self.channels.push(channel);
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    fn get(&self, name: &str) -> Result<&dyn Channel, ChannelError> {
        self.channels
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))
    }

    /// Start every channel and merge their inbound streams.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        if self.channels.is_empty() {
            return Err(ChannelError::StartupFailed {
                name: "manager".into(),
                reason: "no channels configured".into(),
            });
        }

        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            if let Err(e) = channel.health_check().await {
                tracing::warn!(channel = channel.name(), "Health check failed: {e}");
            }
            streams.push(channel.start().await?);
            tracing::info!(channel = channel.name(), "Channel started");
        }

        Ok(stream::select_all(streams).boxed())
    }

    /// Send a response on the channel `msg` came from.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.get(&msg.channel)?.respond(msg, response).await
    }

    /// Download a file through the channel `msg` came from.
    pub async fn download_file(
        &self,
        msg: &IncomingMessage,
        file_id: &str,
    ) -> Result<Vec<u8>, ChannelError> {
        self.get(&msg.channel)?.download_file(file_id).await
    }

    pub async fn shutdown_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = channel.name(), "Shutdown failed: {e}");
            }
        }
    }
}
