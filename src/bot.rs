//! Bot runtime: the main loop.
//!
//! Pulls messages off the merged channel stream, asks the flow controller
//! what to do, carries out the resulting effects, and commits the
//! transition once every effect has succeeded.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;

use crate::channels::{ChannelManager, IncomingMessage};
use crate::config::BotConfig;
use crate::conversation::{ConversationKey, Dispatch, FlowController, Input, Transition};
use crate::error::Result;
use crate::media::MediaStore;

pub struct Bot {
    name: String,
    controller: FlowController,
    channels: Arc<ChannelManager>,
    media: Arc<dyn MediaStore>,
}

impl Bot {
    pub fn new(config: &BotConfig, channels: ChannelManager, media: Arc<dyn MediaStore>) -> Self {
        Self {
            name: config.name.clone(),
            controller: FlowController::new(config.reprompt_unmatched),
            channels: Arc::new(channels),
            media,
        }
    }

    pub fn controller(&self) -> &FlowController {
        &self.controller
    }

    /// Run until Ctrl+C or until every channel stream ends.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Ctrl+C received, shutting down..."),
                Err(e) => {
                    tracing::error!("Unable to listen for Ctrl+C: {e}");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
    }

    /// Run until `shutdown` resolves or until every channel stream ends.
    ///
    /// `shutdown` is polled across loop iterations, so a signal raised while
    /// a message is being handled stops the loop once that message is done.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut message_stream = self.channels.start_all().await?;
        tokio::pin!(shutdown);

        tracing::info!("Bot {} ready and listening", self.name);

        loop {
            let message = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            if let Err(e) = self.handle_message(&message).await {
                tracing::error!(
                    channel = %message.channel,
                    user = %message.display_name(),
                    "Error handling message: {}",
                    e
                );
            }
        }

        self.channels.shutdown_all().await;
        Ok(())
    }

    /// Handle one inbound message to completion.
    ///
    /// On error the conversation stays in the state it was in.
    pub async fn handle_message(&self, message: &IncomingMessage) -> Result<()> {
        let key = ConversationKey::from_message(message);
        let input = Input::classify(&message.content);

        match self.controller.handle(&key, &input).await {
            Dispatch::Consumed(transition) => {
                let stored_photo = self.execute(message, &key, &transition).await?;
                self.controller
                    .commit(&key, message.user_name.as_deref(), &transition, stored_photo)
                    .await;
            }
            Dispatch::Reply(response) => {
                self.channels.respond(message, response).await?;
            }
            Dispatch::Ignored => {
                tracing::debug!(
                    conversation = %key,
                    input = input.kind(),
                    text = message.content.as_text().unwrap_or_default(),
                    "Input not consumed"
                );
            }
        }

        Ok(())
    }

    /// Carry out a transition's effects. The photo, if any, is stored before
    /// any reply goes out. Returns the stored photo path.
    async fn execute(
        &self,
        message: &IncomingMessage,
        key: &ConversationKey,
        transition: &Transition,
    ) -> Result<Option<PathBuf>> {
        let stored_photo = match transition.photo() {
            Some(photo) => {
                let bytes = self.channels.download_file(message, &photo.file_id).await?;
                Some(self.media.save_photo(key, &bytes).await?)
            }
            None => None,
        };

        // Recorded fields are applied on commit.
        for response in transition.replies() {
            self.channels.respond(message, response.clone()).await?;
        }

        Ok(stored_photo)
    }
}
