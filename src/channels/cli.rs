//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Attachments are emulated with two local commands:
//! `/photo <path>` sends the file at `path` as a photo and
//! `/location <lat> <lon>` sends a location.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{
    Channel, GeoPoint, IncomingMessage, MessageContent, MessageStream, OutgoingResponse, PhotoRef,
    ReplyMarkup,
};
use crate::error::ChannelError;

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Map one typed line to message content.
fn parse_line(line: &str) -> MessageContent {
    if let Some(path) = line.strip_prefix("/photo ") {
        let path = path.trim();
        if !path.is_empty() {
            return MessageContent::Photo {
                photo: PhotoRef {
                    file_id: path.to_string(),
                    width: 0,
                    height: 0,
                    file_size: None,
                },
            };
        }
    }

    if let Some(rest) = line.strip_prefix("/location ") {
        let coords: Vec<f64> = rest
            .split([' ', ','])
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();
        if let [latitude, longitude] = coords[..] {
            return MessageContent::Location {
                location: GeoPoint::new(latitude, longitude),
            };
        }
    }

    MessageContent::text(line)
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprintln!("Send /start to begin. /photo <path> and /location <lat> <lon> emulate attachments.");
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = IncomingMessage::new("cli", "local-user", parse_line(&line))
                            .with_user_name("local-user");
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}", response.content);
        if let ReplyMarkup::Keyboard { .. } = response.markup {
            let options: Vec<String> = response
                .choices()
                .iter()
                .map(|c| format!("[{c}]"))
                .collect();
            println!("{}", options.join(" "));
        }
        println!();
        eprint!("> ");
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        let path = PathBuf::from(file_id);
        tokio::fs::read(&path)
            .await
            .map_err(|e| ChannelError::DownloadFailed {
                name: "cli".into(),
                file_id: file_id.to_string(),
                reason: e.to_string(),
            })
    }
}
