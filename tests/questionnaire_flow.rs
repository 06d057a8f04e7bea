//! End-to-end tests for the questionnaire.
//!
//! Each test drives `Bot::handle_message` with a recording mock channel
//! and a media store rooted in a temp directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tempfile::TempDir;
use tokio::sync::oneshot;

use profile_bot::bot::Bot;
use profile_bot::channels::{
    Channel, ChannelManager, GeoPoint, IncomingMessage, MessageContent, MessageStream,
    OutgoingResponse, PhotoRef, ReplyMarkup,
};
use profile_bot::config::BotConfig;
use profile_bot::conversation::prompts;
use profile_bot::conversation::{ConversationKey, ConversationState, Gender};
use profile_bot::error::{ChannelError, Error};
use profile_bot::media::{LocalMediaStore, PHOTO_FILE_NAME};

const CHANNEL: &str = "mock";
const CHAT: &str = "99";

/// Records every response and serves files from an in-memory map.
#[derive(Clone, Default)]
struct MockChannel {
    sent: Arc<Mutex<Vec<OutgoingResponse>>>,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_sends: Arc<Mutex<bool>>,
    /// Delivered by `start`, after which the stream stays open.
    inbox: Arc<Mutex<Vec<IncomingMessage>>>,
    /// Fired on the next successful send.
    on_send: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl MockChannel {
    fn sent(&self) -> Vec<OutgoingResponse> {
        self.sent.lock().unwrap().clone()
    }

    fn add_file(&self, file_id: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), bytes.to_vec());
    }

    fn set_failing(&self, failing: bool) {
        *self.fail_sends.lock().unwrap() = failing;
    }

    fn queue(&self, message: IncomingMessage) {
        self.inbox.lock().unwrap().push(message);
    }

    fn notify_on_send(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.on_send.lock().unwrap() = Some(tx);
        rx
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let queued = std::mem::take(&mut *self.inbox.lock().unwrap());
        Ok(stream::iter(queued).chain(stream::pending()).boxed())
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        if *self.fail_sends.lock().unwrap() {
            return Err(ChannelError::SendFailed {
                name: CHANNEL.into(),
                reason: "offline".into(),
            });
        }
        self.sent.lock().unwrap().push(response);
        if let Some(tx) = self.on_send.lock().unwrap().take() {
            let _ = tx.send(());
        }
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| ChannelError::DownloadFailed {
                name: CHANNEL.into(),
                file_id: file_id.to_string(),
                reason: "no such file".into(),
            })
    }
}

struct Harness {
    bot: Bot,
    channel: MockChannel,
    media_root: PathBuf,
    _dir: TempDir,
}

fn harness(reprompt: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let media_root = dir.path().join("media");
    let channel = MockChannel::default();

    let mut channels = ChannelManager::new();
    channels.add(Box::new(channel.clone()));

    let config = BotConfig {
        reprompt_unmatched: reprompt,
        media_dir: media_root.clone(),
        ..BotConfig::default()
    };
    let media = Arc::new(LocalMediaStore::new(media_root.clone()));

    Harness {
        bot: Bot::new(&config, channels, media),
        channel,
        media_root,
        _dir: dir,
    }
}

fn msg(user: &str, content: MessageContent) -> IncomingMessage {
    IncomingMessage::new(CHANNEL, user, content)
        .with_chat_id(CHAT)
        .with_user_name("Alice")
}

fn text(user: &str, s: &str) -> IncomingMessage {
    msg(user, MessageContent::text(s))
}

fn photo(user: &str, file_id: &str) -> IncomingMessage {
    msg(
        user,
        MessageContent::Photo {
            photo: PhotoRef {
                file_id: file_id.to_string(),
                width: 1280,
                height: 960,
                file_size: None,
            },
        },
    )
}

fn location(user: &str, lat: f64, lon: f64) -> IncomingMessage {
    msg(
        user,
        MessageContent::Location {
            location: GeoPoint::new(lat, lon),
        },
    )
}

fn key(user: &str) -> ConversationKey {
    ConversationKey::new(CHANNEL, CHAT, user)
}

impl Harness {
    async fn send(&self, message: IncomingMessage) -> Option<ConversationState> {
        let user = message.user_id.clone();
        self.bot.handle_message(&message).await.unwrap();
        self.bot.controller().state_of(&key(&user)).await
    }

    fn stored_files(&self) -> usize {
        count_files(&self.media_root)
    }
}

fn count_files(dir: &std::path::Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|e| {
            let path = e.path();
            if path.is_dir() { count_files(&path) } else { 1 }
        })
        .sum()
}

#[tokio::test]
async fn skip_scenario_walks_all_states_without_storing_files() {
    let h = harness(false);
    use ConversationState as S;

    assert_eq!(h.send(text("1", "/start")).await, Some(S::Gender));
    assert_eq!(h.send(text("1", "Boy")).await, Some(S::Photo));
    assert_eq!(h.send(text("1", "/skip")).await, Some(S::Location));
    assert_eq!(h.send(text("1", "/skip")).await, Some(S::Bio));
    // End removes the conversation
    assert_eq!(h.send(text("1", "I like cats")).await, None);

    let sent: Vec<String> = h.channel.sent().into_iter().map(|r| r.content).collect();
    assert_eq!(
        sent,
        vec![
            prompts::GENDER_PROMPT,
            prompts::PHOTO_PROMPT,
            prompts::SKIP_PHOTO_PROMPT,
            prompts::SKIP_LOCATION_PROMPT,
            prompts::FAREWELL,
        ]
    );
    assert_eq!(h.stored_files(), 0);
}

#[tokio::test]
async fn full_scenario_stores_photo_and_records_answers() {
    let h = harness(false);
    h.channel.add_file("photo-large", b"\xFF\xD8\xFFjpeg");
    use ConversationState as S;

    assert_eq!(h.send(text("1", "/start")).await, Some(S::Gender));
    assert_eq!(h.send(text("1", "Boy")).await, Some(S::Photo));
    assert_eq!(h.send(photo("1", "photo-large")).await, Some(S::Location));
    assert_eq!(h.send(location("1", 52.5, 13.4)).await, Some(S::Bio));

    let conv = h.bot.controller().conversation(&key("1")).await.unwrap();
    assert_eq!(conv.profile.gender, Some(Gender::Boy));
    assert_eq!(conv.profile.location, Some(GeoPoint::new(52.5, 13.4)));
    let stored = conv.profile.photo.clone().unwrap();
    assert!(stored.ends_with(PHOTO_FILE_NAME));
    assert_eq!(std::fs::read(&stored).unwrap(), b"\xFF\xD8\xFFjpeg");

    assert_eq!(h.send(text("1", "Hi")).await, None);
    assert_eq!(h.stored_files(), 1);
    assert_eq!(h.channel.sent().last().unwrap().content, prompts::FAREWELL);
}

#[tokio::test]
async fn entry_prompt_offers_gender_keyboard() {
    let h = harness(false);
    h.send(text("1", "/start")).await;

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].choices(), vec!["Boy", "Girl", "Other"]);
    match &sent[0].markup {
        ReplyMarkup::Keyboard {
            one_time,
            placeholder,
            ..
        } => {
            assert!(*one_time);
            assert_eq!(placeholder.as_deref(), Some("Boy or Girl?"));
        }
        other => panic!("expected keyboard, got {other:?}"),
    }
}

#[tokio::test]
async fn gender_answer_removes_keyboard() {
    let h = harness(false);
    h.send(text("1", "/start")).await;
    h.send(text("1", "Girl")).await;
    assert_eq!(h.channel.sent()[1].markup, ReplyMarkup::Remove);
}

#[tokio::test]
async fn unmatched_input_is_silently_ignored_by_default() {
    let h = harness(false);
    h.send(text("1", "/start")).await;

    assert_eq!(
        h.send(text("1", "I'd rather not say")).await,
        Some(ConversationState::Gender)
    );
    assert_eq!(
        h.send(location("1", 1.0, 2.0)).await,
        Some(ConversationState::Gender)
    );
    assert_eq!(h.channel.sent().len(), 1);
}

#[tokio::test]
async fn unmatched_input_is_reprompted_when_enabled() {
    let h = harness(true);
    h.send(text("1", "/start")).await;
    h.send(text("1", "Other")).await;

    assert_eq!(
        h.send(text("1", "here is my photo")).await,
        Some(ConversationState::Photo)
    );
    let sent = h.channel.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[2].content.contains("/skip"));
}

#[tokio::test]
async fn cancel_ends_every_state() {
    let steps: Vec<IncomingMessage> = vec![
        text("1", "/start"),
        text("1", "Boy"),
        text("1", "/skip"),
        text("1", "/skip"),
    ];

    for depth in 1..=steps.len() {
        let h = harness(false);
        for message in &steps[..depth] {
            h.send(message.clone()).await;
        }
        assert!(h.send(text("1", "/cancel")).await.is_none());
        assert_eq!(h.channel.sent().last().unwrap().content, prompts::CANCELLED);
    }
}

#[tokio::test]
async fn punctuated_cancel_in_bio_cancels() {
    let h = harness(false);
    for input in ["/start", "Girl", "/skip", "/skip."] {
        h.send(text("1", input)).await;
    }
    assert_eq!(
        h.bot.controller().state_of(&key("1")).await,
        Some(ConversationState::Bio)
    );

    assert_eq!(h.send(text("1", "/cancel!")).await, None);
    assert_eq!(h.channel.sent().last().unwrap().content, prompts::CANCELLED);
}

#[tokio::test]
async fn shutdown_during_handling_stops_the_loop() {
    let dir = TempDir::new().unwrap();
    let channel = MockChannel::default();
    channel.queue(text("1", "/start"));
    // Fires while the first message is still being handled
    let shutdown = channel.notify_on_send();

    let mut channels = ChannelManager::new();
    channels.add(Box::new(channel.clone()));
    let media = Arc::new(LocalMediaStore::new(dir.path().join("media")));
    let bot = Bot::new(&BotConfig::default(), channels, media);

    let run = bot.run_until(async {
        let _ = shutdown.await;
    });
    tokio::time::timeout(std::time::Duration::from_secs(5), run)
        .await
        .expect("loop should stop after shutdown")
        .unwrap();

    assert_eq!(channel.sent().len(), 1);
}

#[tokio::test]
async fn start_after_end_restarts() {
    let h = harness(false);
    h.send(text("1", "/start")).await;
    h.send(text("1", "/cancel")).await;
    assert_eq!(
        h.send(text("1", "/start")).await,
        Some(ConversationState::Gender)
    );
}

#[tokio::test]
async fn photos_are_stored_per_conversation() {
    let h = harness(false);
    h.channel.add_file("a", b"alice");
    h.channel.add_file("b", b"bob");

    for user in ["1", "2"] {
        h.send(text(user, "/start")).await;
        h.send(text(user, "Girl")).await;
    }
    h.send(photo("1", "a")).await;
    h.send(photo("2", "b")).await;

    assert_eq!(h.stored_files(), 2);
    let a = h.bot.controller().conversation(&key("1")).await.unwrap();
    let b = h.bot.controller().conversation(&key("2")).await.unwrap();
    assert_ne!(a.profile.photo, b.profile.photo);
}

#[tokio::test]
async fn failed_download_keeps_state() {
    let h = harness(false);
    h.send(text("1", "/start")).await;
    h.send(text("1", "Boy")).await;

    let err = h.bot.handle_message(&photo("1", "missing")).await.unwrap_err();
    assert!(matches!(err, Error::Channel(ChannelError::DownloadFailed { .. })));
    assert_eq!(
        h.bot.controller().state_of(&key("1")).await,
        Some(ConversationState::Photo)
    );
    assert_eq!(h.stored_files(), 0);
}

#[tokio::test]
async fn failed_send_keeps_state() {
    let h = harness(false);
    h.send(text("1", "/start")).await;

    h.channel.set_failing(true);
    assert!(h.bot.handle_message(&text("1", "Boy")).await.is_err());
    assert_eq!(
        h.bot.controller().state_of(&key("1")).await,
        Some(ConversationState::Gender)
    );

    h.channel.set_failing(false);
    assert_eq!(h.send(text("1", "Boy")).await, Some(ConversationState::Photo));
}

#[tokio::test]
async fn messages_without_conversation_are_ignored() {
    let h = harness(false);
    assert_eq!(h.send(text("1", "Boy")).await, None);
    assert_eq!(h.send(photo("1", "x")).await, None);
    assert!(h.channel.sent().is_empty());
}

#[tokio::test]
async fn help_lists_commands() {
    let h = harness(false);
    h.send(text("1", "/help")).await;
    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    for cmd in ["/start", "/skip", "/cancel"] {
        assert!(sent[0].content.contains(cmd));
    }
}

#[test]
fn gender_labels_match_prompt_choices() {
    let labels: Vec<&str> = Gender::ALL.iter().map(|g| g.label()).collect();
    assert_eq!(prompts::gender_prompt().choices(), labels);
}
