//! FlowController: owns per-conversation state and turns inbound input
//! into transitions.
//!
//! Planning and committing are separate steps. `handle` (or
//! `on_entry_command` / `on_input`) produces a [`Transition`] without
//! touching state. The runtime executes the transition's effects and only
//! then calls `commit`, so a failed send or photo download leaves the
//! conversation where it was.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::channels::{IncomingMessage, OutgoingResponse, PhotoRef};

use super::flow::{self, Action, ENTRY_COMMAND};
use super::input::{Input, commands};
use super::profile::{Profile, ProfileUpdate};
use super::prompts;
use super::state::ConversationState;

/// Identity of a conversation: one user in one chat on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub channel: String,
    pub chat_id: String,
    pub user_id: String,
}

impl ConversationKey {
    pub fn new(channel: &str, chat_id: &str, user_id: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
        }
    }

    pub fn from_message(msg: &IncomingMessage) -> Self {
        Self::new(&msg.channel, &msg.chat_id, &msg.user_id)
    }

    /// Filesystem-safe form of the key, distinct for distinct keys.
    ///
    /// Parts are joined with `.`. Bytes other than ASCII alphanumerics and
    /// `-` are written as `_XX` hex, so neither `.` nor a bare `_` can come
    /// from the parts themselves.
    pub fn storage_slug(&self) -> String {
        [&self.channel, &self.chat_id, &self.user_id]
            .map(|part| escape_slug_part(part))
            .join(".")
    }
}

fn escape_slug_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for b in part.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("_{b:02X}"));
        }
    }
    out
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.channel, self.chat_id, self.user_id)
    }
}

/// A live conversation.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub key: ConversationKey,
    pub state: ConversationState,
    pub profile: Profile,
    pub user_name: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl Conversation {
    fn new(key: ConversationKey, user_name: Option<&str>) -> Self {
        Self {
            key,
            state: ConversationState::Gender,
            profile: Profile::default(),
            user_name: user_name.map(String::from),
            started_at: Utc::now(),
        }
    }

    fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or(&self.key.user_id)
    }
}

/// A side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Reply(OutgoingResponse),
    /// Download the photo and store it under the conversation's namespace.
    PersistPhoto(PhotoRef),
    /// Write a field into the conversation's profile on commit.
    Record(ProfileUpdate),
}

/// A planned move from one state to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// `None` when the transition opens a new conversation.
    pub from: Option<ConversationState>,
    pub to: ConversationState,
    /// `None` for the entry command.
    pub action: Option<Action>,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub fn replies(&self) -> impl Iterator<Item = &OutgoingResponse> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Reply(r) => Some(r),
            _ => None,
        })
    }

    pub fn photo(&self) -> Option<&PhotoRef> {
        self.effects.iter().find_map(|e| match e {
            Effect::PersistPhoto(p) => Some(p),
            _ => None,
        })
    }
}

/// Outcome of offering one input to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A rule matched. Execute the effects, then commit.
    Consumed(Transition),
    /// No state change, but something should be said.
    Reply(OutgoingResponse),
    /// Not consumed by the questionnaire.
    Ignored,
}

pub struct FlowController {
    conversations: RwLock<HashMap<ConversationKey, Conversation>>,
    reprompt_unmatched: bool,
}

impl FlowController {
    pub fn new(reprompt_unmatched: bool) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            reprompt_unmatched,
        }
    }

    /// Plan the opening of a conversation: ask for gender.
    pub fn on_entry_command(&self, key: &ConversationKey) -> Transition {
        tracing::debug!(conversation = %key, "Entry command");
        Transition {
            from: None,
            to: ConversationState::Gender,
            action: None,
            effects: vec![Effect::Reply(prompts::gender_prompt())],
        }
    }

    /// Plan the transition for `input` in `current_state`. `None` means the
    /// input is not consumed.
    pub fn on_input(
        &self,
        key: &ConversationKey,
        current_state: ConversationState,
        input: &Input,
    ) -> Option<Transition> {
        let rule = flow::resolve(current_state, input)?;
        tracing::debug!(
            conversation = %key,
            state = %current_state,
            input = input.kind(),
            action = ?rule.action,
            next = %rule.next,
            "Rule matched"
        );

        let effects = match (rule.action, input) {
            (Action::RecordGender, Input::Text(text)) => vec![
                Effect::Record(ProfileUpdate::Gender(text.parse().ok()?)),
                Effect::Reply(OutgoingResponse::text(prompts::PHOTO_PROMPT).remove_keyboard()),
            ],
            (Action::StorePhoto, Input::Photo(photo)) => vec![
                Effect::PersistPhoto(photo.clone()),
                Effect::Reply(OutgoingResponse::text(prompts::LOCATION_PROMPT)),
            ],
            (Action::SkipPhoto, _) => {
                vec![Effect::Reply(OutgoingResponse::text(prompts::SKIP_PHOTO_PROMPT))]
            }
            (Action::RecordLocation, Input::Location(location)) => vec![
                Effect::Record(ProfileUpdate::Location(*location)),
                Effect::Reply(OutgoingResponse::text(prompts::BIO_PROMPT)),
            ],
            (Action::SkipLocation, _) => {
                vec![Effect::Reply(OutgoingResponse::text(prompts::SKIP_LOCATION_PROMPT))]
            }
            (Action::RecordBio, Input::Text(text)) => vec![
                Effect::Record(ProfileUpdate::Bio(text.clone())),
                Effect::Reply(OutgoingResponse::text(prompts::FAREWELL)),
            ],
            (Action::Cancel, _) => {
                vec![Effect::Reply(OutgoingResponse::text(prompts::CANCELLED).remove_keyboard())]
            }
            // A matcher accepted an input its action cannot use.
            (action, input) => {
                tracing::warn!(?action, input = input.kind(), "Rule matched unusable input");
                return None;
            }
        };

        Some(Transition {
            from: Some(current_state),
            to: rule.next,
            action: Some(rule.action),
            effects,
        })
    }

    /// Route one input: entry command, state transition, or nothing.
    pub async fn handle(&self, key: &ConversationKey, input: &Input) -> Dispatch {
        match self.state_of(key).await {
            None => {
                if input.is_command(ENTRY_COMMAND) {
                    Dispatch::Consumed(self.on_entry_command(key))
                } else if input.is_command(commands::HELP) {
                    Dispatch::Reply(OutgoingResponse::text(prompts::HELP))
                } else {
                    Dispatch::Ignored
                }
            }
            Some(state) => match self.on_input(key, state, input) {
                Some(transition) => Dispatch::Consumed(transition),
                None if self.reprompt_unmatched => prompts::reprompt(state)
                    .map(Dispatch::Reply)
                    .unwrap_or(Dispatch::Ignored),
                None => Dispatch::Ignored,
            },
        }
    }

    /// Apply a transition whose effects have been carried out.
    ///
    /// Records profile fields, moves the state, and removes the
    /// conversation when it reaches End. Returns the finished conversation
    /// in that case. A transition planned against a state the conversation
    /// is no longer in is dropped.
    pub async fn commit(
        &self,
        key: &ConversationKey,
        user_name: Option<&str>,
        transition: &Transition,
        stored_photo: Option<PathBuf>,
    ) -> Option<Conversation> {
        let mut conversations = self.conversations.write().await;

        let conversation = match transition.from {
            None => {
                conversations.insert(key.clone(), Conversation::new(key.clone(), user_name));
                conversations.get_mut(key)?
            }
            Some(from) => {
                let Some(conversation) = conversations.get_mut(key) else {
                    tracing::warn!(conversation = %key, "Commit for unknown conversation dropped");
                    return None;
                };
                if conversation.state != from {
                    tracing::warn!(
                        conversation = %key,
                        expected = %from,
                        actual = %conversation.state,
                        "Stale transition dropped"
                    );
                    return None;
                }
                conversation
            }
        };

        for effect in &transition.effects {
            if let Effect::Record(update) = effect {
                conversation.profile.apply(update.clone());
            }
        }
        if let Some(path) = stored_photo {
            conversation.profile.apply(ProfileUpdate::Photo(path));
        }

        log_step(conversation, transition.action);
        conversation.state = transition.to;

        if transition.to.is_terminal() {
            conversations.remove(key)
        } else {
            None
        }
    }

    /// Current state of a live conversation.
    pub async fn state_of(&self, key: &ConversationKey) -> Option<ConversationState> {
        self.conversations.read().await.get(key).map(|c| c.state)
    }

    /// Snapshot of a live conversation.
    pub async fn conversation(&self, key: &ConversationKey) -> Option<Conversation> {
        self.conversations.read().await.get(key).cloned()
    }

    pub async fn active_conversations(&self) -> usize {
        self.conversations.read().await.len()
    }
}

fn log_step(conversation: &Conversation, action: Option<Action>) {
    let name = conversation.display_name();
    let key = &conversation.key;
    let profile = &conversation.profile;

    match action {
        None => tracing::info!(conversation = %key, "Conversation with {name} started"),
        Some(Action::RecordGender) => {
            if let Some(gender) = profile.gender {
                tracing::info!(conversation = %key, "Gender of {name}: {gender}");
            }
        }
        Some(Action::StorePhoto) => {
            if let Some(ref path) = profile.photo {
                tracing::info!(conversation = %key, "Photo of {name}: {}", path.display());
            }
        }
        Some(Action::SkipPhoto) => {
            tracing::info!(conversation = %key, "User {name} did not send a photo.")
        }
        Some(Action::RecordLocation) => {
            if let Some(loc) = profile.location {
                tracing::info!(
                    conversation = %key,
                    "Location of {name}: {:.6} / {:.6}",
                    loc.latitude,
                    loc.longitude
                );
            }
        }
        Some(Action::SkipLocation) => {
            tracing::info!(conversation = %key, "User {name} did not send a location.")
        }
        Some(Action::RecordBio) => {
            if let Some(ref bio) = profile.bio {
                tracing::info!(conversation = %key, "Bio of {name}: {bio}");
            }
        }
        Some(Action::Cancel) => {
            tracing::info!(conversation = %key, "User {name} canceled the conversation.")
        }
    }
}
