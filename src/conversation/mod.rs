//! Questionnaire conversation: gender, photo, location, bio.
//!
//! Each conversation is a small state machine driven by an explicit
//! transition table (`flow`). The `FlowController` owns the live
//! conversations and plans transitions. The bot runtime carries out their
//! effects and commits them.

pub mod controller;
pub mod flow;
pub mod input;
pub mod profile;
pub mod prompts;
pub mod state;

pub use controller::{Conversation, ConversationKey, Dispatch, Effect, FlowController, Transition};
pub use flow::{Action, Matcher, Rule};
pub use input::Input;
pub use profile::{Gender, Profile, ProfileUpdate};
pub use state::ConversationState;
