//! Profile Bot: a four-step questionnaire over chat.

pub mod bot;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod media;
