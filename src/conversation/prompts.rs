//! Fixed texts the bot sends.

use crate::channels::OutgoingResponse;

use super::profile::Gender;
use super::state::ConversationState;

pub const GENDER_PROMPT: &str = "Hi! My name is Professor Bot. I will hold a conversation with you. \
Send /cancel to stop talking to me.\n\nAre you a boy or a girl?";
pub const GENDER_PLACEHOLDER: &str = "Boy or Girl?";
pub const PHOTO_PROMPT: &str = "I see! Please send me a photo of yourself, \
so I know what you look like, or send /skip if you don't want to.";
pub const LOCATION_PROMPT: &str =
    "Gorgeous! Now, send me your location please, or send /skip if you don't want to.";
pub const SKIP_PHOTO_PROMPT: &str =
    "I bet you look great! Now, send me your location please, or send /skip.";
pub const BIO_PROMPT: &str =
    "Maybe I can visit you sometime! At last, tell me something about yourself.";
pub const SKIP_LOCATION_PROMPT: &str =
    "You seem a bit paranoid! At last, tell me something about yourself.";
pub const FAREWELL: &str = "Thank you! I hope we can talk again some day.";
pub const CANCELLED: &str = "Bye! I hope we can talk again some day.";
pub const HELP: &str = "/start - begin the questionnaire\n\
/skip - skip the photo or location step\n\
/cancel - stop the questionnaire\n\
/help - show this message";

/// The opening question, with the gender choices as a one-time keyboard.
pub fn gender_prompt() -> OutgoingResponse {
    OutgoingResponse::text(GENDER_PROMPT)
        .with_choices(Gender::ALL.map(|g| g.label()), Some(GENDER_PLACEHOLDER))
}

/// Corrective prompt for input the current state does not accept.
pub fn reprompt(state: ConversationState) -> Option<OutgoingResponse> {
    let response = match state {
        ConversationState::Gender => {
            OutgoingResponse::text("Please pick one of the options: Boy, Girl or Other.")
                .with_choices(Gender::ALL.map(|g| g.label()), Some(GENDER_PLACEHOLDER))
        }
        ConversationState::Photo => {
            OutgoingResponse::text("Please send me a photo, or send /skip.")
        }
        ConversationState::Location => {
            OutgoingResponse::text("Please share your location, or send /skip.")
        }
        ConversationState::Bio => {
            OutgoingResponse::text("Please tell me something about yourself in a text message.")
        }
        ConversationState::End => return None,
    };
    Some(response)
}
