//! The transition table: state × matcher → action, next state.
//!
//! Rules for a state are tried in declared order and the first match wins.
//! Fallbacks are tried after the state's own rules. An input nothing
//! matches is left unconsumed.

use super::input::{Input, commands};
use super::profile::Gender;
use super::state::ConversationState;

/// Predicate over an [`Input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Text exactly equal to one of the gender labels.
    GenderChoice,
    Photo,
    Location,
    Command(&'static str),
    /// Any text that is not a command.
    PlainText,
}

impl Matcher {
    pub fn matches(&self, input: &Input) -> bool {
        match (self, input) {
            (Matcher::GenderChoice, Input::Text(text)) => text.parse::<Gender>().is_ok(),
            (Matcher::Photo, Input::Photo(_)) => true,
            (Matcher::Location, Input::Location(_)) => true,
            (Matcher::Command(name), input) => input.is_command(name),
            (Matcher::PlainText, Input::Text(_)) => true,
            _ => false,
        }
    }
}

/// What a matched rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RecordGender,
    StorePhoto,
    SkipPhoto,
    RecordLocation,
    SkipLocation,
    RecordBio,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub matcher: Matcher,
    pub action: Action,
    pub next: ConversationState,
}

impl Rule {
    const fn new(matcher: Matcher, action: Action, next: ConversationState) -> Self {
        Self {
            matcher,
            action,
            next,
        }
    }
}

/// Command that opens a conversation.
pub const ENTRY_COMMAND: &str = commands::START;

const GENDER_RULES: &[Rule] = &[Rule::new(
    Matcher::GenderChoice,
    Action::RecordGender,
    ConversationState::Photo,
)];

const PHOTO_RULES: &[Rule] = &[
    Rule::new(Matcher::Photo, Action::StorePhoto, ConversationState::Location),
    Rule::new(
        Matcher::Command(commands::SKIP),
        Action::SkipPhoto,
        ConversationState::Location,
    ),
];

const LOCATION_RULES: &[Rule] = &[
    Rule::new(
        Matcher::Location,
        Action::RecordLocation,
        ConversationState::Bio,
    ),
    Rule::new(
        Matcher::Command(commands::SKIP),
        Action::SkipLocation,
        ConversationState::Bio,
    ),
];

const BIO_RULES: &[Rule] = &[Rule::new(
    Matcher::PlainText,
    Action::RecordBio,
    ConversationState::End,
)];

/// Rules that apply in every non-terminal state.
pub const FALLBACKS: &[Rule] = &[Rule::new(
    Matcher::Command(commands::CANCEL),
    Action::Cancel,
    ConversationState::End,
)];

/// The state's own rules, in match order.
pub fn rules(state: ConversationState) -> &'static [Rule] {
    match state {
        ConversationState::Gender => GENDER_RULES,
        ConversationState::Photo => PHOTO_RULES,
        ConversationState::Location => LOCATION_RULES,
        ConversationState::Bio => BIO_RULES,
        ConversationState::End => &[],
    }
}

/// First rule matching `input` in `state`, falling back to [`FALLBACKS`].
pub fn resolve(state: ConversationState, input: &Input) -> Option<&'static Rule> {
    if state.is_terminal() {
        return None;
    }
    rules(state)
        .iter()
        .chain(FALLBACKS)
        .find(|rule| rule.matcher.matches(input))
}
