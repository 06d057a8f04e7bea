//! Typed view of an inbound message, as seen by the transition table.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::{GeoPoint, MessageContent, PhotoRef};

/// `/name`, `/name@botname`, optionally followed by arguments. The name ends
/// at the first character that cannot be part of it, so `/cancel!` is still
/// `cancel`.
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^/([A-Za-z0-9_]{1,32})(?:@([A-Za-z0-9_]+))?(?:[^A-Za-z0-9_@](.*))?$")
        .expect("command regex is valid")
});

pub mod commands {
    pub const START: &str = "start";
    pub const SKIP: &str = "skip";
    pub const CANCEL: &str = "cancel";
    pub const HELP: &str = "help";
}

/// An inbound message classified for matching.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Slash command. `name` is lowercased and stripped of any `@botname`.
    Command { name: String, args: Vec<String> },
    /// Free text that is not a command.
    Text(String),
    Photo(PhotoRef),
    Location(GeoPoint),
    /// Anything the questionnaire never accepts.
    Other(String),
}

impl Input {
    pub fn classify(content: &MessageContent) -> Self {
        match content {
            MessageContent::Text { text } => parse_command(text)
                .unwrap_or_else(|| Input::Text(text.clone())),
            MessageContent::Photo { photo } => Input::Photo(photo.clone()),
            MessageContent::Location { location } => Input::Location(*location),
            MessageContent::Unsupported { kind } => Input::Other(kind.clone()),
        }
    }

    /// Whether this is the command `name` (case-insensitive).
    pub fn is_command(&self, name: &str) -> bool {
        matches!(self, Input::Command { name: n, .. } if n.eq_ignore_ascii_case(name))
    }

    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Input::Command { .. } => "command",
            Input::Text(_) => "text",
            Input::Photo(_) => "photo",
            Input::Location(_) => "location",
            Input::Other(_) => "other",
        }
    }
}

impl From<&MessageContent> for Input {
    fn from(content: &MessageContent) -> Self {
        Self::classify(content)
    }
}

fn parse_command(text: &str) -> Option<Input> {
    let caps = COMMAND_RE.captures(text.trim())?;
    let name = caps.get(1)?.as_str().to_lowercase();
    let args = caps
        .get(3)
        .map(|m| m.as_str().split_whitespace().map(String::from).collect())
        .unwrap_or_default();
    Some(Input::Command { name, args })
}
