//! Questionnaire state machine: tracks which step a conversation is on.

use serde::{Deserialize, Serialize};

/// The steps of the questionnaire.
///
/// Progresses linearly: Gender → Photo → Location → Bio → End. Every
/// non-terminal step may also jump straight to End on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Gender,
    Photo,
    Location,
    Bio,
    End,
}

impl ConversationState {
    /// Every state, in questionnaire order.
    pub const ALL: [ConversationState; 5] = [
        Self::Gender,
        Self::Photo,
        Self::Location,
        Self::Bio,
        Self::End,
    ];

    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: ConversationState) -> bool {
        use ConversationState::*;
        match (self, target) {
            (End, _) => false,
            (_, End) => true,
            _ => self.next() == Some(target),
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// The next state in the linear progression, if any.
    pub fn next(&self) -> Option<ConversationState> {
        use ConversationState::*;
        match self {
            Gender => Some(Photo),
            Photo => Some(Location),
            Location => Some(Bio),
            Bio => Some(End),
            End => None,
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Gender => "gender",
            Self::Photo => "photo",
            Self::Location => "location",
            Self::Bio => "bio",
            Self::End => "end",
        };
        write!(f, "{s}")
    }
}
