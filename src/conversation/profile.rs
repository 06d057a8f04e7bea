//! Answers collected during a conversation.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channels::GeoPoint;

/// The closed set of gender answers. Labels are matched exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Boy,
    Girl,
    Other,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Self::Boy, Self::Girl, Self::Other];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Boy => "Boy",
            Self::Girl => "Girl",
            Self::Other => "Other",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.label() == s)
            .ok_or_else(|| format!("not a gender option: {s:?}"))
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single field recorded by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileUpdate {
    Gender(Gender),
    Photo(PathBuf),
    Location(GeoPoint),
    Bio(String),
}

/// Scratch data for one conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    /// Where the submitted photo was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn apply(&mut self, update: ProfileUpdate) {
        match update {
            ProfileUpdate::Gender(g) => self.gender = Some(g),
            ProfileUpdate::Photo(p) => self.photo = Some(p),
            ProfileUpdate::Location(l) => self.location = Some(l),
            ProfileUpdate::Bio(b) => self.bio = Some(b),
        }
        self.updated_at = Some(Utc::now());
    }
}
