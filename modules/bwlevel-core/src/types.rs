use std::fmt;

use serde::{Deserialize, Serialize};

/// Lookup key for a player. Opaque apart from surrounding whitespace, which
/// is trimmed. Never used raw in a URL: see [`PlayerName::url_encoded`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerName(String);

impl PlayerName {
    /// Returns `None` for a blank name.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Percent-encoded form, safe as a single path segment.
    pub fn url_encoded(&self) -> String {
        urlencoding::encode(&self.0).into_owned()
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of resolving a player's level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Level read from the profile page.
    Numeric(u64),
    /// The profile hides the player's real identity (nicked).
    Concealed,
    /// Nothing definitive yet. Callers should try again later.
    Unknown,
}

impl Resolution {
    /// Numeric and Concealed are real answers; Unknown is transient.
    pub fn is_definitive(&self) -> bool {
        !matches!(self, Resolution::Unknown)
    }

    pub fn level(&self) -> Option<u64> {
        match self {
            Resolution::Numeric(level) => Some(*level),
            _ => None,
        }
    }

    pub fn status(&self) -> ResolutionStatus {
        match self {
            Resolution::Numeric(_) => ResolutionStatus::Ok,
            Resolution::Concealed => ResolutionStatus::Concealed,
            Resolution::Unknown => ResolutionStatus::Unknown,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Numeric(level) => write!(f, "{level}"),
            Resolution::Concealed => f.write_str("concealed"),
            Resolution::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Ok,
    Concealed,
    Unknown,
}

/// Wire shape: `{ "level": number|null, "status": "ok"|"concealed"|"unknown" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionView {
    pub level: Option<u64>,
    pub status: ResolutionStatus,
}

impl From<Resolution> for ResolutionView {
    fn from(resolution: Resolution) -> Self {
        Self {
            level: resolution.level(),
            status: resolution.status(),
        }
    }
}
