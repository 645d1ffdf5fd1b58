//! Binary outcome of comment classification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scores at or above this value are labelled [`Label::BullyingWords`].
pub const BULLYING_THRESHOLD: f32 = 0.5;

/// Classification label stored on every comment.
///
/// Serialized as the display strings written to the comment `status` column,
/// so rows created by older deployments parse unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "Bullying Words")]
    BullyingWords,
    #[serde(rename = "Not Bullying")]
    NotBullying,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown label: {0:?}")]
pub struct ParseLabelError(pub String);

impl Label {
    /// Label returned whenever the classifier cannot produce a score.
    pub const FALLBACK: Label = Label::NotBullying;

    /// Threshold a probability. The boundary belongs to the bullying side.
    pub fn from_score(score: f32, threshold: f32) -> Self {
        if score >= threshold {
            Self::BullyingWords
        } else {
            Self::NotBullying
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BullyingWords => "Bullying Words",
            Self::NotBullying => "Not Bullying",
        }
    }

    pub fn is_bullying(&self) -> bool {
        matches!(self, Self::BullyingWords)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = ParseLabelError;

    /// Accepts both the stored display form and the constant form
    /// (`BULLYING_WORDS` / `NOT_BULLYING`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Bullying Words" | "BULLYING_WORDS" => Ok(Self::BullyingWords),
            "Not Bullying" | "NOT_BULLYING" => Ok(Self::NotBullying),
            other => Err(ParseLabelError(other.to_string())),
        }
    }
}
