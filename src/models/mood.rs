use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mood attached to a diary entry. Matches the set offered by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Sad,
    Angry,
    Surprised,
    Tired,
    Love,
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mood::Happy => write!(f, "happy"),
            Mood::Sad => write!(f, "sad"),
            Mood::Angry => write!(f, "angry"),
            Mood::Surprised => write!(f, "surprised"),
            Mood::Tired => write!(f, "tired"),
            Mood::Love => write!(f, "love"),
        }
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "happy" => Ok(Mood::Happy),
            "sad" => Ok(Mood::Sad),
            "angry" => Ok(Mood::Angry),
            "surprised" => Ok(Mood::Surprised),
            "tired" => Ok(Mood::Tired),
            "love" => Ok(Mood::Love),
            _ => Err(format!(
                "Invalid mood '{}'. Valid options: happy, sad, angry, surprised, tired, love",
                s
            )),
        }
    }
}
