//! Conversation state identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in the conversation graph.
///
/// States carry no structure; equality is all the engine needs. Bots name
/// them with strings (`"START"`) or small integers, whichever reads better
/// in their own code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum State {
    Id(i64),
    Name(String),
}

impl State {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }
}

impl From<&str> for State {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for State {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<i64> for State {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<i32> for State {
    fn from(id: i32) -> Self {
        Self::Id(i64::from(id))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip_keeps_kind() {
        let named: State = serde_json::from_str("\"START\"").unwrap();
        let numbered: State = serde_json::from_str("3").unwrap();

        assert_eq!(named, State::from("START"));
        assert_eq!(numbered, State::from(3));
        assert_ne!(State::from("3"), State::from(3));
        assert_eq!(serde_json::to_string(&numbered).unwrap(), "3");
    }
}
