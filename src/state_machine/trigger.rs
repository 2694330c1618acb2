//! Trigger predicates attached to state bindings

use super::registry::RegistryError;
use crate::message::{IncomingMessage, MessageType};
use regex::Regex;
use std::fmt;

/// Predicate deciding whether a binding applies to a message.
///
/// Exactly one kind is active per binding: either the message type must be
/// in a set, or the message's text must fully match a pattern.
#[derive(Clone)]
pub enum Trigger {
    /// Fires when the message type is one of these
    Types(Vec<MessageType>),
    /// Fires when the whole text content matches `regex`
    Pattern { source: String, regex: Regex },
}

impl Trigger {
    /// Type-set trigger; duplicate entries are dropped
    pub fn types(types: impl IntoIterator<Item = MessageType>) -> Self {
        let mut set = Vec::new();
        for kind in types {
            if !set.contains(&kind) {
                set.push(kind);
            }
        }
        Self::Types(set)
    }

    /// Anchored text pattern: `"[0-9]+"` matches `"42"` but not `"a42"` or `"420 x"`.
    pub fn pattern(pattern: &str) -> Result<Self, RegistryError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            RegistryError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self::Pattern {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Slash command: `command("echo")` matches `/echo` and `/echo anything`.
    pub fn command(name: &str) -> Self {
        let name = name.trim_start_matches('/');
        let source = format!("/{name}");
        let regex = Regex::new(&format!(r"^(?s:/{}(?:\s.*)?)$", regex::escape(name)))
            .unwrap_or_else(|_| unreachable!("escaped command pattern always compiles"));
        Self::Pattern { source, regex }
    }

    /// Evaluate against a message.
    ///
    /// Pattern triggers only ever see text-bearing messages; a media message
    /// can never satisfy one.
    pub fn matches(&self, message: &IncomingMessage) -> bool {
        match self {
            Self::Types(types) => types.contains(&message.kind),
            Self::Pattern { regex, .. } => message
                .text_content()
                .is_some_and(|text| regex.is_match(&text)),
        }
    }
}

impl From<MessageType> for Trigger {
    fn from(kind: MessageType) -> Self {
        Self::Types(vec![kind])
    }
}

impl<const N: usize> From<[MessageType; N]> for Trigger {
    fn from(types: [MessageType; N]) -> Self {
        Self::types(types)
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Types(types) => f.debug_tuple("Types").field(types).finish(),
            Self::Pattern { source, .. } => f.debug_tuple("Pattern").field(source).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(body: &str) -> IncomingMessage {
        IncomingMessage::text("wamid.1", "5519900000000", body)
    }

    #[test]
    fn test_pattern_is_anchored() {
        let trigger = Trigger::pattern("[0-9]{2}").unwrap();

        assert!(trigger.matches(&text("42")));
        assert!(!trigger.matches(&text("420")));
        assert!(!trigger.matches(&text("a42")));
        assert!(!trigger.matches(&text("42\n")));
    }

    #[test]
    fn test_pattern_alternation_stays_anchored() {
        let trigger = Trigger::pattern("yes|no").unwrap();

        assert!(trigger.matches(&text("no")));
        assert!(!trigger.matches(&text("nope")));
        assert!(!trigger.matches(&text("eyes")));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = Trigger::pattern("(unclosed").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPattern { .. }));
    }

    #[test]
    fn test_command_trigger() {
        let trigger = Trigger::command("/echo");

        assert!(trigger.matches(&text("/echo")));
        assert!(trigger.matches(&text("/echo hello world")));
        assert!(trigger.matches(&text("/echo multi\nline")));
        assert!(!trigger.matches(&text("/echoes")));
        assert!(!trigger.matches(&text("say /echo")));
    }

    #[test]
    fn test_pattern_never_matches_media() {
        let trigger = Trigger::pattern(".*").unwrap();
        let image = IncomingMessage::of_kind("wamid.2", "5519900000000", MessageType::Image);

        assert!(!trigger.matches(&image));
    }

    #[test]
    fn test_type_trigger_dedups_and_matches() {
        let trigger = Trigger::types([MessageType::Image, MessageType::Video, MessageType::Image]);
        let Trigger::Types(types) = &trigger else {
            panic!("expected type trigger");
        };
        assert_eq!(types.len(), 2);

        let video = IncomingMessage::of_kind("wamid.3", "5519900000000", MessageType::Video);
        assert!(trigger.matches(&video));
        assert!(!trigger.matches(&text("hi")));
    }
}
