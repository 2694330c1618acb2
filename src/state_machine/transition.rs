//! Pure binding selection
//!
//! Given the registry, the current state and a message, decide which handler
//! runs. No I/O happens here, so selection is deterministic for a fixed
//! registry and the dispatcher stays a thin shell around it.

use super::{Handler, State, StateBinding, StateRegistry};
use crate::message::IncomingMessage;
use std::sync::Arc;

/// Outcome of matching a message against the current state's bindings
pub enum Selection<'a> {
    /// The first binding in registration order whose trigger matched
    Binding {
        index: usize,
        binding: &'a StateBinding,
    },
    /// Nothing matched; the registry's invalid-state handler takes over
    Fallback(&'a Arc<dyn Handler>),
    /// Nothing matched and there is no invalid-state handler
    Unmatched,
}

impl std::fmt::Debug for Selection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binding { index, binding } => f
                .debug_struct("Binding")
                .field("index", index)
                .field("binding", binding)
                .finish(),
            Self::Fallback(_) => f.write_str("Fallback"),
            Self::Unmatched => f.write_str("Unmatched"),
        }
    }
}

/// First binding whose trigger accepts `message`
pub fn select_binding<'a>(
    bindings: &'a [StateBinding],
    message: &IncomingMessage,
) -> Option<(usize, &'a StateBinding)> {
    bindings
        .iter()
        .enumerate()
        .find(|(_, binding)| binding.trigger().matches(message))
}

/// Choose what runs for `message` while the conversation sits in `state`.
///
/// Bindings are only looked up under `state`; a binding registered under
/// another state never fires, whatever its trigger.
pub fn select<'a>(
    registry: &'a StateRegistry,
    state: &State,
    message: &IncomingMessage,
) -> Selection<'a> {
    match select_binding(registry.bindings_for(state), message) {
        Some((index, binding)) => Selection::Binding { index, binding },
        None => match registry.invalid_handler() {
            Some(handler) => Selection::Fallback(handler),
            None => Selection::Unmatched,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::state_machine::{handler_fn, HandlerContext, Trigger};

    fn stay() -> impl Handler {
        handler_fn(|ctx: HandlerContext| async move { Ok(ctx.state) })
    }

    fn text(body: &str) -> IncomingMessage {
        IncomingMessage::text("wamid.1", "5511999990000", body)
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = StateRegistry::new();
        registry
            .register("START", Trigger::pattern("[0-9]+").unwrap(), stay())
            .register("START", MessageType::Text, stay());

        match select(&registry, &"START".into(), &text("42")) {
            Selection::Binding { index, .. } => assert_eq!(index, 0),
            other => panic!("unexpected selection: {other:?}"),
        }
        match select(&registry, &"START".into(), &text("hello")) {
            Selection::Binding { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    #[test]
    fn test_bindings_of_other_states_never_fire() {
        let mut registry = StateRegistry::new();
        registry
            .register("START", MessageType::Image, stay())
            .register("MENU", MessageType::Text, stay());

        assert!(matches!(
            select(&registry, &"START".into(), &text("hi")),
            Selection::Unmatched
        ));
    }

    #[test]
    fn test_fallback_when_nothing_matches() {
        let mut registry = StateRegistry::new();
        registry.register("START", MessageType::Image, stay());
        registry.register_invalid_handler(stay()).unwrap();

        assert!(matches!(
            select(&registry, &"START".into(), &text("hi")),
            Selection::Fallback(_)
        ));
        // an unknown state has no bindings, so it falls back too
        assert!(matches!(
            select(&registry, &"GONE".into(), &text("hi")),
            Selection::Fallback(_)
        ));
    }
}
