//! Property-based tests for binding selection
//!
//! These tests verify the selection invariants hold for arbitrary registries
//! and messages.

use super::*;
use crate::message::{IncomingMessage, MessageType};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn stay() -> impl Handler {
    handler_fn(|ctx: HandlerContext| async move { Ok(ctx.state) })
}

const PATTERNS: &[&str] = &["[0-9]+", "yes|no", ".*", "hi", "[a-z]+ [a-z]+", "/start"];

#[derive(Debug, Clone)]
enum TriggerShape {
    Types(Vec<MessageType>),
    Pattern(&'static str),
}

impl TriggerShape {
    fn build(&self) -> Trigger {
        match self {
            Self::Types(types) => Trigger::types(types.iter().cloned()),
            Self::Pattern(pattern) => Trigger::pattern(pattern).unwrap(),
        }
    }
}

#[derive(Debug, Clone)]
struct BindingShape {
    state: i64,
    trigger: TriggerShape,
}

fn build_registry(shapes: &[BindingShape], with_fallback: bool) -> StateRegistry {
    let mut registry = StateRegistry::new();
    for shape in shapes {
        registry.register(shape.state, shape.trigger.build(), stay());
    }
    if with_fallback {
        registry.register_invalid_handler(stay()).unwrap();
    }
    registry
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::Text),
        Just(MessageType::Image),
        Just(MessageType::Audio),
        Just(MessageType::Video),
        Just(MessageType::Location),
        Just(MessageType::Sticker),
    ]
}

fn arb_trigger() -> impl Strategy<Value = TriggerShape> {
    prop_oneof![
        proptest::collection::vec(arb_message_type(), 1..4).prop_map(TriggerShape::Types),
        proptest::sample::select(PATTERNS).prop_map(TriggerShape::Pattern),
    ]
}

fn arb_binding() -> impl Strategy<Value = BindingShape> {
    (0i64..3, arb_trigger()).prop_map(|(state, trigger)| BindingShape { state, trigger })
}

fn arb_message() -> impl Strategy<Value = IncomingMessage> {
    prop_oneof![
        "[a-z0-9 /]{0,12}".prop_map(|body| IncomingMessage::text("wamid.p", "5511900000000", body)),
        arb_message_type().prop_map(|kind| IncomingMessage::of_kind("wamid.p", "5511900000000", kind)),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Same registry, state and message always select the same binding
    #[test]
    fn prop_selection_is_deterministic(
        bindings in proptest::collection::vec(arb_binding(), 0..8),
        state in 0i64..3,
        message in arb_message(),
    ) {
        let registry = build_registry(&bindings, false);
        let first = select(&registry, &State::Id(state), &message);
        let second = select(&registry, &State::Id(state), &message);

        match (first, second) {
            (Selection::Binding { index: a, .. }, Selection::Binding { index: b, .. }) => {
                prop_assert_eq!(a, b)
            }
            (Selection::Unmatched, Selection::Unmatched) => {}
            (a, b) => prop_assert!(false, "diverging selections: {:?} vs {:?}", a, b),
        }
    }

    /// The selected binding is the earliest matching one of the current state
    #[test]
    fn prop_first_match_wins(
        bindings in proptest::collection::vec(arb_binding(), 0..8),
        state in 0i64..3,
        message in arb_message(),
    ) {
        let registry = build_registry(&bindings, false);
        let expected = bindings
            .iter()
            .filter(|shape| shape.state == state)
            .position(|shape| shape.trigger.build().matches(&message));

        match select(&registry, &State::Id(state), &message) {
            Selection::Binding { index, binding } => {
                prop_assert_eq!(Some(index), expected);
                prop_assert_eq!(binding.state(), &State::Id(state));
                prop_assert_eq!(binding.order(), index);
            }
            Selection::Unmatched => prop_assert_eq!(expected, None),
            Selection::Fallback(_) => prop_assert!(false, "no fallback was registered"),
        }
    }

    /// Without a match the fallback runs if registered, else nothing does
    #[test]
    fn prop_fallback_only_without_match(
        bindings in proptest::collection::vec(arb_binding(), 0..8),
        state in 0i64..3,
        message in arb_message(),
    ) {
        let registry = build_registry(&bindings, true);
        let any_match = registry
            .bindings_for(&State::Id(state))
            .iter()
            .any(|binding| binding.trigger().matches(&message));

        match select(&registry, &State::Id(state), &message) {
            Selection::Binding { .. } => prop_assert!(any_match),
            Selection::Fallback(_) => prop_assert!(!any_match),
            Selection::Unmatched => prop_assert!(false, "fallback was registered"),
        }
    }

    /// Patterns match whole texts only
    #[test]
    fn prop_pattern_matches_entire_text(body in "[a-z0-9]{0,10}") {
        let trigger = Trigger::pattern("[0-9]+").unwrap();
        let message = IncomingMessage::text("wamid.p", "5511900000000", body.clone());
        let all_digits = !body.is_empty() && body.chars().all(|c| c.is_ascii_digit());

        prop_assert_eq!(trigger.matches(&message), all_digits);
    }

    /// Non-text messages never satisfy a pattern trigger
    #[test]
    fn prop_media_never_matches_patterns(
        pattern in proptest::sample::select(PATTERNS),
        kind in arb_message_type().prop_filter("non-text", |k| *k != MessageType::Text),
    ) {
        let trigger = Trigger::pattern(pattern).unwrap();
        let message = IncomingMessage::of_kind("wamid.p", "5511900000000", kind);

        prop_assert!(!trigger.matches(&message));
    }
}
