//! Property-based tests for task text and session name validation.
//!
//! Uses proptest to verify:
//! 1. Whitespace-only input is always rejected as empty.
//! 2. Accepted text is always trimmed and within the limit.
//! 3. Normalization is idempotent.
//! 4. Arbitrary input never panics.

use proptest::prelude::*;
use studyroom_proto::task::{
    MAX_TASK_TEXT_LENGTH, TextError, normalize_session_name, normalize_task_text, normalize_text,
};

/// Strategy for strings made only of whitespace characters.
fn arb_whitespace() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec![' ', '\t', '\n', '\r', '\u{a0}']), 0..32)
        .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn whitespace_only_is_empty(text in arb_whitespace()) {
        prop_assert_eq!(normalize_task_text(&text), Err(TextError::Empty));
    }

    #[test]
    fn accepted_text_is_trimmed_and_bounded(text in "\\PC{0,300}") {
        if let Ok(normalized) = normalize_task_text(&text) {
            prop_assert_eq!(normalized, normalized.trim());
            prop_assert!(!normalized.is_empty());
            prop_assert!(normalized.chars().count() <= MAX_TASK_TEXT_LENGTH);
        }
    }

    #[test]
    fn normalization_is_idempotent(text in "\\PC{0,300}", max in 1usize..64) {
        if let Ok(once) = normalize_text(&text, max) {
            prop_assert_eq!(normalize_text(once, max), Ok(once));
        }
    }

    #[test]
    fn arbitrary_names_never_panic(name in any::<String>()) {
        let _ = normalize_session_name(&name);
    }
}
