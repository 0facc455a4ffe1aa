//! Property-based test generators using proptest.

use proptest::prelude::*;
use sqlworker_protocol::Value;

/// Generates SQL values that survive a trip through SQLite unchanged.
pub fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Value::Real),
        "[ -~]{0,24}".prop_map(Value::Text),
        proptest::collection::vec(any::<u8>(), 0..32).prop_map(Value::Blob),
    ]
}

/// Generates a grocery name.
pub fn arb_grocery_name() -> impl Strategy<Value = String> {
    "[a-z]{3,12}"
}

/// Generates up to `max` distinct grocery names.
pub fn arb_grocery_names(max: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::hash_set(arb_grocery_name(), 1..=max.max(1))
        .prop_map(|names| names.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn names_are_distinct(names in arb_grocery_names(8)) {
            let mut sorted = names.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), names.len());
        }

        #[test]
        fn values_are_finite(value in arb_value()) {
            if let Value::Real(f) = value {
                prop_assert!(f.is_finite());
            }
        }
    }
}
