use proptest::prelude::*;
use serde_json::{Map, Value};

/// Nesting depths for the context-reuse property
pub fn nesting_depth_strategy() -> impl Strategy<Value = usize> {
    0usize..12
}

/// Flat JSON objects usable as trigger payloads
pub fn payload_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(
        "[a-z][a-z0-9_]{0,11}",
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        ],
        0..6,
    )
    .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<String, Value>>()))
}
