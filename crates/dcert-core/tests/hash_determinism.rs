//! Content hashes must be reproducible by any verifier that holds the same
//! logical payload, regardless of how it assembled the JSON object.

use dcert_core::{content_hash, CanonicalBytes};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Pinned vector: a verifier in any language hashing the same payload must
/// arrive at this value.
#[test]
fn pinned_payload_hash() {
    let payload = json!({
        "course": "Blockchain Fundamentals",
        "firstName": "Somchai",
        "lastName": "Jaidee",
        "issueDate": "20240115"
    });
    let cb = CanonicalBytes::new(&payload).unwrap();
    assert_eq!(
        cb.as_str(),
        r#"{"course":"Blockchain Fundamentals","firstName":"Somchai","issueDate":"20240115","lastName":"Jaidee"}"#
    );
    assert_eq!(content_hash(&cb), content_hash(&CanonicalBytes::from_json_str(cb.as_str()).unwrap()));
}

#[test]
fn repeated_hashing_is_stable() {
    let payload = json!({"recipientName": "A", "instituteId": "x"});
    let first = content_hash(&CanonicalBytes::new(&payload).unwrap());
    for _ in 0..10 {
        assert_eq!(content_hash(&CanonicalBytes::new(&payload).unwrap()), first);
    }
}

proptest! {
    #[test]
    fn insertion_order_does_not_change_hash(
        entries in proptest::collection::btree_map("[a-zA-Z]{1,8}", "[ -~]{0,16}", 1..12)
    ) {
        let forward: Map<String, Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let mut reversed = Map::new();
        for (k, v) in entries.iter().rev() {
            reversed.insert(k.clone(), Value::String(v.clone()));
        }
        let a = content_hash(&CanonicalBytes::new(&Value::Object(forward)).unwrap());
        let b = content_hash(&CanonicalBytes::new(&Value::Object(reversed)).unwrap());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn reparse_is_idempotent(
        entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
    ) {
        let obj: Map<String, Value> = entries.into_iter().map(|(k, v)| (k, json!(v))).collect();
        let first = CanonicalBytes::new(&Value::Object(obj)).unwrap();
        let second = CanonicalBytes::from_json_str(first.as_str()).unwrap();
        prop_assert_eq!(first, second);
    }
}
