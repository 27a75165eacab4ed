//! Canonical-JSON content hashing, used for ApplicationRevision and Definition
//! revision identity.
//!
//! `serde_json::Value` objects are backed by a `BTreeMap` (this crate does not
//! enable the `preserve_order` feature anywhere in the workspace), so
//! serializing a `Value` already yields keys in sorted order with no
//! insignificant whitespace. Canonicalization is therefore: convert to
//! `Value`, then serialize.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hashes `value` after canonicalizing it to a `serde_json::Value`.
///
/// Two inputs that are `==` once converted to `Value` (same keys, same
/// values, independent of struct field declaration order or map insertion
/// order) hash identically.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_value(value)?;
    Ok(hash_canonical_value(&canonical))
}

/// Hashes an already-canonical `Value` directly.
pub fn hash_canonical_value(value: &serde_json::Value) -> String {
    let bytes = serde_json::to_vec(value).expect("Value serialization cannot fail");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct A {
        b: i32,
        a: i32,
    }

    #[derive(Serialize, Deserialize)]
    struct B {
        a: i32,
        b: i32,
    }

    #[test]
    fn field_order_does_not_affect_hash() {
        let a = A { b: 2, a: 1 };
        let b = B { a: 1, b: 2 };
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn different_content_hashes_differently() {
        assert_ne!(
            content_hash(&json!({"x": 1})).unwrap(),
            content_hash(&json!({"x": 2})).unwrap()
        );
    }

    #[test]
    fn hash_is_deterministic_across_calls() {
        let v = json!({"nested": {"z": 1, "a": 2}, "list": [1, 2, 3]});
        assert_eq!(content_hash(&v).unwrap(), content_hash(&v).unwrap());
    }
}
