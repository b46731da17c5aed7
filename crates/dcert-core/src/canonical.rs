//! # Canonical Serialization
//!
//! This module defines [`CanonicalBytes`], the sole construction path for the
//! bytes that are hashed into a certificate's content hash.
//!
//! ## Security Invariant
//!
//! The inner `Vec<u8>` is private. The only way to construct `CanonicalBytes`
//! is through [`CanonicalBytes::new()`] (or [`CanonicalBytes::from_json_str()`],
//! which parses and then goes through the same pipeline). A payload can
//! therefore never be hashed over an ad-hoc serialization that a third-party
//! verifier could not reproduce.
//!
//! ## Coercion Rules
//!
//! 1. Reject floats. Dates and amounts must be strings or integers.
//! 2. Normalize RFC 3339 datetimes to UTC with `Z` suffix, truncated to seconds.
//! 3. Sort object keys lexicographically (by UTF-8 bytes), at every depth.
//! 4. Use compact separators (no whitespace).
//!
//! Every rule is idempotent: canonicalizing the parsed form of canonical
//! bytes yields the same bytes. Verification relies on this.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        let coerced = coerce_json_value(value)?;
        let mut out = Vec::new();
        write_canonical(&coerced, &mut out)?;
        Ok(Self(out))
    }

    /// Parse a JSON document and canonicalize it.
    pub fn from_json_str(json: &str) -> Result<Self, CanonicalizationError> {
        let value: Value = serde_json::from_str(json)?;
        Self::new(&value)
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the inner byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// View the canonical bytes as a JSON string.
    ///
    /// Always succeeds: the serializer only ever emits UTF-8.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Recursively coerce JSON values according to the canonicalization rules.
fn coerce_json_value(value: Value) -> Result<Value, CanonicalizationError> {
    match value {
        Value::Number(n) => {
            if n.is_f64() {
                return Err(CanonicalizationError::FloatRejected(
                    n.as_f64().unwrap_or(f64::NAN),
                ));
            }
            Ok(Value::Number(n))
        }
        Value::Object(map) => {
            let mut coerced = serde_json::Map::new();
            for (k, v) in map {
                coerced.insert(k, coerce_json_value(v)?);
            }
            Ok(Value::Object(coerced))
        }
        Value::Array(arr) => {
            let coerced: Result<Vec<_>, _> = arr.into_iter().map(coerce_json_value).collect();
            Ok(Value::Array(coerced?))
        }
        Value::String(s) => {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&s) {
                let utc = dt.with_timezone(&chrono::Utc);
                Ok(Value::String(utc.format("%Y-%m-%dT%H:%M:%SZ").to_string()))
            } else {
                Ok(Value::String(s))
            }
        }
        other => Ok(other),
    }
}

/// Write a JSON value with explicitly sorted keys and compact separators.
///
/// Key order is enforced here rather than inherited from `serde_json::Map`,
/// whose ordering depends on the `preserve_order` feature of whichever crate
/// in the build graph enables it.
fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), CanonicalizationError> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push(b'{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, k)?;
                out.push(b':');
                write_canonical(v, out)?;
            }
            out.push(b'}');
        }
        Value::Array(arr) => {
            out.push(b'[');
            for (i, v) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(v, out)?;
            }
            out.push(b']');
        }
        scalar => {
            serde_json::to_writer(&mut *out, scalar)?;
        }
    }
    Ok(())
}
