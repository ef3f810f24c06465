#![forbid(unsafe_code)]

//! Canonical byte form of certificate payloads.
//!
//! Convention, fixed for every signer and verifier:
//! - the top-level `signature` member is removed before encoding;
//! - object members are sorted by key (byte order), recursively; arrays keep
//!   their order;
//! - compact JSON: `,` between members, `:` between key and value, no
//!   whitespace;
//! - strings are UTF-8 with only the escapes JSON requires;
//! - integers are printed in base 10 without exponent, other numbers as the
//!   shortest representation that round-trips the `f64`.

use certiwipe_contracts::certificate::SIGNATURE_FIELD;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    #[error("certificate payload must be a JSON object")]
    NotAnObject,
    #[error("certificate payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Bytes that are hashed and signed. Excludes `signature`.
pub fn canonicalize(payload: &Value) -> Result<Vec<u8>, CanonicalError> {
    let Value::Object(map) = payload else {
        return Err(CanonicalError::NotAnObject);
    };
    let mut working = map.clone();
    working.remove(SIGNATURE_FIELD);
    encode_sorted(Value::Object(working))
}

pub fn canonicalize_serializable(payload: &impl Serialize) -> Result<Vec<u8>, CanonicalError> {
    let value = serde_json::to_value(payload)?;
    canonicalize(&value)
}

/// Bytes uploaded to the content-addressed store. Same rules, `signature` kept.
pub fn encode_stored_artifact(signed: &Value) -> Result<Vec<u8>, CanonicalError> {
    if !signed.is_object() {
        return Err(CanonicalError::NotAnObject);
    }
    encode_sorted(signed.clone())
}

pub fn canonical_digest(payload: &Value) -> Result<[u8; 32], CanonicalError> {
    let bytes = canonicalize(payload)?;
    Ok(sha256(&bytes))
}

pub fn canonical_digest_hex(payload: &Value) -> Result<String, CanonicalError> {
    Ok(hex::encode(canonical_digest(payload)?))
}

pub(crate) fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

fn encode_sorted(value: Value) -> Result<Vec<u8>, CanonicalError> {
    Ok(serde_json::to_vec(&sort_json(value))?)
}

fn sort_json(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            let mut sorted = Map::new();
            for (k, val) in entries {
                sorted.insert(k, sort_json(val));
            }
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json).collect()),
        other => other,
    }
}
