//! Payload hashing and canonicalisation helpers.

use std::fmt;

use sha2::{Digest, Sha256};

/// Errors raised while building a [`PayloadHash`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadHashError {
    /// The byte slice had an incorrect length.
    #[error("payload hash must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        actual: usize,
    },
    /// Failed to serialise the canonical JSON payload.
    #[error("failed to serialise canonical JSON payload: {message}")]
    Serialization {
        /// Description of the serialisation failure.
        message: String,
    },
}

/// SHA-256 hash of a canonicalised scan payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadHash([u8; 32]);

impl PayloadHash {
    /// Construct a [`PayloadHash`] from bytes loaded from storage.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadHashError::InvalidLength`] unless the slice is exactly
    /// 32 bytes long.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, PayloadHashError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PayloadHashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Access the raw hash bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode the hash as lowercase hexadecimal.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Canonicalise a JSON payload and compute its SHA-256 hash.
///
/// Object keys are sorted recursively and the value is serialised without
/// whitespace, so semantically equal payloads hash identically.
///
/// # Example
///
/// ```
/// # use loyalty_backend::domain::idempotency::canonicalize_and_hash;
/// # use serde_json::json;
/// let a = canonicalize_and_hash(&json!({"b": 2, "a": 1})).expect("hash A");
/// let b = canonicalize_and_hash(&json!({"a": 1, "b": 2})).expect("hash B");
/// assert_eq!(a, b);
/// ```
pub fn canonicalize_and_hash(value: &serde_json::Value) -> Result<PayloadHash, PayloadHashError> {
    let bytes = serde_json::to_vec(&canonicalize(value)).map_err(|err| {
        PayloadHashError::Serialization {
            message: err.to_string(),
        }
    })?;
    Ok(PayloadHash(Sha256::digest(&bytes).into()))
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(key, _)| key.as_str());
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(key, nested)| (key.clone(), canonicalize(nested)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}
