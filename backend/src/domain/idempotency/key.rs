//! Idempotency key validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validation errors for [`IdempotencyKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdempotencyKeyValidationError {
    /// The key string was empty.
    #[error("idempotency key must not be empty")]
    EmptyKey,
    /// The key string was not a valid UUID.
    #[error("idempotency key must be a valid UUID")]
    InvalidKey,
}

/// Terminal-provided key identifying one physical scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Validate and construct an [`IdempotencyKey`] from a string.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyKeyValidationError::EmptyKey`] for empty input and
    /// [`IdempotencyKeyValidationError::InvalidKey`] for anything that is not
    /// a canonical UUID without surrounding whitespace.
    ///
    /// # Example
    ///
    /// ```
    /// # use loyalty_backend::domain::idempotency::IdempotencyKey;
    /// let key = IdempotencyKey::new("550e8400-e29b-41d4-a716-446655440000")
    ///     .expect("valid UUID");
    /// assert_eq!(key.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    /// ```
    pub fn new(key: impl AsRef<str>) -> Result<Self, IdempotencyKeyValidationError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(IdempotencyKeyValidationError::EmptyKey);
        }
        if key.trim() != key {
            return Err(IdempotencyKeyValidationError::InvalidKey);
        }
        Uuid::parse_str(key)
            .map(Self)
            .map_err(|_| IdempotencyKeyValidationError::InvalidKey)
    }

    /// Construct a key from a UUID loaded from storage.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a random key. Primarily useful for tests and the CLI.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn accepts_canonical_uuid() {
        let key = IdempotencyKey::new("550e8400-e29b-41d4-a716-446655440000").expect("valid");
        assert_eq!(key.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[rstest]
    fn rejects_empty_string() {
        assert_eq!(
            IdempotencyKey::new(""),
            Err(IdempotencyKeyValidationError::EmptyKey)
        );
    }

    #[rstest]
    #[case("not-a-uuid")]
    #[case("550e8400-e29b-41d4-a716")]
    #[case(" 550e8400-e29b-41d4-a716-446655440000")]
    #[case("550e8400-e29b-41d4-a716-446655440000 ")]
    fn rejects_invalid_format(#[case] input: &str) {
        assert_eq!(
            IdempotencyKey::new(input),
            Err(IdempotencyKeyValidationError::InvalidKey)
        );
    }
}
