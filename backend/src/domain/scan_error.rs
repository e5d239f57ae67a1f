//! Failures of scan operations.
//!
//! Business-rule rejections (`LimitReached`, `InsufficientUsage`) are
//! expected outcomes and leave state untouched.

use serde_json::json;

use super::{Error, ErrorCode};
use super::idempotency::IdempotencyKey;

/// Entity kinds an unresolved identity may refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEntity {
    /// Partner business.
    Partner,
    /// Client.
    Client,
    /// Loyalty program, or a program not run by the scanning partner.
    LoyaltyProgram,
}

impl ScanEntity {
    /// Lowercase name used in messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Partner => "partner",
            Self::Client => "client",
            Self::LoyaltyProgram => "loyalty program",
        }
    }
}

impl std::fmt::Display for ScanEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`ScanCommand`](super::ports::ScanCommand).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// An identity could not be resolved.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of the missing entity.
        entity: ScanEntity,
        /// Identifier that was looked up.
        id: uuid::Uuid,
    },
    /// The count already equals the target.
    #[error("usage limit reached ({count}/{target})")]
    LimitReached {
        /// Current count.
        count: u32,
        /// Program target.
        target: u32,
    },
    /// The count is below the target.
    #[error("insufficient usage for redemption ({count}/{target})")]
    InsufficientUsage {
        /// Current count.
        count: u32,
        /// Program target.
        target: u32,
    },
    /// Concurrent writers kept winning; the operator may retry the scan.
    #[error("scan could not be applied after {attempts} attempts due to concurrent updates")]
    ConflictRetryExceeded {
        /// Attempts made.
        attempts: u32,
    },
    /// The idempotency key was already used for a different scan.
    #[error("idempotency key {key} was already used for a different scan")]
    IdempotencyConflict {
        /// Reused key.
        key: IdempotencyKey,
    },
    /// Persistence failed.
    #[error("scan storage failure: {message}")]
    StorageFailure {
        /// Description of the failure.
        message: String,
    },
}

impl ScanError {
    /// Construct a [`ScanError::NotFound`].
    pub fn not_found(entity: ScanEntity, id: impl Into<uuid::Uuid>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Construct a [`ScanError::StorageFailure`].
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageFailure {
            message: message.into(),
        }
    }

    /// Error code used by outer adapters.
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::LimitReached { .. } | Self::InsufficientUsage { .. } => {
                ErrorCode::UnprocessableEntity
            }
            Self::ConflictRetryExceeded { .. } => ErrorCode::ServiceUnavailable,
            Self::IdempotencyConflict { .. } => ErrorCode::Conflict,
            Self::StorageFailure { .. } => ErrorCode::InternalError,
        }
    }
}

impl From<ScanError> for Error {
    fn from(value: ScanError) -> Self {
        let code = value.code();
        let message = value.to_string();
        let details = match value {
            ScanError::NotFound { entity, id } => json!({
                "code": "not_found",
                "entity": entity.as_str(),
                "id": id,
            }),
            ScanError::LimitReached { count, target } => json!({
                "code": "limit_reached",
                "count": count,
                "target": target,
            }),
            ScanError::InsufficientUsage { count, target } => json!({
                "code": "insufficient_usage",
                "count": count,
                "target": target,
            }),
            ScanError::ConflictRetryExceeded { attempts } => json!({
                "code": "conflict_retry_exceeded",
                "attempts": attempts,
            }),
            ScanError::IdempotencyConflict { key } => json!({
                "code": "idempotency_conflict",
                "idempotencyKey": key,
            }),
            ScanError::StorageFailure { .. } => json!({ "code": "storage_failure" }),
        };
        Error::new(code, message).with_details(details)
    }
}
