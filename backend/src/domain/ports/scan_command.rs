//! Driving port for point-of-sale scans.
//!
//! A partner terminal scans a client's code and either counts one usage
//! towards a loyalty program or redeems the reward once the target is met.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::idempotency::IdempotencyKey;
use crate::domain::{ClientId, LoyaltyProgramId, PartnerId, ScanError};

/// A single physical scan at a partner terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    /// Partner whose terminal performed the scan.
    pub partner_id: PartnerId,
    /// Client being scanned.
    pub client_id: ClientId,
    /// Program the scan applies to.
    pub program_id: LoyaltyProgramId,
    /// Optional idempotency key for safe retries of the same physical scan.
    pub idempotency_key: Option<IdempotencyKey>,
}

impl ScanRequest {
    /// Build a request without an idempotency key.
    pub const fn new(partner_id: PartnerId, client_id: ClientId, program_id: LoyaltyProgramId) -> Self {
        Self {
            partner_id,
            client_id,
            program_id,
            idempotency_key: None,
        }
    }

    /// Attach an idempotency key.
    pub const fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

/// Status literal returned for applied scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// The scan was applied.
    Ok,
}

/// Outcome of an applied scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    /// Always [`ScanStatus::Ok`].
    pub status: ScanStatus,
    /// Usage count after the scan.
    pub count: u32,
    /// Program target.
    pub target: u32,
    /// Whether this response was replayed from an earlier identical scan.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
}

impl ScanResponse {
    /// Response for a freshly applied scan.
    pub const fn applied(count: u32, target: u32) -> Self {
        Self {
            status: ScanStatus::Ok,
            count,
            target,
            replayed: false,
        }
    }
}

/// Driving port for scan operations.
///
/// # Idempotency
///
/// When `idempotency_key` is set, implementations replay the stored response
/// for a repeated identical scan with `replayed: true` and reject a key
/// reused for a different scan with [`ScanError::IdempotencyConflict`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScanCommand: Send + Sync {
    /// Count one usage of the client towards the program target.
    ///
    /// # Errors
    ///
    /// - [`ScanError::NotFound`] when an identity is unknown or the program is
    ///   run by another partner.
    /// - [`ScanError::LimitReached`] when the count already equals the target.
    async fn increment(&self, request: ScanRequest) -> Result<ScanResponse, ScanError>;

    /// Redeem the reward and reset the count to zero.
    ///
    /// # Errors
    ///
    /// - [`ScanError::NotFound`] as for [`ScanCommand::increment`].
    /// - [`ScanError::InsufficientUsage`] when the count is below the target.
    async fn redeem(&self, request: ScanRequest) -> Result<ScanResponse, ScanError>;
}
