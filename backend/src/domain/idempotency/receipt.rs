//! Stored scan receipts replayed on retries.

use chrono::{DateTime, Utc};

use super::{IdempotencyKey, PayloadHash, ScanMutation};
use crate::domain::PartnerId;

/// Stored record linking an idempotency key to the scan it protected.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReceipt {
    /// Key sent by the terminal.
    pub key: IdempotencyKey,
    /// Partner whose terminal performed the scan.
    pub partner_id: PartnerId,
    /// Scan operation protected by the key.
    pub mutation: ScanMutation,
    /// Hash of the canonicalised request payload.
    pub payload_hash: PayloadHash,
    /// Snapshot of the original response.
    pub response_snapshot: serde_json::Value,
    /// When the receipt was written.
    pub created_at: DateTime<Utc>,
}

impl ScanReceipt {
    /// Whether the receipt is older than `ttl` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at >= ttl
    }
}

/// Outcome of comparing a stored receipt with an incoming request.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptLookup {
    /// No live receipt exists for the key.
    NotFound,
    /// A receipt exists and the payload matches; replay it.
    Matching(ScanReceipt),
    /// A receipt exists for a different payload.
    Conflicting(ScanReceipt),
}

impl ReceiptLookup {
    /// Classify a stored receipt against the incoming payload hash.
    pub fn classify(stored: Option<ScanReceipt>, payload_hash: &PayloadHash) -> Self {
        match stored {
            None => Self::NotFound,
            Some(receipt) if receipt.payload_hash == *payload_hash => Self::Matching(receipt),
            Some(receipt) => Self::Conflicting(receipt),
        }
    }
}
