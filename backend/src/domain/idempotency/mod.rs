//! Idempotency primitives for deduplicating physical scans.
//!
//! A point-of-sale terminal attaches an [`IdempotencyKey`] to every physical
//! scan. Network retries carrying the same key replay the stored
//! [`ScanReceipt`] instead of counting the scan twice.
//!
//! - [`IdempotencyKey`]: validated UUID chosen by the terminal.
//! - [`PayloadHash`]: SHA-256 of the canonicalised request payload, used to
//!   detect a key reused for a different scan.
//! - [`ScanMutation`]: discriminator scoping keys per operation.
//! - [`ScanReceipt`]: stored record replayed on retries.
//! - [`IdempotencyConfig`]: receipt time-to-live.

mod config;
mod key;
mod mutation;
mod payload;
mod receipt;

pub use config::IdempotencyConfig;
pub use key::{IdempotencyKey, IdempotencyKeyValidationError};
pub use mutation::{ParseScanMutationError, ScanMutation};
pub use payload::{PayloadHash, PayloadHashError, canonicalize_and_hash};
pub use receipt::{ReceiptLookup, ScanReceipt};
