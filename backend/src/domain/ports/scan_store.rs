//! Port for transactional scan persistence.
//!
//! A scan touches the usage counter, the partner statistics, the client's
//! achievement counters and the idempotency receipt. [`ScanStore::begin`]
//! opens a [`ScanUnitOfWork`] in which all of those writes either commit
//! together or are discarded together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::idempotency::{IdempotencyKey, ScanMutation, ScanReceipt};
use crate::domain::{
    AchievementCounter, AchievementDefinition, AchievementId, ClientId, EngagementKey,
    LoyaltyProgramId, PartnerId, ProgramEngagementSummary, ScanStatEvent, UsageCounter,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by scan store adapters.
    pub enum ScanStoreError {
        /// Store connection could not be established.
        Connection { message: String } =>
            "scan store connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "scan store query failed: {message}",
        /// A concurrent writer won a race; the whole unit of work may be retried.
        Conflict { message: String } =>
            "scan store write conflict: {message}",
    }
}

impl ScanStoreError {
    /// Whether retrying the unit of work from scratch can succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Factory for scan units of work.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Open a new unit of work.
    ///
    /// Callers must finish every unit of work with
    /// [`ScanUnitOfWork::commit`] or [`ScanUnitOfWork::rollback`].
    async fn begin(&self) -> Result<Box<dyn ScanUnitOfWork>, ScanStoreError>;

    /// Delete every receipt created at or before `created_before`.
    ///
    /// Runs outside any unit of work. Returns the number of receipts removed.
    async fn purge_expired_receipts(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<u64, ScanStoreError>;
}

/// Transactional view over scan state.
///
/// `lock_*` reads hold the row (or, in memory, the whole store) until the
/// unit of work ends so read-modify-write sequences cannot interleave.
#[async_trait]
pub trait ScanUnitOfWork: Send {
    /// Read and lock the usage counter for a client and program.
    async fn lock_usage_counter(
        &mut self,
        client_id: &ClientId,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<UsageCounter>, ScanStoreError>;

    /// Create a usage counter.
    ///
    /// Returns [`ScanStoreError::Conflict`] if a concurrent scan created it
    /// first.
    async fn insert_usage_counter(&mut self, counter: &UsageCounter) -> Result<(), ScanStoreError>;

    /// Overwrite the count of an existing usage counter.
    async fn update_usage_counter(&mut self, counter: &UsageCounter) -> Result<(), ScanStoreError>;

    /// Append an event to the partner statistics log.
    async fn append_scan_event(&mut self, event: &ScanStatEvent) -> Result<(), ScanStoreError>;

    /// Read and lock the engagement summary for a partner, client and program.
    async fn lock_engagement_summary(
        &mut self,
        key: &EngagementKey,
    ) -> Result<Option<ProgramEngagementSummary>, ScanStoreError>;

    /// Insert or overwrite an engagement summary.
    async fn save_engagement_summary(
        &mut self,
        summary: &ProgramEngagementSummary,
    ) -> Result<(), ScanStoreError>;

    /// Fetch an achievement definition.
    async fn find_achievement(
        &mut self,
        achievement_id: &AchievementId,
    ) -> Result<Option<AchievementDefinition>, ScanStoreError>;

    /// Read and lock a client's counter for an achievement.
    async fn lock_achievement_counter(
        &mut self,
        client_id: &ClientId,
        achievement_id: &AchievementId,
    ) -> Result<Option<AchievementCounter>, ScanStoreError>;

    /// Create an achievement counter.
    async fn insert_achievement_counter(
        &mut self,
        counter: &AchievementCounter,
    ) -> Result<(), ScanStoreError>;

    /// Overwrite the count of an existing achievement counter.
    async fn update_achievement_counter(
        &mut self,
        counter: &AchievementCounter,
    ) -> Result<(), ScanStoreError>;

    /// Fetch the receipt stored for an idempotency key.
    async fn find_scan_receipt(
        &mut self,
        key: &IdempotencyKey,
        partner_id: &PartnerId,
        mutation: ScanMutation,
    ) -> Result<Option<ScanReceipt>, ScanStoreError>;

    /// Store a receipt.
    ///
    /// Returns [`ScanStoreError::Conflict`] if the key was stored
    /// concurrently.
    async fn store_scan_receipt(&mut self, receipt: &ScanReceipt) -> Result<(), ScanStoreError>;

    /// Remove receipts for the key created at or before `created_before`.
    async fn purge_scan_receipt(
        &mut self,
        key: &IdempotencyKey,
        partner_id: &PartnerId,
        mutation: ScanMutation,
        created_before: DateTime<Utc>,
    ) -> Result<(), ScanStoreError>;

    /// Make every write of this unit of work visible.
    async fn commit(self: Box<Self>) -> Result<(), ScanStoreError>;

    /// Discard every write of this unit of work.
    async fn rollback(self: Box<Self>) -> Result<(), ScanStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ScanStoreError::conflict("duplicate key"), true)]
    #[case(ScanStoreError::query("syntax"), false)]
    #[case(ScanStoreError::connection("refused"), false)]
    fn only_conflicts_are_retryable(#[case] error: ScanStoreError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }
}
