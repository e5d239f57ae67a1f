//! Staged unit of work over the in-memory state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use super::MemoryState;
use crate::domain::idempotency::{IdempotencyKey, ScanMutation, ScanReceipt};
use crate::domain::ports::{ScanStoreError, ScanUnitOfWork};
use crate::domain::{
    AchievementCounter, AchievementDefinition, AchievementId, ClientId, EngagementKey,
    LoyaltyProgramId, PartnerId, ProgramEngagementSummary, ScanStatEvent, UsageCounter,
};

pub(super) struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

impl InMemoryUnitOfWork {
    pub(super) fn new(guard: OwnedMutexGuard<MemoryState>) -> Self {
        let staged = guard.clone();
        Self { guard, staged }
    }
}

#[async_trait]
impl ScanUnitOfWork for InMemoryUnitOfWork {
    async fn lock_usage_counter(
        &mut self,
        client_id: &ClientId,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<UsageCounter>, ScanStoreError> {
        Ok(self
            .staged
            .usage_counts
            .get(&(*client_id, *program_id))
            .map(|count| UsageCounter {
                client_id: *client_id,
                program_id: *program_id,
                count: *count,
            }))
    }

    async fn insert_usage_counter(&mut self, counter: &UsageCounter) -> Result<(), ScanStoreError> {
        let key = (counter.client_id, counter.program_id);
        if self.staged.usage_counts.contains_key(&key) {
            return Err(ScanStoreError::conflict("usage counter already exists"));
        }
        self.staged.usage_counts.insert(key, counter.count);
        Ok(())
    }

    async fn update_usage_counter(&mut self, counter: &UsageCounter) -> Result<(), ScanStoreError> {
        let slot = self
            .staged
            .usage_counts
            .get_mut(&(counter.client_id, counter.program_id))
            .ok_or_else(|| ScanStoreError::query("usage counter does not exist"))?;
        *slot = counter.count;
        Ok(())
    }

    async fn append_scan_event(&mut self, event: &ScanStatEvent) -> Result<(), ScanStoreError> {
        self.staged.scan_events.push(*event);
        Ok(())
    }

    async fn lock_engagement_summary(
        &mut self,
        key: &EngagementKey,
    ) -> Result<Option<ProgramEngagementSummary>, ScanStoreError> {
        Ok(self.staged.summaries.get(key).copied())
    }

    async fn save_engagement_summary(
        &mut self,
        summary: &ProgramEngagementSummary,
    ) -> Result<(), ScanStoreError> {
        self.staged.summaries.insert(summary.key(), *summary);
        Ok(())
    }

    async fn find_achievement(
        &mut self,
        achievement_id: &AchievementId,
    ) -> Result<Option<AchievementDefinition>, ScanStoreError> {
        Ok(self.staged.achievements.get(achievement_id).cloned())
    }

    async fn lock_achievement_counter(
        &mut self,
        client_id: &ClientId,
        achievement_id: &AchievementId,
    ) -> Result<Option<AchievementCounter>, ScanStoreError> {
        Ok(self
            .staged
            .achievement_counts
            .get(&(*client_id, *achievement_id))
            .map(|count| AchievementCounter {
                client_id: *client_id,
                achievement_id: *achievement_id,
                count: *count,
            }))
    }

    async fn insert_achievement_counter(
        &mut self,
        counter: &AchievementCounter,
    ) -> Result<(), ScanStoreError> {
        let key = (counter.client_id, counter.achievement_id);
        if self.staged.achievement_counts.contains_key(&key) {
            return Err(ScanStoreError::conflict("achievement counter already exists"));
        }
        self.staged.achievement_counts.insert(key, counter.count);
        Ok(())
    }

    async fn update_achievement_counter(
        &mut self,
        counter: &AchievementCounter,
    ) -> Result<(), ScanStoreError> {
        let slot = self
            .staged
            .achievement_counts
            .get_mut(&(counter.client_id, counter.achievement_id))
            .ok_or_else(|| ScanStoreError::query("achievement counter does not exist"))?;
        *slot = counter.count;
        Ok(())
    }

    async fn find_scan_receipt(
        &mut self,
        key: &IdempotencyKey,
        partner_id: &PartnerId,
        mutation: ScanMutation,
    ) -> Result<Option<ScanReceipt>, ScanStoreError> {
        Ok(self
            .staged
            .receipts
            .get(&(*key, *partner_id, mutation))
            .cloned())
    }

    async fn store_scan_receipt(&mut self, receipt: &ScanReceipt) -> Result<(), ScanStoreError> {
        let key = (receipt.key, receipt.partner_id, receipt.mutation);
        if self.staged.receipts.contains_key(&key) {
            return Err(ScanStoreError::conflict("scan receipt already exists"));
        }
        self.staged.receipts.insert(key, receipt.clone());
        Ok(())
    }

    async fn purge_scan_receipt(
        &mut self,
        key: &IdempotencyKey,
        partner_id: &PartnerId,
        mutation: ScanMutation,
        created_before: DateTime<Utc>,
    ) -> Result<(), ScanStoreError> {
        let receipt_key = (*key, *partner_id, mutation);
        if self
            .staged
            .receipts
            .get(&receipt_key)
            .is_some_and(|receipt| receipt.created_at <= created_before)
        {
            self.staged.receipts.remove(&receipt_key);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), ScanStoreError> {
        let Self { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ScanStoreError> {
        Ok(())
    }
}
