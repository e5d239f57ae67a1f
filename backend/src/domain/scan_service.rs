//! Scan orchestration.
//!
//! [`ScanService`] implements [`ScanCommand`]. Each scan resolves identities
//! first, then runs ledger, statistics and achievement updates inside one
//! [`ScanUnitOfWork`], committing only when every step succeeded.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::json;
use tracing::{error, info, warn};

use super::idempotency::{
    IdempotencyConfig, IdempotencyKey, PayloadHash, ReceiptLookup, ScanMutation, ScanReceipt,
    canonicalize_and_hash,
};
use super::ports::{
    IdentityDirectory, IdentityDirectoryError, ScanCommand, ScanRequest, ScanResponse, ScanStore,
    ScanStoreError, ScanUnitOfWork,
};
use super::{
    AchievementBindings, AchievementEvent, AchievementTracker, EngagementKey, IncrementOutcome,
    LoyaltyProgram, PartnerId, RedemptionOutcome, ScanEntity, ScanError, StatRecorder, UsageLedger,
};

/// Default number of attempts for a scan that keeps hitting write conflicts.
pub const DEFAULT_MAX_SCAN_ATTEMPTS: u32 = 3;

/// Retry and replay settings for [`ScanService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    max_attempts: u32,
    idempotency: IdempotencyConfig,
}

impl ScanPolicy {
    /// Create a policy. `max_attempts` is raised to at least one.
    pub fn new(max_attempts: u32, idempotency: IdempotencyConfig) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            idempotency,
        }
    }

    /// Attempts made before giving up on write conflicts.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Receipt retention settings.
    pub const fn idempotency(&self) -> IdempotencyConfig {
        self.idempotency
    }
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SCAN_ATTEMPTS, IdempotencyConfig::default())
    }
}

/// Scan service implementing the [`ScanCommand`] driving port.
#[derive(Clone)]
pub struct ScanService<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    clock: Arc<dyn Clock>,
    ledger: UsageLedger,
    stats: StatRecorder,
    achievements: AchievementTracker,
    policy: ScanPolicy,
}

impl<S, D> ScanService<S, D> {
    /// Create a service with the default [`ScanPolicy`].
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        bindings: Arc<AchievementBindings>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            ledger: UsageLedger,
            stats: StatRecorder,
            achievements: AchievementTracker::new(bindings),
            policy: ScanPolicy::default(),
        }
    }

    /// Replace the retry and replay policy.
    pub fn with_policy(mut self, policy: ScanPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Failure of a single attempt.
enum AttemptError {
    /// A concurrent writer won; the whole attempt may be repeated.
    Retryable(ScanStoreError),
    /// The scan failed for good.
    Fatal(ScanError),
}

impl From<ScanError> for AttemptError {
    fn from(value: ScanError) -> Self {
        Self::Fatal(value)
    }
}

impl From<ScanStoreError> for AttemptError {
    fn from(value: ScanStoreError) -> Self {
        if value.is_retryable() {
            return Self::Retryable(value);
        }
        error!(error = %value, "scan store failure");
        Self::Fatal(ScanError::storage(value.to_string()))
    }
}

/// Work done by a successful attempt.
enum Applied {
    /// The scan was applied; commit.
    Fresh(ScanResponse),
    /// A stored receipt was replayed; nothing to commit.
    Replayed(ScanResponse),
}

fn map_directory_error(error: IdentityDirectoryError) -> ScanError {
    error!(error = %error, "identity directory failure");
    ScanError::storage(error.to_string())
}

impl<S, D> ScanService<S, D>
where
    S: ScanStore,
    D: IdentityDirectory,
{
    async fn resolve_program(&self, request: &ScanRequest) -> Result<LoyaltyProgram, ScanError> {
        if !self
            .directory
            .partner_exists(&request.partner_id)
            .await
            .map_err(map_directory_error)?
        {
            return Err(ScanError::not_found(ScanEntity::Partner, request.partner_id));
        }
        if !self
            .directory
            .client_exists(&request.client_id)
            .await
            .map_err(map_directory_error)?
        {
            return Err(ScanError::not_found(ScanEntity::Client, request.client_id));
        }
        self.directory
            .find_program(&request.program_id)
            .await
            .map_err(map_directory_error)?
            .filter(|program| program.belongs_to(&request.partner_id))
            .ok_or_else(|| ScanError::not_found(ScanEntity::LoyaltyProgram, request.program_id))
    }

    fn payload_hash(request: &ScanRequest) -> Result<PayloadHash, ScanError> {
        let payload = json!({
            "clientId": request.client_id,
            "programId": request.program_id,
        });
        canonicalize_and_hash(&payload).map_err(|err| ScanError::storage(err.to_string()))
    }

    async fn execute(
        &self,
        mutation: ScanMutation,
        request: ScanRequest,
    ) -> Result<ScanResponse, ScanError> {
        let program = self.resolve_program(&request).await?;
        let guard = match request.idempotency_key {
            Some(key) => Some((key, Self::payload_hash(&request)?)),
            None => None,
        };

        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;
        loop {
            match self
                .attempt(mutation, &request, &program, guard.as_ref())
                .await
            {
                Ok(response) => {
                    if guard.is_some() && !response.replayed {
                        self.sweep_expired_receipts().await;
                    }
                    info!(
                        mutation = %mutation,
                        partner_id = %request.partner_id,
                        client_id = %request.client_id,
                        program_id = %request.program_id,
                        count = response.count,
                        replayed = response.replayed,
                        attempt,
                        "scan applied"
                    );
                    return Ok(response);
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retryable(err)) if attempt < max_attempts => {
                    warn!(
                        mutation = %mutation,
                        client_id = %request.client_id,
                        program_id = %request.program_id,
                        attempt,
                        error = %err,
                        "scan hit a write conflict; retrying"
                    );
                    attempt += 1;
                }
                Err(AttemptError::Retryable(err)) => {
                    warn!(
                        mutation = %mutation,
                        client_id = %request.client_id,
                        program_id = %request.program_id,
                        attempts = attempt,
                        error = %err,
                        "scan retry budget exhausted"
                    );
                    return Err(ScanError::ConflictRetryExceeded { attempts: attempt });
                }
            }
        }
    }

    async fn attempt(
        &self,
        mutation: ScanMutation,
        request: &ScanRequest,
        program: &LoyaltyProgram,
        guard: Option<&(IdempotencyKey, PayloadHash)>,
    ) -> Result<ScanResponse, AttemptError> {
        let mut uow = self.store.begin().await?;
        match self
            .run_in(uow.as_mut(), mutation, request, program, guard)
            .await
        {
            Ok(Applied::Fresh(response)) => {
                uow.commit().await?;
                Ok(response)
            }
            Ok(Applied::Replayed(response)) => {
                release(uow).await;
                Ok(response)
            }
            Err(err) => {
                release(uow).await;
                Err(err)
            }
        }
    }

    async fn run_in(
        &self,
        uow: &mut dyn ScanUnitOfWork,
        mutation: ScanMutation,
        request: &ScanRequest,
        program: &LoyaltyProgram,
        guard: Option<&(IdempotencyKey, PayloadHash)>,
    ) -> Result<Applied, AttemptError> {
        if let Some((key, hash)) = guard {
            match self
                .lookup_receipt(uow, key, &request.partner_id, mutation, hash)
                .await?
            {
                ReceiptLookup::Matching(receipt) => {
                    return Ok(Applied::Replayed(replay(receipt)?));
                }
                ReceiptLookup::Conflicting(_) => {
                    return Err(ScanError::IdempotencyConflict { key: *key }.into());
                }
                ReceiptLookup::NotFound => {}
            }
        }

        let response = match mutation {
            ScanMutation::Increment => self.increment_in(uow, request, program).await?,
            ScanMutation::Redeem => self.redeem_in(uow, request, program).await?,
        };

        if let Some((key, hash)) = guard {
            let response_snapshot = serde_json::to_value(response)
                .map_err(|err| ScanError::storage(format!("failed to serialise response: {err}")))?;
            uow.store_scan_receipt(&ScanReceipt {
                key: *key,
                partner_id: request.partner_id,
                mutation,
                payload_hash: hash.clone(),
                response_snapshot,
                created_at: self.clock.utc(),
            })
            .await?;
        }
        Ok(Applied::Fresh(response))
    }

    async fn lookup_receipt(
        &self,
        uow: &mut dyn ScanUnitOfWork,
        key: &IdempotencyKey,
        partner_id: &PartnerId,
        mutation: ScanMutation,
        hash: &PayloadHash,
    ) -> Result<ReceiptLookup, AttemptError> {
        let now = self.clock.utc();
        let ttl = self.policy.idempotency().chrono_ttl();
        let stored = uow.find_scan_receipt(key, partner_id, mutation).await?;
        let live = match stored {
            Some(receipt) if receipt.is_expired(now, ttl) => {
                uow.purge_scan_receipt(key, partner_id, mutation, self.receipt_cutoff(now))
                    .await?;
                None
            }
            other => other,
        };
        Ok(ReceiptLookup::classify(live, hash))
    }

    fn receipt_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.policy.idempotency().chrono_ttl())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Delete every receipt older than the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::StorageFailure`] when the store rejects the
    /// delete.
    pub async fn purge_expired_receipts(&self) -> Result<u64, ScanError> {
        let cutoff = self.receipt_cutoff(self.clock.utc());
        let purged = self
            .store
            .purge_expired_receipts(cutoff)
            .await
            .map_err(|err| {
                error!(error = %err, "failed to purge expired scan receipts");
                ScanError::storage(err.to_string())
            })?;
        if purged > 0 {
            info!(purged, %cutoff, "purged expired scan receipts");
        }
        Ok(purged)
    }

    // Runs after a fresh keyed scan has committed, so a failure here must not
    // surface as a failed scan.
    async fn sweep_expired_receipts(&self) {
        let cutoff = self.receipt_cutoff(self.clock.utc());
        if let Err(err) = self.store.purge_expired_receipts(cutoff).await {
            warn!(error = %err, "expired scan receipt sweep failed");
        }
    }

    async fn increment_in(
        &self,
        uow: &mut dyn ScanUnitOfWork,
        request: &ScanRequest,
        program: &LoyaltyProgram,
    ) -> Result<ScanResponse, AttemptError> {
        let transition = match self
            .ledger
            .record_increment(uow, request.client_id, program)
            .await?
        {
            IncrementOutcome::Recorded(transition) => transition,
            IncrementOutcome::LimitReached { count, target } => {
                return Err(ScanError::LimitReached { count, target }.into());
            }
        };
        self.stats
            .on_increment(uow, engagement_key(request), transition.kind, self.clock.utc())
            .await?;
        self.achievements
            .apply_event(uow, request.client_id, AchievementEvent::OnIncrement)
            .await?;
        Ok(ScanResponse::applied(
            transition.counter.count,
            program.target(),
        ))
    }

    async fn redeem_in(
        &self,
        uow: &mut dyn ScanUnitOfWork,
        request: &ScanRequest,
        program: &LoyaltyProgram,
    ) -> Result<ScanResponse, AttemptError> {
        let counter = match self
            .ledger
            .record_redemption(uow, request.client_id, program)
            .await?
        {
            RedemptionOutcome::Redeemed(counter) => counter,
            RedemptionOutcome::InsufficientUsage { count, target } => {
                return Err(ScanError::InsufficientUsage { count, target }.into());
            }
        };
        self.stats
            .on_redemption(uow, engagement_key(request), self.clock.utc())
            .await?;
        self.achievements
            .apply_event(uow, request.client_id, AchievementEvent::OnRedemption)
            .await?;
        Ok(ScanResponse::applied(counter.count, program.target()))
    }
}

fn engagement_key(request: &ScanRequest) -> EngagementKey {
    EngagementKey {
        partner_id: request.partner_id,
        client_id: request.client_id,
        program_id: request.program_id,
    }
}

fn replay(receipt: ScanReceipt) -> Result<ScanResponse, ScanError> {
    let mut response: ScanResponse = serde_json::from_value(receipt.response_snapshot)
        .map_err(|err| ScanError::storage(format!("failed to deserialise stored response: {err}")))?;
    response.replayed = true;
    Ok(response)
}

async fn release(uow: Box<dyn ScanUnitOfWork>) {
    if let Err(err) = uow.rollback().await {
        error!(error = %err, "failed to roll back scan unit of work");
    }
}

#[async_trait]
impl<S, D> ScanCommand for ScanService<S, D>
where
    S: ScanStore,
    D: IdentityDirectory,
{
    async fn increment(&self, request: ScanRequest) -> Result<ScanResponse, ScanError> {
        self.execute(ScanMutation::Increment, request).await
    }

    async fn redeem(&self, request: ScanRequest) -> Result<ScanResponse, ScanError> {
        self.execute(ScanMutation::Redeem, request).await
    }
}

#[cfg(test)]
#[path = "scan_service_tests.rs"]
mod tests;
