//! PostgreSQL-backed `ScanStore` implementation using Diesel ORM.
//!
//! Each unit of work owns a pooled connection with an open transaction.
//! Counter and summary reads use `SELECT ... FOR UPDATE`, so concurrent scans
//! for the same client and program serialise on the row. Races on lazily
//! created rows surface as unique violations, reported as
//! [`ScanStoreError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::PooledConnection;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, RunQueryDsl, TransactionManager};
use tracing::debug;

use crate::domain::idempotency::{IdempotencyKey, ScanMutation, ScanReceipt};
use crate::domain::ports::{ScanStore, ScanStoreError, ScanUnitOfWork};
use crate::domain::{
    AchievementCounter, AchievementDefinition, AchievementId, ClientId, EngagementKey,
    LoyaltyProgramId, PartnerId, ProgramEngagementSummary, ScanStatEvent, UsageCounter,
};

use super::diesel_error_mapping::{DieselFailure, classify_diesel_error, pool_error_message};
use super::models::{
    AchievementCounterRow, AchievementCounterUpdate, AchievementRow, EngagementSummaryRow,
    EngagementSummaryUpdate, NewAchievementCounterRow, NewScanReceiptRow, NewScanStatEventRow,
    NewUsageCounterRow, RowConversionError, ScanReceiptRow, UsageCounterRow, UsageCounterUpdate,
    count_from_db, count_to_db,
};
use super::pool::{DbPool, PoolError};
use super::schema::{
    achievement_counters, achievements, engagement_summaries, scan_idempotency_keys,
    scan_stat_events, usage_counters,
};

/// Diesel-backed implementation of the `ScanStore` port.
#[derive(Clone)]
pub struct DieselScanStore {
    pool: DbPool,
}

impl DieselScanStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ScanStoreError {
    ScanStoreError::connection(pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> ScanStoreError {
    match classify_diesel_error(&error) {
        DieselFailure::Conflict(message) => ScanStoreError::conflict(message),
        DieselFailure::Connection(message) => ScanStoreError::connection(message),
        DieselFailure::Query(message) => ScanStoreError::query(message),
    }
}

fn map_row_error(error: RowConversionError) -> ScanStoreError {
    ScanStoreError::query(error.to_string())
}

fn expect_single_row(updated: usize, what: &str) -> Result<(), ScanStoreError> {
    if updated == 1 {
        Ok(())
    } else {
        Err(ScanStoreError::query(format!(
            "expected to update one {what} row, updated {updated}"
        )))
    }
}

#[async_trait]
impl ScanStore for DieselScanStore {
    async fn begin(&self) -> Result<Box<dyn ScanUnitOfWork>, ScanStoreError> {
        let mut conn = self.pool.get_owned().await.map_err(map_pool_error)?;
        AnsiTransactionManager::begin_transaction(&mut *conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(Box::new(DieselUnitOfWork { conn }))
    }

    async fn purge_expired_receipts(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<u64, ScanStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(
            scan_idempotency_keys::table
                .filter(scan_idempotency_keys::created_at.le(created_before)),
        )
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        debug!(deleted, %created_before, "purged expired scan receipts");
        u64::try_from(deleted)
            .map_err(|_| ScanStoreError::query(format!("deleted row count {deleted} out of range")))
    }
}

/// Unit of work holding an open transaction on an owned connection.
///
/// A unit of work dropped without `commit` or `rollback` returns its
/// connection with the transaction still open; the pool discards such
/// connections as broken.
struct DieselUnitOfWork {
    conn: PooledConnection<'static, AsyncPgConnection>,
}

#[async_trait]
impl ScanUnitOfWork for DieselUnitOfWork {
    async fn lock_usage_counter(
        &mut self,
        client_id: &ClientId,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<UsageCounter>, ScanStoreError> {
        let row: Option<UsageCounterRow> = usage_counters::table
            .find((client_id.as_uuid(), program_id.as_uuid()))
            .select(UsageCounterRow::as_select())
            .for_update()
            .first(&mut *self.conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(|row| {
            Ok(UsageCounter {
                client_id: ClientId::from_uuid(row.client_id),
                program_id: LoyaltyProgramId::from_uuid(row.loyalty_program_id),
                count: count_from_db("usage_count", row.usage_count).map_err(map_row_error)?,
            })
        })
        .transpose()
    }

    async fn insert_usage_counter(&mut self, counter: &UsageCounter) -> Result<(), ScanStoreError> {
        let row = NewUsageCounterRow {
            client_id: *counter.client_id.as_uuid(),
            loyalty_program_id: *counter.program_id.as_uuid(),
            usage_count: count_to_db("usage_count", counter.count).map_err(map_row_error)?,
        };
        diesel::insert_into(usage_counters::table)
            .values(&row)
            .execute(&mut *self.conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn update_usage_counter(&mut self, counter: &UsageCounter) -> Result<(), ScanStoreError> {
        let changes = UsageCounterUpdate {
            usage_count: count_to_db("usage_count", counter.count).map_err(map_row_error)?,
        };
        let updated = diesel::update(
            usage_counters::table.find((counter.client_id.as_uuid(), counter.program_id.as_uuid())),
        )
        .set(&changes)
        .execute(&mut *self.conn)
        .await
        .map_err(map_diesel_error)?;
        expect_single_row(updated, "usage counter")
    }

    async fn append_scan_event(&mut self, event: &ScanStatEvent) -> Result<(), ScanStoreError> {
        let row = NewScanStatEventRow {
            partner_id: *event.partner_id.as_uuid(),
            loyalty_program_id: *event.program_id.as_uuid(),
            occurred_at: event.occurred_at,
            kind: event.kind.as_str(),
        };
        diesel::insert_into(scan_stat_events::table)
            .values(&row)
            .execute(&mut *self.conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn lock_engagement_summary(
        &mut self,
        key: &EngagementKey,
    ) -> Result<Option<ProgramEngagementSummary>, ScanStoreError> {
        let row: Option<EngagementSummaryRow> = engagement_summaries::table
            .find((
                key.partner_id.as_uuid(),
                key.client_id.as_uuid(),
                key.program_id.as_uuid(),
            ))
            .select(EngagementSummaryRow::as_select())
            .for_update()
            .first(&mut *self.conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(ProgramEngagementSummary::from))
    }

    async fn save_engagement_summary(
        &mut self,
        summary: &ProgramEngagementSummary,
    ) -> Result<(), ScanStoreError> {
        let row = EngagementSummaryRow::from(summary);
        let changes = EngagementSummaryUpdate {
            started: summary.started,
            returned: summary.returned,
            finished: summary.finished,
        };
        diesel::insert_into(engagement_summaries::table)
            .values(&row)
            .on_conflict((
                engagement_summaries::partner_id,
                engagement_summaries::client_id,
                engagement_summaries::loyalty_program_id,
            ))
            .do_update()
            .set(&changes)
            .execute(&mut *self.conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find_achievement(
        &mut self,
        achievement_id: &AchievementId,
    ) -> Result<Option<AchievementDefinition>, ScanStoreError> {
        let row: Option<AchievementRow> = achievements::table
            .find(achievement_id.as_uuid())
            .select(AchievementRow::as_select())
            .first(&mut *self.conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(AchievementDefinition::try_from)
            .transpose()
            .map_err(map_row_error)
    }

    async fn lock_achievement_counter(
        &mut self,
        client_id: &ClientId,
        achievement_id: &AchievementId,
    ) -> Result<Option<AchievementCounter>, ScanStoreError> {
        let row: Option<AchievementCounterRow> = achievement_counters::table
            .find((client_id.as_uuid(), achievement_id.as_uuid()))
            .select(AchievementCounterRow::as_select())
            .for_update()
            .first(&mut *self.conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(|row| {
            Ok(AchievementCounter {
                client_id: ClientId::from_uuid(row.client_id),
                achievement_id: AchievementId::from_uuid(row.achievement_id),
                count: count_from_db("progress_count", row.progress_count)
                    .map_err(map_row_error)?,
            })
        })
        .transpose()
    }

    async fn insert_achievement_counter(
        &mut self,
        counter: &AchievementCounter,
    ) -> Result<(), ScanStoreError> {
        let row = NewAchievementCounterRow {
            client_id: *counter.client_id.as_uuid(),
            achievement_id: *counter.achievement_id.as_uuid(),
            progress_count: count_to_db("progress_count", counter.count).map_err(map_row_error)?,
        };
        diesel::insert_into(achievement_counters::table)
            .values(&row)
            .execute(&mut *self.conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn update_achievement_counter(
        &mut self,
        counter: &AchievementCounter,
    ) -> Result<(), ScanStoreError> {
        let changes = AchievementCounterUpdate {
            progress_count: count_to_db("progress_count", counter.count).map_err(map_row_error)?,
        };
        let updated = diesel::update(
            achievement_counters::table
                .find((counter.client_id.as_uuid(), counter.achievement_id.as_uuid())),
        )
        .set(&changes)
        .execute(&mut *self.conn)
        .await
        .map_err(map_diesel_error)?;
        expect_single_row(updated, "achievement counter")
    }

    async fn find_scan_receipt(
        &mut self,
        key: &IdempotencyKey,
        partner_id: &PartnerId,
        mutation: ScanMutation,
    ) -> Result<Option<ScanReceipt>, ScanStoreError> {
        let row: Option<ScanReceiptRow> = scan_idempotency_keys::table
            .find((key.as_uuid(), partner_id.as_uuid(), mutation.as_str()))
            .select(ScanReceiptRow::as_select())
            .first(&mut *self.conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(ScanReceipt::try_from)
            .transpose()
            .map_err(map_row_error)
    }

    async fn store_scan_receipt(&mut self, receipt: &ScanReceipt) -> Result<(), ScanStoreError> {
        let row = NewScanReceiptRow {
            key: *receipt.key.as_uuid(),
            partner_id: *receipt.partner_id.as_uuid(),
            mutation_type: receipt.mutation.as_str(),
            payload_hash: receipt.payload_hash.as_bytes(),
            response_snapshot: &receipt.response_snapshot,
            created_at: receipt.created_at,
        };
        diesel::insert_into(scan_idempotency_keys::table)
            .values(&row)
            .execute(&mut *self.conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn purge_scan_receipt(
        &mut self,
        key: &IdempotencyKey,
        partner_id: &PartnerId,
        mutation: ScanMutation,
        created_before: DateTime<Utc>,
    ) -> Result<(), ScanStoreError> {
        let deleted = diesel::delete(
            scan_idempotency_keys::table
                .filter(scan_idempotency_keys::key.eq(key.as_uuid()))
                .filter(scan_idempotency_keys::partner_id.eq(partner_id.as_uuid()))
                .filter(scan_idempotency_keys::mutation_type.eq(mutation.as_str()))
                .filter(scan_idempotency_keys::created_at.le(created_before)),
        )
        .execute(&mut *self.conn)
        .await
        .map_err(map_diesel_error)?;
        debug!(deleted, key = %key, "purged expired scan receipt");
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), ScanStoreError> {
        AnsiTransactionManager::commit_transaction(&mut *self.conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), ScanStoreError> {
        AnsiTransactionManager::rollback_transaction(&mut *self.conn)
            .await
            .map_err(map_diesel_error)
    }
}
