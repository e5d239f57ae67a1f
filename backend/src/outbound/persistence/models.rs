//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. Counts are stored as `INTEGER` and
//! converted to `u32` here.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::idempotency::{
    IdempotencyKey, ParseScanMutationError, PayloadHash, PayloadHashError, ScanMutation,
    ScanReceipt,
};
use crate::domain::{
    AchievementDefinition, AchievementId, ClientId, LoyaltyProgram, LoyaltyProgramId,
    LoyaltyValidationError, Partner, PartnerId, ProgramEngagementSummary,
};

use super::schema::{
    achievement_counters, achievements, engagement_summaries, loyalty_programs, partners,
    scan_idempotency_keys, scan_stat_events, usage_counters,
};

/// Errors raised when a stored row violates a domain invariant.
#[derive(Debug, thiserror::Error)]
pub(crate) enum RowConversionError {
    #[error("{column} out of range in database: {value}")]
    CountOutOfRange { column: &'static str, value: i64 },
    #[error("invalid loyalty program in database: {0}")]
    Program(#[from] LoyaltyValidationError),
    #[error("corrupted payload hash in database: {0}")]
    PayloadHash(#[from] PayloadHashError),
    #[error("invalid mutation type in database: {0}")]
    Mutation(#[from] ParseScanMutationError),
}

/// Convert a stored `INTEGER` count into a domain count.
pub(crate) fn count_from_db(column: &'static str, value: i32) -> Result<u32, RowConversionError> {
    u32::try_from(value).map_err(|_| RowConversionError::CountOutOfRange {
        column,
        value: i64::from(value),
    })
}

/// Convert a domain count into its `INTEGER` column value.
pub(crate) fn count_to_db(column: &'static str, value: u32) -> Result<i32, RowConversionError> {
    i32::try_from(value).map_err(|_| RowConversionError::CountOutOfRange {
        column,
        value: i64::from(value),
    })
}

// ---------------------------------------------------------------------------
// Identity rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = partners)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PartnerRow {
    pub id: Uuid,
    pub name: String,
}

impl From<PartnerRow> for Partner {
    fn from(row: PartnerRow) -> Self {
        Self {
            id: PartnerId::from_uuid(row.id),
            name: row.name,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = loyalty_programs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct LoyaltyProgramRow {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub title: String,
    pub target: i32,
}

impl TryFrom<LoyaltyProgramRow> for LoyaltyProgram {
    type Error = RowConversionError;

    fn try_from(row: LoyaltyProgramRow) -> Result<Self, Self::Error> {
        Ok(LoyaltyProgram::new(
            LoyaltyProgramId::from_uuid(row.id),
            PartnerId::from_uuid(row.partner_id),
            row.title,
            count_from_db("target", row.target)?,
        )?)
    }
}

// ---------------------------------------------------------------------------
// Usage counters and statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = usage_counters)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UsageCounterRow {
    pub client_id: Uuid,
    pub loyalty_program_id: Uuid,
    pub usage_count: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = usage_counters)]
pub(crate) struct NewUsageCounterRow {
    pub client_id: Uuid,
    pub loyalty_program_id: Uuid,
    pub usage_count: i32,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = usage_counters)]
pub(crate) struct UsageCounterUpdate {
    pub usage_count: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = scan_stat_events)]
pub(crate) struct NewScanStatEventRow<'a> {
    pub partner_id: Uuid,
    pub loyalty_program_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub kind: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = engagement_summaries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct EngagementSummaryRow {
    pub partner_id: Uuid,
    pub client_id: Uuid,
    pub loyalty_program_id: Uuid,
    pub started: bool,
    pub returned: bool,
    pub finished: bool,
}

/// Only the flags change once a summary exists.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = engagement_summaries)]
pub(crate) struct EngagementSummaryUpdate {
    pub started: bool,
    pub returned: bool,
    pub finished: bool,
}

impl From<EngagementSummaryRow> for ProgramEngagementSummary {
    fn from(row: EngagementSummaryRow) -> Self {
        Self {
            partner_id: PartnerId::from_uuid(row.partner_id),
            client_id: ClientId::from_uuid(row.client_id),
            program_id: LoyaltyProgramId::from_uuid(row.loyalty_program_id),
            started: row.started,
            returned: row.returned,
            finished: row.finished,
        }
    }
}

impl From<&ProgramEngagementSummary> for EngagementSummaryRow {
    fn from(summary: &ProgramEngagementSummary) -> Self {
        Self {
            partner_id: *summary.partner_id.as_uuid(),
            client_id: *summary.client_id.as_uuid(),
            loyalty_program_id: *summary.program_id.as_uuid(),
            started: summary.started,
            returned: summary.returned,
            finished: summary.finished,
        }
    }
}

// ---------------------------------------------------------------------------
// Achievements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = achievements)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AchievementRow {
    pub id: Uuid,
    pub title: String,
    pub target: i32,
}

impl TryFrom<AchievementRow> for AchievementDefinition {
    type Error = RowConversionError;

    fn try_from(row: AchievementRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: AchievementId::from_uuid(row.id),
            title: row.title,
            target: count_from_db("target", row.target)?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = achievement_counters)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AchievementCounterRow {
    pub client_id: Uuid,
    pub achievement_id: Uuid,
    pub progress_count: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = achievement_counters)]
pub(crate) struct NewAchievementCounterRow {
    pub client_id: Uuid,
    pub achievement_id: Uuid,
    pub progress_count: i32,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = achievement_counters)]
pub(crate) struct AchievementCounterUpdate {
    pub progress_count: i32,
}

// ---------------------------------------------------------------------------
// Scan receipts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = scan_idempotency_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ScanReceiptRow {
    pub key: Uuid,
    pub partner_id: Uuid,
    pub mutation_type: String,
    pub payload_hash: Vec<u8>,
    pub response_snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ScanReceiptRow> for ScanReceipt {
    type Error = RowConversionError;

    fn try_from(row: ScanReceiptRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key: IdempotencyKey::from_uuid(row.key),
            partner_id: PartnerId::from_uuid(row.partner_id),
            mutation: row.mutation_type.parse::<ScanMutation>()?,
            payload_hash: PayloadHash::try_from_bytes(&row.payload_hash)?,
            response_snapshot: row.response_snapshot,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = scan_idempotency_keys)]
pub(crate) struct NewScanReceiptRow<'a> {
    pub key: Uuid,
    pub partner_id: Uuid,
    pub mutation_type: &'a str,
    pub payload_hash: &'a [u8],
    pub response_snapshot: &'a serde_json::Value,
    pub created_at: DateTime<Utc>,
}
