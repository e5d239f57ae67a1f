//! PostgreSQL-backed `LoyaltyQueryRepository` implementation using Diesel ORM.
//!
//! Reads check out a pooled connection per call and never lock rows.

use async_trait::async_trait;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{ClientProgramRecord, LoyaltyQueryRepository, LoyaltyQueryRepositoryError};
use crate::domain::{
    AchievementProgress, ClientId, EngagementKey, LoyaltyProgram, LoyaltyProgramId, Partner,
    PartnerId, ProgramEngagementSummary,
};

use super::diesel_error_mapping::{DieselFailure, classify_diesel_error, pool_error_message};
use super::models::{
    AchievementRow, EngagementSummaryRow, LoyaltyProgramRow, PartnerRow, RowConversionError,
    count_from_db,
};
use super::pool::{DbPool, PoolError};
use super::schema::{
    achievement_counters, achievements, clients, engagement_summaries, loyalty_programs, partners,
    usage_counters,
};

/// Diesel-backed implementation of the `LoyaltyQueryRepository` port.
#[derive(Clone)]
pub struct DieselLoyaltyQueryRepository {
    pool: DbPool,
}

impl DieselLoyaltyQueryRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> LoyaltyQueryRepositoryError {
    LoyaltyQueryRepositoryError::connection(pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> LoyaltyQueryRepositoryError {
    match classify_diesel_error(&error) {
        DieselFailure::Connection(message) => LoyaltyQueryRepositoryError::connection(message),
        DieselFailure::Conflict(message) | DieselFailure::Query(message) => {
            LoyaltyQueryRepositoryError::query(message)
        }
    }
}

fn map_row_error(error: RowConversionError) -> LoyaltyQueryRepositoryError {
    LoyaltyQueryRepositoryError::query(error.to_string())
}

#[async_trait]
impl LoyaltyQueryRepository for DieselLoyaltyQueryRepository {
    async fn find_partner(
        &self,
        partner_id: &PartnerId,
    ) -> Result<Option<Partner>, LoyaltyQueryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<PartnerRow> = partners::table
            .find(partner_id.as_uuid())
            .select(PartnerRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(Partner::from))
    }

    async fn client_exists(
        &self,
        client_id: &ClientId,
    ) -> Result<bool, LoyaltyQueryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(exists(clients::table.find(client_id.as_uuid())))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn find_program(
        &self,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<LoyaltyProgram>, LoyaltyQueryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<LoyaltyProgramRow> = loyalty_programs::table
            .find(program_id.as_uuid())
            .select(LoyaltyProgramRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(LoyaltyProgram::try_from)
            .transpose()
            .map_err(map_row_error)
    }

    async fn list_partner_programs(
        &self,
        partner_id: &PartnerId,
    ) -> Result<Vec<LoyaltyProgram>, LoyaltyQueryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<LoyaltyProgramRow> = loyalty_programs::table
            .filter(loyalty_programs::partner_id.eq(partner_id.as_uuid()))
            .order((loyalty_programs::title.asc(), loyalty_programs::id.asc()))
            .select(LoyaltyProgramRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter()
            .map(LoyaltyProgram::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_row_error)
    }

    async fn find_usage_count(
        &self,
        client_id: &ClientId,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<u32>, LoyaltyQueryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let stored: Option<i32> = usage_counters::table
            .find((client_id.as_uuid(), program_id.as_uuid()))
            .select(usage_counters::usage_count)
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        stored
            .map(|value| count_from_db("usage_count", value))
            .transpose()
            .map_err(map_row_error)
    }

    async fn list_client_programs(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<ClientProgramRecord>, LoyaltyQueryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(i32, LoyaltyProgramRow, PartnerRow)> = usage_counters::table
            .inner_join(loyalty_programs::table.inner_join(partners::table))
            .filter(usage_counters::client_id.eq(client_id.as_uuid()))
            .order((partners::name.asc(), loyalty_programs::title.asc()))
            .select((
                usage_counters::usage_count,
                LoyaltyProgramRow::as_select(),
                PartnerRow::as_select(),
            ))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter()
            .map(|(count, program, partner)| {
                Ok(ClientProgramRecord {
                    partner: Partner::from(partner),
                    program: LoyaltyProgram::try_from(program)?,
                    count: count_from_db("usage_count", count)?,
                })
            })
            .collect::<Result<Vec<_>, RowConversionError>>()
            .map_err(map_row_error)
    }

    async fn list_achievement_progress(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<AchievementProgress>, LoyaltyQueryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(AchievementRow, i32)> = achievement_counters::table
            .inner_join(achievements::table)
            .filter(achievement_counters::client_id.eq(client_id.as_uuid()))
            .order(achievements::title.asc())
            .select((AchievementRow::as_select(), achievement_counters::progress_count))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter()
            .map(|(achievement, progress)| {
                Ok(AchievementProgress {
                    title: achievement.title,
                    target: count_from_db("target", achievement.target)?,
                    count: count_from_db("progress_count", progress)?,
                })
            })
            .collect::<Result<Vec<_>, RowConversionError>>()
            .map_err(map_row_error)
    }

    async fn find_engagement_summary(
        &self,
        key: &EngagementKey,
    ) -> Result<Option<ProgramEngagementSummary>, LoyaltyQueryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<EngagementSummaryRow> = engagement_summaries::table
            .find((
                key.partner_id.as_uuid(),
                key.client_id.as_uuid(),
                key.program_id.as_uuid(),
            ))
            .select(EngagementSummaryRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(ProgramEngagementSummary::from))
    }
}
