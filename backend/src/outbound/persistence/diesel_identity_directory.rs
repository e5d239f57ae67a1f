//! PostgreSQL-backed `IdentityDirectory` implementation using Diesel ORM.

use async_trait::async_trait;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{IdentityDirectory, IdentityDirectoryError};
use crate::domain::{ClientId, LoyaltyProgram, LoyaltyProgramId, PartnerId};

use super::diesel_error_mapping::{DieselFailure, classify_diesel_error, pool_error_message};
use super::models::LoyaltyProgramRow;
use super::pool::{DbPool, PoolError};
use super::schema::{clients, loyalty_programs, partners};

/// Diesel-backed implementation of the `IdentityDirectory` port.
#[derive(Clone)]
pub struct DieselIdentityDirectory {
    pool: DbPool,
}

impl DieselIdentityDirectory {
    /// Create a new directory with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> IdentityDirectoryError {
    IdentityDirectoryError::connection(pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> IdentityDirectoryError {
    match classify_diesel_error(&error) {
        DieselFailure::Connection(message) => IdentityDirectoryError::connection(message),
        DieselFailure::Conflict(message) | DieselFailure::Query(message) => {
            IdentityDirectoryError::query(message)
        }
    }
}

#[async_trait]
impl IdentityDirectory for DieselIdentityDirectory {
    async fn partner_exists(&self, partner_id: &PartnerId) -> Result<bool, IdentityDirectoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(exists(partners::table.find(partner_id.as_uuid())))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn client_exists(&self, client_id: &ClientId) -> Result<bool, IdentityDirectoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(exists(clients::table.find(client_id.as_uuid())))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn find_program(
        &self,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<LoyaltyProgram>, IdentityDirectoryError> {
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
            .map_err(|err| IdentityDirectoryError::query(err.to_string()))
    }
}
