//! Port answering identity lookups owned by other services.
//!
//! Partners, clients and programs are created elsewhere; the scan engine only
//! needs to know they exist and which partner runs a program.

use async_trait::async_trait;

use crate::domain::{ClientId, LoyaltyProgram, LoyaltyProgramId, PartnerId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by identity directory adapters.
    pub enum IdentityDirectoryError {
        /// Directory connection could not be established.
        Connection { message: String } =>
            "identity directory connection failed: {message}",
        /// Lookup failed during execution.
        Query { message: String } =>
            "identity directory query failed: {message}",
    }
}

/// Existence checks for the identities a scan refers to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Whether the partner exists.
    async fn partner_exists(&self, partner_id: &PartnerId) -> Result<bool, IdentityDirectoryError>;

    /// Whether the client exists.
    async fn client_exists(&self, client_id: &ClientId) -> Result<bool, IdentityDirectoryError>;

    /// Fetch a loyalty program by id.
    async fn find_program(
        &self,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<LoyaltyProgram>, IdentityDirectoryError>;
}

/// Fixture directory that knows no identities.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureIdentityDirectory;

#[async_trait]
impl IdentityDirectory for FixtureIdentityDirectory {
    async fn partner_exists(&self, _partner_id: &PartnerId) -> Result<bool, IdentityDirectoryError> {
        Ok(false)
    }

    async fn client_exists(&self, _client_id: &ClientId) -> Result<bool, IdentityDirectoryError> {
        Ok(false)
    }

    async fn find_program(
        &self,
        _program_id: &LoyaltyProgramId,
    ) -> Result<Option<LoyaltyProgram>, IdentityDirectoryError> {
        Ok(None)
    }
}
