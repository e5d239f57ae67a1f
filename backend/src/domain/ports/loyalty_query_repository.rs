//! Port for read-only loyalty lookups.
//!
//! Reads run outside any scan unit of work; they observe committed state
//! only.

use async_trait::async_trait;

use crate::domain::{
    AchievementProgress, ClientId, EngagementKey, LoyaltyProgram, LoyaltyProgramId, Partner,
    PartnerId, ProgramEngagementSummary,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by loyalty query repository adapters.
    pub enum LoyaltyQueryRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "loyalty query repository connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } =>
            "loyalty query repository query failed: {message}",
    }
}

/// Program joined with its partner and the client's count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProgramRecord {
    /// Partner running the program.
    pub partner: Partner,
    /// The program.
    pub program: LoyaltyProgram,
    /// Client's current count.
    pub count: u32,
}

/// Read access to loyalty state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoyaltyQueryRepository: Send + Sync {
    /// Fetch a partner.
    async fn find_partner(
        &self,
        partner_id: &PartnerId,
    ) -> Result<Option<Partner>, LoyaltyQueryRepositoryError>;

    /// Whether the client exists.
    async fn client_exists(&self, client_id: &ClientId)
    -> Result<bool, LoyaltyQueryRepositoryError>;

    /// Fetch a program.
    async fn find_program(
        &self,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<LoyaltyProgram>, LoyaltyQueryRepositoryError>;

    /// Programs run by a partner, ordered by title.
    async fn list_partner_programs(
        &self,
        partner_id: &PartnerId,
    ) -> Result<Vec<LoyaltyProgram>, LoyaltyQueryRepositoryError>;

    /// The client's usage count for a program, `None` before the first scan.
    async fn find_usage_count(
        &self,
        client_id: &ClientId,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<u32>, LoyaltyQueryRepositoryError>;

    /// Every program the client holds a usage counter for.
    async fn list_client_programs(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<ClientProgramRecord>, LoyaltyQueryRepositoryError>;

    /// The client's achievement counters joined with their definitions.
    async fn list_achievement_progress(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<AchievementProgress>, LoyaltyQueryRepositoryError>;

    /// Fetch an engagement summary.
    async fn find_engagement_summary(
        &self,
        key: &EngagementKey,
    ) -> Result<Option<ProgramEngagementSummary>, LoyaltyQueryRepositoryError>;
}

/// Fixture implementation for testing without a real database.
///
/// Lookups return nothing and listings are empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureLoyaltyQueryRepository;

#[async_trait]
impl LoyaltyQueryRepository for FixtureLoyaltyQueryRepository {
    async fn find_partner(
        &self,
        _partner_id: &PartnerId,
    ) -> Result<Option<Partner>, LoyaltyQueryRepositoryError> {
        Ok(None)
    }

    async fn client_exists(
        &self,
        _client_id: &ClientId,
    ) -> Result<bool, LoyaltyQueryRepositoryError> {
        Ok(false)
    }

    async fn find_program(
        &self,
        _program_id: &LoyaltyProgramId,
    ) -> Result<Option<LoyaltyProgram>, LoyaltyQueryRepositoryError> {
        Ok(None)
    }

    async fn list_partner_programs(
        &self,
        _partner_id: &PartnerId,
    ) -> Result<Vec<LoyaltyProgram>, LoyaltyQueryRepositoryError> {
        Ok(Vec::new())
    }

    async fn find_usage_count(
        &self,
        _client_id: &ClientId,
        _program_id: &LoyaltyProgramId,
    ) -> Result<Option<u32>, LoyaltyQueryRepositoryError> {
        Ok(None)
    }

    async fn list_client_programs(
        &self,
        _client_id: &ClientId,
    ) -> Result<Vec<ClientProgramRecord>, LoyaltyQueryRepositoryError> {
        Ok(Vec::new())
    }

    async fn list_achievement_progress(
        &self,
        _client_id: &ClientId,
    ) -> Result<Vec<AchievementProgress>, LoyaltyQueryRepositoryError> {
        Ok(Vec::new())
    }

    async fn find_engagement_summary(
        &self,
        _key: &EngagementKey,
    ) -> Result<Option<ProgramEngagementSummary>, LoyaltyQueryRepositoryError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_repository_knows_nothing() {
        let repo = FixtureLoyaltyQueryRepository;
        let client_id = ClientId::random();

        assert!(!repo.client_exists(&client_id).await.expect("lookup"));
        assert!(
            repo.list_client_programs(&client_id)
                .await
                .expect("listing")
                .is_empty()
        );
    }

    #[test]
    fn query_error_formats_message() {
        let error = LoyaltyQueryRepositoryError::query("timeout");
        assert_eq!(
            error.to_string(),
            "loyalty query repository query failed: timeout"
        );
    }
}
