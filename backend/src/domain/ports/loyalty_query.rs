//! Driving port for loyalty read models.

use async_trait::async_trait;

use crate::domain::{
    AchievementProgress, ClientId, EngagementKey, Error, LoyaltyProgramId, PartnerId,
    PartnerPrograms, ProgramEngagementSummary, ProgramUsage, UsageSnapshot,
};

/// Domain use-case port for reading usage and achievement progress.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoyaltyQuery: Send + Sync {
    /// The client's count and the program target.
    ///
    /// The count is zero when the client was never scanned for the program.
    async fn current_usage(
        &self,
        client_id: &ClientId,
        program_id: &LoyaltyProgramId,
    ) -> Result<UsageSnapshot, Error>;

    /// The client's achievement counters, ordered by title.
    async fn achievement_progress(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<AchievementProgress>, Error>;

    /// Every program of the partner with the client's current count.
    async fn partner_programs_for_client(
        &self,
        partner_id: &PartnerId,
        client_id: &ClientId,
    ) -> Result<Vec<ProgramUsage>, Error>;

    /// The client's programs grouped by partner.
    async fn client_programs(&self, client_id: &ClientId) -> Result<Vec<PartnerPrograms>, Error>;

    /// Engagement flags for a partner, client and program.
    async fn engagement_summary(
        &self,
        key: &EngagementKey,
    ) -> Result<Option<ProgramEngagementSummary>, Error>;
}
