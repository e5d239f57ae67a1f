//! Identity and read-model ports over the in-memory state.

use async_trait::async_trait;

use super::InMemoryLoyaltyStore;
use crate::domain::ports::{
    ClientProgramRecord, IdentityDirectory, IdentityDirectoryError, LoyaltyQueryRepository,
    LoyaltyQueryRepositoryError,
};
use crate::domain::{
    AchievementProgress, ClientId, EngagementKey, LoyaltyProgram, LoyaltyProgramId, Partner,
    PartnerId, ProgramEngagementSummary,
};

#[async_trait]
impl IdentityDirectory for InMemoryLoyaltyStore {
    async fn partner_exists(&self, partner_id: &PartnerId) -> Result<bool, IdentityDirectoryError> {
        Ok(self.state.lock().await.partners.contains_key(partner_id))
    }

    async fn client_exists(&self, client_id: &ClientId) -> Result<bool, IdentityDirectoryError> {
        Ok(self.state.lock().await.clients.contains(client_id))
    }

    async fn find_program(
        &self,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<LoyaltyProgram>, IdentityDirectoryError> {
        Ok(self.state.lock().await.programs.get(program_id).cloned())
    }
}

#[async_trait]
impl LoyaltyQueryRepository for InMemoryLoyaltyStore {
    async fn find_partner(
        &self,
        partner_id: &PartnerId,
    ) -> Result<Option<Partner>, LoyaltyQueryRepositoryError> {
        Ok(self.state.lock().await.partners.get(partner_id).cloned())
    }

    async fn client_exists(&self, client_id: &ClientId) -> Result<bool, LoyaltyQueryRepositoryError> {
        Ok(self.state.lock().await.clients.contains(client_id))
    }

    async fn find_program(
        &self,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<LoyaltyProgram>, LoyaltyQueryRepositoryError> {
        Ok(self.state.lock().await.programs.get(program_id).cloned())
    }

    async fn list_partner_programs(
        &self,
        partner_id: &PartnerId,
    ) -> Result<Vec<LoyaltyProgram>, LoyaltyQueryRepositoryError> {
        let state = self.state.lock().await;
        let mut programs: Vec<LoyaltyProgram> = state
            .programs
            .values()
            .filter(|program| program.belongs_to(partner_id))
            .cloned()
            .collect();
        programs.sort_by(|a, b| a.title().cmp(b.title()));
        Ok(programs)
    }

    async fn find_usage_count(
        &self,
        client_id: &ClientId,
        program_id: &LoyaltyProgramId,
    ) -> Result<Option<u32>, LoyaltyQueryRepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .usage_counts
            .get(&(*client_id, *program_id))
            .copied())
    }

    async fn list_client_programs(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<ClientProgramRecord>, LoyaltyQueryRepositoryError> {
        let state = self.state.lock().await;
        let records = state
            .usage_counts
            .iter()
            .filter(|((owner, _), _)| owner == client_id)
            .filter_map(|((_, program_id), count)| {
                let program = state.programs.get(program_id)?;
                let partner = state.partners.get(&program.partner_id())?;
                Some(ClientProgramRecord {
                    partner: partner.clone(),
                    program: program.clone(),
                    count: *count,
                })
            })
            .collect();
        Ok(records)
    }

    async fn list_achievement_progress(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<AchievementProgress>, LoyaltyQueryRepositoryError> {
        let state = self.state.lock().await;
        let progress = state
            .achievement_counts
            .iter()
            .filter(|((owner, _), _)| owner == client_id)
            .filter_map(|((_, achievement_id), count)| {
                let definition = state.achievements.get(achievement_id)?;
                Some(AchievementProgress {
                    title: definition.title.clone(),
                    target: definition.target,
                    count: *count,
                })
            })
            .collect();
        Ok(progress)
    }

    async fn find_engagement_summary(
        &self,
        key: &EngagementKey,
    ) -> Result<Option<ProgramEngagementSummary>, LoyaltyQueryRepositoryError> {
        Ok(self.state.lock().await.summaries.get(key).copied())
    }
}
