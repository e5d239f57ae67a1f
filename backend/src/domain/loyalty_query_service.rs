//! Read-side service for usage and achievement progress.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::ports::{LoyaltyQuery, LoyaltyQueryRepository, LoyaltyQueryRepositoryError};
use super::{
    AchievementProgress, ClientId, EngagementKey, Error, LoyaltyProgramId, PartnerId,
    PartnerPrograms, ProgramEngagementSummary, ProgramUsage, UsageSnapshot,
};

/// Loyalty query service implementing the [`LoyaltyQuery`] driving port.
#[derive(Clone)]
pub struct LoyaltyQueryService<R> {
    repo: Arc<R>,
}

impl<R> LoyaltyQueryService<R> {
    /// Create a new service with the given repository.
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

fn map_repository_error(error: LoyaltyQueryRepositoryError) -> Error {
    match error {
        LoyaltyQueryRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("loyalty repository unavailable: {message}"))
        }
        LoyaltyQueryRepositoryError::Query { message } => {
            Error::internal(format!("loyalty repository error: {message}"))
        }
    }
}

fn not_found(entity: &str, id: impl std::fmt::Display) -> Error {
    Error::not_found(format!("{entity} not found")).with_details(json!({
        "code": "not_found",
        "entity": entity,
        "id": id.to_string(),
    }))
}

impl<R> LoyaltyQueryService<R>
where
    R: LoyaltyQueryRepository,
{
    async fn ensure_client(&self, client_id: &ClientId) -> Result<(), Error> {
        if self
            .repo
            .client_exists(client_id)
            .await
            .map_err(map_repository_error)?
        {
            Ok(())
        } else {
            Err(not_found("client", client_id))
        }
    }
}

#[async_trait]
impl<R> LoyaltyQuery for LoyaltyQueryService<R>
where
    R: LoyaltyQueryRepository,
{
    async fn current_usage(
        &self,
        client_id: &ClientId,
        program_id: &LoyaltyProgramId,
    ) -> Result<UsageSnapshot, Error> {
        let program = self
            .repo
            .find_program(program_id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| not_found("loyalty program", program_id))?;
        let count = self
            .repo
            .find_usage_count(client_id, program_id)
            .await
            .map_err(map_repository_error)?
            .unwrap_or(0);
        Ok(UsageSnapshot {
            count,
            target: program.target(),
        })
    }

    async fn achievement_progress(
        &self,
        client_id: &ClientId,
    ) -> Result<Vec<AchievementProgress>, Error> {
        self.ensure_client(client_id).await?;
        let mut progress = self
            .repo
            .list_achievement_progress(client_id)
            .await
            .map_err(map_repository_error)?;
        progress.sort_by(|a, b| a.title.cmp(&b.title).then(a.target.cmp(&b.target)));
        Ok(progress)
    }

    async fn partner_programs_for_client(
        &self,
        partner_id: &PartnerId,
        client_id: &ClientId,
    ) -> Result<Vec<ProgramUsage>, Error> {
        self.repo
            .find_partner(partner_id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| not_found("partner", partner_id))?;
        self.ensure_client(client_id).await?;

        let counts: HashMap<LoyaltyProgramId, u32> = self
            .repo
            .list_client_programs(client_id)
            .await
            .map_err(map_repository_error)?
            .into_iter()
            .filter(|record| record.partner.id == *partner_id)
            .map(|record| (record.program.id(), record.count))
            .collect();

        let mut programs: Vec<ProgramUsage> = self
            .repo
            .list_partner_programs(partner_id)
            .await
            .map_err(map_repository_error)?
            .into_iter()
            .map(|program| ProgramUsage {
                program_id: program.id(),
                title: program.title().to_owned(),
                target: program.target(),
                count: counts.get(&program.id()).copied().unwrap_or(0),
            })
            .collect();
        programs.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(programs)
    }

    async fn client_programs(&self, client_id: &ClientId) -> Result<Vec<PartnerPrograms>, Error> {
        self.ensure_client(client_id).await?;
        let records = self
            .repo
            .list_client_programs(client_id)
            .await
            .map_err(map_repository_error)?;

        let mut grouped: BTreeMap<(String, PartnerId), Vec<ProgramUsage>> = BTreeMap::new();
        for record in records {
            grouped
                .entry((record.partner.name, record.partner.id))
                .or_default()
                .push(ProgramUsage {
                    program_id: record.program.id(),
                    title: record.program.title().to_owned(),
                    target: record.program.target(),
                    count: record.count,
                });
        }

        Ok(grouped
            .into_iter()
            .map(|((partner_name, partner_id), mut programs)| {
                programs.sort_by(|a, b| a.title.cmp(&b.title));
                PartnerPrograms {
                    partner_id,
                    partner_name,
                    programs,
                }
            })
            .collect())
    }

    async fn engagement_summary(
        &self,
        key: &EngagementKey,
    ) -> Result<Option<ProgramEngagementSummary>, Error> {
        self.repo
            .find_engagement_summary(key)
            .await
            .map_err(map_repository_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::ports::{ClientProgramRecord, MockLoyaltyQueryRepository};
    use crate::domain::{LoyaltyProgram, Partner};

    fn make_service(repo: MockLoyaltyQueryRepository) -> LoyaltyQueryService<MockLoyaltyQueryRepository> {
        LoyaltyQueryService::new(Arc::new(repo))
    }

    fn program(partner_id: PartnerId, title: &str, target: u32) -> LoyaltyProgram {
        LoyaltyProgram::new(LoyaltyProgramId::random(), partner_id, title, target)
            .expect("valid program")
    }

    #[tokio::test]
    async fn current_usage_defaults_to_zero_before_first_scan() {
        let stored = program(PartnerId::random(), "Stamps", 5);
        let program_id = stored.id();
        let mut repo = MockLoyaltyQueryRepository::new();
        repo.expect_find_program()
            .times(1)
            .return_once(move |_| Ok(Some(stored)));
        repo.expect_find_usage_count()
            .times(1)
            .return_once(|_, _| Ok(None));

        let snapshot = make_service(repo)
            .current_usage(&ClientId::random(), &program_id)
            .await
            .expect("usage read");
        assert_eq!(snapshot, UsageSnapshot { count: 0, target: 5 });
    }

    #[tokio::test]
    async fn current_usage_for_unknown_program_is_not_found() {
        let mut repo = MockLoyaltyQueryRepository::new();
        repo.expect_find_program().times(1).return_once(|_| Ok(None));
        repo.expect_find_usage_count().never();

        let error = make_service(repo)
            .current_usage(&ClientId::random(), &LoyaltyProgramId::random())
            .await
            .expect_err("unknown program");
        assert_eq!(error.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn achievement_progress_is_ordered_by_title() {
        let mut repo = MockLoyaltyQueryRepository::new();
        repo.expect_client_exists().times(1).return_once(|_| Ok(true));
        repo.expect_list_achievement_progress()
            .times(1)
            .return_once(|_| {
                Ok(vec![
                    AchievementProgress {
                        title: "Regular".to_owned(),
                        target: 10,
                        count: 4,
                    },
                    AchievementProgress {
                        title: "Explorer".to_owned(),
                        target: 3,
                        count: 3,
                    },
                ])
            });

        let progress = make_service(repo)
            .achievement_progress(&ClientId::random())
            .await
            .expect("progress read");
        let titles: Vec<&str> = progress.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Explorer", "Regular"]);
    }

    #[tokio::test]
    async fn partner_overview_fills_missing_counts_with_zero() {
        let partner = Partner {
            id: PartnerId::random(),
            name: "Bakery".to_owned(),
        };
        let scanned = program(partner.id, "Bread", 5);
        let untouched = program(partner.id, "Cake", 3);
        let record = ClientProgramRecord {
            partner: partner.clone(),
            program: scanned.clone(),
            count: 2,
        };
        let partner_id = partner.id;

        let mut repo = MockLoyaltyQueryRepository::new();
        repo.expect_find_partner()
            .times(1)
            .return_once(move |_| Ok(Some(partner)));
        repo.expect_client_exists().times(1).return_once(|_| Ok(true));
        repo.expect_list_client_programs()
            .times(1)
            .return_once(move |_| Ok(vec![record]));
        repo.expect_list_partner_programs()
            .times(1)
            .return_once(move |_| Ok(vec![untouched, scanned]));

        let programs = make_service(repo)
            .partner_programs_for_client(&partner_id, &ClientId::random())
            .await
            .expect("overview read");
        let counts: Vec<(&str, u32)> = programs
            .iter()
            .map(|p| (p.title.as_str(), p.count))
            .collect();
        assert_eq!(counts, vec![("Bread", 2), ("Cake", 0)]);
    }

    #[tokio::test]
    async fn client_programs_are_grouped_by_partner() {
        let bakery = Partner {
            id: PartnerId::random(),
            name: "Bakery".to_owned(),
        };
        let cafe = Partner {
            id: PartnerId::random(),
            name: "Cafe".to_owned(),
        };
        let records = vec![
            ClientProgramRecord {
                partner: cafe.clone(),
                program: program(cafe.id, "Latte", 8),
                count: 1,
            },
            ClientProgramRecord {
                partner: bakery.clone(),
                program: program(bakery.id, "Rye", 5),
                count: 5,
            },
            ClientProgramRecord {
                partner: bakery.clone(),
                program: program(bakery.id, "Croissant", 6),
                count: 0,
            },
        ];

        let mut repo = MockLoyaltyQueryRepository::new();
        repo.expect_client_exists().times(1).return_once(|_| Ok(true));
        repo.expect_list_client_programs()
            .times(1)
            .return_once(move |_| Ok(records));

        let grouped = make_service(repo)
            .client_programs(&ClientId::random())
            .await
            .expect("listing read");
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].partner_name, "Bakery");
        let titles: Vec<&str> = grouped[0].programs.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Croissant", "Rye"]);
        assert_eq!(grouped[1].partner_id, cafe.id);
    }

    #[tokio::test]
    async fn unknown_client_is_not_found() {
        let mut repo = MockLoyaltyQueryRepository::new();
        repo.expect_client_exists().times(1).return_once(|_| Ok(false));

        let error = make_service(repo)
            .client_programs(&ClientId::random())
            .await
            .expect_err("unknown client");
        assert_eq!(error.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn connection_failures_map_to_service_unavailable() {
        let mut repo = MockLoyaltyQueryRepository::new();
        repo.expect_find_engagement_summary()
            .times(1)
            .return_once(|_| Err(LoyaltyQueryRepositoryError::connection("refused")));

        let key = EngagementKey {
            partner_id: PartnerId::random(),
            client_id: ClientId::random(),
            program_id: LoyaltyProgramId::random(),
        };
        let error = make_service(repo)
            .engagement_summary(&key)
            .await
            .expect_err("connection failure");
        assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
    }
}
