//! End-to-end scan lifecycle against the in-memory adapters.
//!
//! Drives the public `ScanCommand` and `LoyaltyQuery` ports exactly as an
//! outer adapter would and checks counters, statistics and achievements.

use std::sync::Arc;

use loyalty_backend::domain::idempotency::IdempotencyKey;
use loyalty_backend::domain::ports::{LoyaltyQuery, ScanCommand, ScanRequest};
use loyalty_backend::domain::{
    AchievementBindings, AchievementDefinition, AchievementId, ClientId, EngagementKey,
    LoyaltyProgram, LoyaltyProgramId, LoyaltyQueryService, Partner, PartnerId, ScanError,
    ScanEventKind, ScanService,
};
use loyalty_backend::outbound::memory::InMemoryLoyaltyStore;
use mockable::{Clock, DefaultClock};
use rstest::{fixture, rstest};

const TARGET: u32 = 5;

struct World {
    store: InMemoryLoyaltyStore,
    scans: ScanService<InMemoryLoyaltyStore, InMemoryLoyaltyStore>,
    queries: LoyaltyQueryService<InMemoryLoyaltyStore>,
    partner_id: PartnerId,
    client_id: ClientId,
    program_id: LoyaltyProgramId,
    visits: AchievementId,
    rewards: AchievementId,
}

impl World {
    fn request(&self) -> ScanRequest {
        ScanRequest::new(self.partner_id, self.client_id, self.program_id)
    }

    async fn increment_times(&self, times: u32) {
        for expected in 1..=times {
            let response = self
                .scans
                .increment(self.request())
                .await
                .expect("increment below target");
            assert_eq!(response.count, expected);
        }
    }

    async fn usage(&self) -> u32 {
        self.queries
            .current_usage(&self.client_id, &self.program_id)
            .await
            .expect("usage readable")
            .count
    }

    fn engagement_key(&self) -> EngagementKey {
        EngagementKey {
            partner_id: self.partner_id,
            client_id: self.client_id,
            program_id: self.program_id,
        }
    }
}

#[fixture]
async fn world() -> World {
    let store = InMemoryLoyaltyStore::new();
    let partner_id = PartnerId::random();
    let client_id = ClientId::random();
    let program_id = LoyaltyProgramId::random();
    let visits = AchievementId::random();
    let rewards = AchievementId::random();

    store
        .insert_partner(Partner {
            id: partner_id,
            name: "Corner Cafe".to_owned(),
        })
        .await;
    store.insert_client(client_id).await;
    store
        .insert_program(
            LoyaltyProgram::new(program_id, partner_id, "Fifth coffee free", TARGET)
                .expect("valid program"),
        )
        .await;
    store
        .insert_achievement(AchievementDefinition {
            id: visits,
            title: "Regular".to_owned(),
            target: 3,
        })
        .await;
    store
        .insert_achievement(AchievementDefinition {
            id: rewards,
            title: "Collector".to_owned(),
            target: 2,
        })
        .await;

    let bindings = Arc::new(AchievementBindings::new([visits], [rewards]));
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let scans = ScanService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        bindings,
        clock,
    );
    let queries = LoyaltyQueryService::new(Arc::new(store.clone()));

    World {
        store,
        scans,
        queries,
        partner_id,
        client_id,
        program_id,
        visits,
        rewards,
    }
}

#[rstest]
#[tokio::test]
async fn increments_stop_at_the_target(#[future] world: World) {
    let world = world.await;
    world.increment_times(TARGET).await;

    let error = world
        .scans
        .increment(world.request())
        .await
        .expect_err("sixth increment must be rejected");

    assert_eq!(
        error,
        ScanError::LimitReached {
            count: TARGET,
            target: TARGET
        }
    );
    assert_eq!(world.usage().await, TARGET);
    assert_eq!(world.store.scan_events().await.len(), TARGET as usize);
}

#[rstest]
#[tokio::test]
async fn redemption_resets_the_count_and_marks_finished(#[future] world: World) {
    let world = world.await;
    world.increment_times(TARGET).await;

    let response = world
        .scans
        .redeem(world.request())
        .await
        .expect("redeem at target");

    assert_eq!(response.count, 0);
    assert_eq!(world.usage().await, 0);
    let summary = world
        .queries
        .engagement_summary(&world.engagement_key())
        .await
        .expect("summary readable")
        .expect("summary exists");
    assert!(summary.started);
    assert!(summary.finished);
    assert!(!summary.returned);

    let events = world.store.scan_events().await;
    assert_eq!(events.last().map(|event| event.kind), Some(ScanEventKind::Redeem));
    assert_eq!(
        world
            .store
            .achievement_count(world.client_id, world.rewards)
            .await,
        Some(1)
    );
}

#[rstest]
#[tokio::test]
async fn early_redemption_is_rejected_without_changes(#[future] world: World) {
    let world = world.await;
    world.increment_times(3).await;

    let error = world
        .scans
        .redeem(world.request())
        .await
        .expect_err("redeem below target");

    assert_eq!(error, ScanError::InsufficientUsage { count: 3, target: TARGET });
    assert_eq!(world.usage().await, 3);
    assert_eq!(world.store.scan_events().await.len(), 3);
    assert_eq!(
        world
            .store
            .achievement_count(world.client_id, world.rewards)
            .await,
        None
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_increments_are_not_lost(#[future] world: World) {
    let world = world.await;

    let (first, second) = tokio::join!(
        world.scans.increment(world.request()),
        world.scans.increment(world.request())
    );

    let mut counts = vec![
        first.expect("first increment").count,
        second.expect("second increment").count,
    ];
    counts.sort_unstable();
    assert_eq!(counts, vec![1, 2]);
    assert_eq!(world.usage().await, 2);
}

#[rstest]
#[tokio::test]
async fn achievement_counters_saturate_at_their_target(#[future] world: World) {
    let world = world.await;
    world.increment_times(4).await;

    let progress = world
        .queries
        .achievement_progress(&world.client_id)
        .await
        .expect("progress readable");

    assert_eq!(progress.len(), 1);
    assert_eq!(progress.first().map(|p| (p.count, p.target)), Some((3, 3)));
    assert_eq!(
        world.store.achievement_count(world.client_id, world.visits).await,
        Some(3)
    );
}

#[rstest]
#[tokio::test]
async fn returning_after_redemption_marks_returned(#[future] world: World) {
    let world = world.await;
    world.increment_times(TARGET).await;
    world.scans.redeem(world.request()).await.expect("redeem");

    let response = world
        .scans
        .increment(world.request())
        .await
        .expect("increment after redemption");

    assert_eq!(response.count, 1);
    let summary = world
        .queries
        .engagement_summary(&world.engagement_key())
        .await
        .expect("summary readable")
        .expect("summary exists");
    assert!(summary.returned);
    assert!(summary.finished);
}

#[rstest]
#[tokio::test]
async fn retried_scans_with_the_same_key_apply_once(#[future] world: World) {
    let world = world.await;
    let request = world
        .request()
        .with_idempotency_key(IdempotencyKey::random());

    let original = world.scans.increment(request).await.expect("first attempt");
    let replay = world.scans.increment(request).await.expect("retry");

    assert_eq!(original.count, 1);
    assert_eq!(replay.count, 1);
    assert!(replay.replayed);
    assert_eq!(world.usage().await, 1);
    assert_eq!(world.store.scan_events().await.len(), 1);
    assert_eq!(world.store.receipt_count().await, 1);
}

#[rstest]
#[tokio::test]
async fn partner_overview_lists_counts(#[future] world: World) {
    let world = world.await;
    world.increment_times(2).await;

    let overview = world
        .queries
        .partner_programs_for_client(&world.partner_id, &world.client_id)
        .await
        .expect("overview readable");

    assert_eq!(overview.len(), 1);
    assert_eq!(overview.first().map(|p| (p.count, p.target)), Some((2, TARGET)));

    let grouped = world
        .queries
        .client_programs(&world.client_id)
        .await
        .expect("client programs readable");
    assert_eq!(grouped.len(), 1);
    assert_eq!(
        grouped.first().map(|partner| partner.partner_name.as_str()),
        Some("Corner Cafe")
    );
}

#[rstest]
#[tokio::test]
async fn foreign_program_is_not_found(#[future] world: World) {
    let world = world.await;
    let stranger = PartnerId::random();
    world
        .store
        .insert_partner(Partner {
            id: stranger,
            name: "Bakery".to_owned(),
        })
        .await;

    let error = world
        .scans
        .increment(ScanRequest::new(stranger, world.client_id, world.program_id))
        .await
        .expect_err("program belongs to another partner");

    assert!(matches!(error, ScanError::NotFound { .. }));
    assert_eq!(world.usage().await, 0);
}
