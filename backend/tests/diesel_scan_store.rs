//! Integration tests for the Diesel scan adapters.
//!
//! Runs scans through `ScanService` over `DieselScanStore` against embedded
//! PostgreSQL, covering row locking, unique-violation retries, rollback and
//! receipt purging.

use std::sync::Arc;

use chrono::Utc;
use loyalty_backend::domain::idempotency::IdempotencyKey;
use loyalty_backend::domain::ports::{
    IdentityDirectory, LoyaltyQueryRepository, ScanCommand, ScanRequest, ScanStore,
    ScanUnitOfWork,
};
use loyalty_backend::domain::{
    AchievementBindings, AchievementId, ClientId, EngagementKey, LoyaltyProgramId, PartnerId,
    ScanError, ScanEventKind, ScanService, ScanStatEvent, UsageCounter,
};
use loyalty_backend::outbound::persistence::{
    DbPool, DieselIdentityDirectory, DieselLoyaltyQueryRepository, DieselScanStore, PoolConfig,
};
use mockable::{Clock, DefaultClock};
use pg_embedded_setup_unpriv::TemporaryDatabase;
use postgres::{Client, NoTls};
use rstest::{fixture, rstest};
use tokio::runtime::Runtime;

mod support;

use support::{
    format_postgres_error, handle_cluster_setup_failure, provision_template_database,
    shared_cluster,
};

const TARGET: i32 = 5;

struct TestContext {
    runtime: Runtime,
    pool: DbPool,
    database_url: String,
    partner_id: PartnerId,
    client_id: ClientId,
    program_id: LoyaltyProgramId,
    achievement_id: AchievementId,
    _database: TemporaryDatabase,
}

impl TestContext {
    fn scans(&self) -> ScanService<DieselScanStore, DieselIdentityDirectory> {
        let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
        ScanService::new(
            Arc::new(DieselScanStore::new(self.pool.clone())),
            Arc::new(DieselIdentityDirectory::new(self.pool.clone())),
            Arc::new(AchievementBindings::new([self.achievement_id], [])),
            clock,
        )
    }

    fn store(&self) -> DieselScanStore {
        DieselScanStore::new(self.pool.clone())
    }

    fn queries(&self) -> DieselLoyaltyQueryRepository {
        DieselLoyaltyQueryRepository::new(self.pool.clone())
    }

    fn request(&self) -> ScanRequest {
        ScanRequest::new(self.partner_id, self.client_id, self.program_id)
    }

    fn usage_count(&self) -> Option<u32> {
        self.runtime
            .block_on(self.queries().find_usage_count(&self.client_id, &self.program_id))
            .expect("usage count read")
    }

    fn count_rows(&self, table: &str) -> i64 {
        let mut client = Client::connect(self.database_url.as_str(), NoTls)
            .unwrap_or_else(|err| panic!("connect: {}", format_postgres_error(&err)));
        client
            .query_one(format!("SELECT COUNT(*) FROM {table}").as_str(), &[])
            .unwrap_or_else(|err| panic!("count {table}: {}", format_postgres_error(&err)))
            .get(0)
    }
}

fn seed_loyalty_rows(
    url: &str,
    partner_id: &PartnerId,
    client_id: &ClientId,
    program_id: &LoyaltyProgramId,
    achievement_id: &AchievementId,
) -> Result<(), String> {
    let mut client = Client::connect(url, NoTls).map_err(|err| format_postgres_error(&err))?;
    let partner = *partner_id.as_uuid();
    let program = *program_id.as_uuid();

    client
        .execute(
            "INSERT INTO partners (id, name) VALUES ($1, $2)",
            &[&partner, &"Corner Bakery"],
        )
        .map_err(|err| format_postgres_error(&err))?;
    client
        .execute("INSERT INTO clients (id) VALUES ($1)", &[client_id.as_uuid()])
        .map_err(|err| format_postgres_error(&err))?;
    client
        .execute(
            "INSERT INTO loyalty_programs (id, partner_id, title, target) VALUES ($1, $2, $3, $4)",
            &[&program, &partner, &"Coffee stamps", &TARGET],
        )
        .map_err(|err| format_postgres_error(&err))?;
    client
        .execute(
            "INSERT INTO achievements (id, title, target) VALUES ($1, $2, $3)",
            &[achievement_id.as_uuid(), &"Regular", &3_i32],
        )
        .map_err(|err| format_postgres_error(&err))?;
    Ok(())
}

fn drop_table(url: &str, table_name: &str) -> Result<(), String> {
    let mut client = Client::connect(url, NoTls).map_err(|err| format_postgres_error(&err))?;
    let escaped_name = table_name.replace('"', "\"\"");
    client
        .batch_execute(format!(r#"DROP TABLE IF EXISTS "{escaped_name}" CASCADE"#).as_str())
        .map_err(|err| format_postgres_error(&err))
}

fn setup_context() -> Result<TestContext, String> {
    let runtime = Runtime::new().map_err(|err| err.to_string())?;
    let cluster = shared_cluster().map_err(|err| err.to_string())?;
    let temp_db = provision_template_database(cluster)?;
    let database_url = temp_db.url().to_string();

    let partner_id = PartnerId::random();
    let client_id = ClientId::random();
    let program_id = LoyaltyProgramId::random();
    let achievement_id = AchievementId::random();
    seed_loyalty_rows(
        database_url.as_str(),
        &partner_id,
        &client_id,
        &program_id,
        &achievement_id,
    )?;

    // Two concurrent scans each hold a unit-of-work connection while the
    // other resolves identities.
    let config = PoolConfig::new(database_url.as_str())
        .with_max_size(6)
        .with_min_idle(Some(1));
    let pool = runtime
        .block_on(DbPool::new(config))
        .map_err(|err| err.to_string())?;

    Ok(TestContext {
        runtime,
        pool,
        database_url,
        partner_id,
        client_id,
        program_id,
        achievement_id,
        _database: temp_db,
    })
}

#[fixture]
fn db_context() -> Option<TestContext> {
    match setup_context() {
        Ok(ctx) => Some(ctx),
        Err(reason) => handle_cluster_setup_failure(reason),
    }
}

#[rstest]
fn scans_update_counters_statistics_and_achievements(db_context: Option<TestContext>) {
    let Some(context) = db_context else {
        eprintln!("SKIP-TEST-CLUSTER: scans_update_counters_statistics_and_achievements skipped");
        return;
    };
    let scans = context.scans();

    let (first, second) = context.runtime.block_on(async {
        let first = scans.increment(context.request()).await;
        let second = scans.increment(context.request()).await;
        (first, second)
    });

    assert_eq!(first.expect("first increment").count, 1);
    assert_eq!(second.expect("second increment").count, 2);
    assert_eq!(context.usage_count(), Some(2));
    assert_eq!(context.count_rows("scan_stat_events"), 2);

    let queries = context.queries();
    let (progress, summary) = context.runtime.block_on(async {
        let progress = queries
            .list_achievement_progress(&context.client_id)
            .await
            .expect("achievement progress");
        let summary = queries
            .find_engagement_summary(&EngagementKey {
                partner_id: context.partner_id,
                client_id: context.client_id,
                program_id: context.program_id,
            })
            .await
            .expect("summary read")
            .expect("summary exists");
        (progress, summary)
    });
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].title, "Regular");
    assert_eq!(progress[0].count, 2);
    assert!(summary.started);
    assert!(!summary.returned);
    assert!(!summary.finished);
}

#[rstest]
fn redemption_resets_the_counter_once(db_context: Option<TestContext>) {
    let Some(context) = db_context else {
        eprintln!("SKIP-TEST-CLUSTER: redemption_resets_the_counter_once skipped");
        return;
    };
    let scans = context.scans();

    let (redeemed, repeated) = context.runtime.block_on(async {
        for _ in 0..TARGET {
            scans.increment(context.request()).await.expect("increment");
        }
        let redeemed = scans.redeem(context.request()).await;
        let repeated = scans.redeem(context.request()).await;
        (redeemed, repeated)
    });

    assert_eq!(redeemed.expect("redeem at target").count, 0);
    assert_eq!(
        repeated.expect_err("nothing left to redeem"),
        ScanError::InsufficientUsage { count: 0, target: 5 }
    );
    assert_eq!(context.usage_count(), Some(0));
}

#[rstest]
fn concurrent_first_scans_both_count(db_context: Option<TestContext>) {
    let Some(context) = db_context else {
        eprintln!("SKIP-TEST-CLUSTER: concurrent_first_scans_both_count skipped");
        return;
    };
    let scans = context.scans();

    let (left, right) = context.runtime.block_on(async {
        tokio::join!(
            scans.increment(context.request()),
            scans.increment(context.request())
        )
    });

    let mut counts = vec![
        left.expect("left scan").count,
        right.expect("right scan").count,
    ];
    counts.sort_unstable();
    assert_eq!(counts, vec![1, 2]);
    assert_eq!(context.usage_count(), Some(2));
    assert_eq!(context.count_rows("scan_stat_events"), 2);
}

#[rstest]
fn concurrent_duplicate_key_applies_once(db_context: Option<TestContext>) {
    let Some(context) = db_context else {
        eprintln!("SKIP-TEST-CLUSTER: concurrent_duplicate_key_applies_once skipped");
        return;
    };
    let scans = context.scans();
    let request = context
        .request()
        .with_idempotency_key(IdempotencyKey::random());

    let (left, right) = context
        .runtime
        .block_on(async { tokio::join!(scans.increment(request), scans.increment(request)) });

    let left = left.expect("left scan");
    let right = right.expect("right scan");
    assert_eq!(left.count, 1);
    assert_eq!(right.count, 1);
    assert!(left.replayed != right.replayed, "exactly one scan is a replay");
    assert_eq!(context.usage_count(), Some(1));
    assert_eq!(context.count_rows("scan_stat_events"), 1);
    assert_eq!(context.count_rows("scan_idempotency_keys"), 1);
}

#[rstest]
fn failure_after_the_ledger_write_leaves_no_partial_state(db_context: Option<TestContext>) {
    let Some(context) = db_context else {
        eprintln!(
            "SKIP-TEST-CLUSTER: failure_after_the_ledger_write_leaves_no_partial_state skipped"
        );
        return;
    };
    drop_table(context.database_url.as_str(), "achievement_counters").expect("drop table");
    let scans = context.scans();

    let error = context
        .runtime
        .block_on(scans.increment(context.request()))
        .expect_err("achievement step fails");

    assert!(matches!(error, ScanError::StorageFailure { .. }));
    assert_eq!(context.usage_count(), None);
    assert_eq!(context.count_rows("scan_stat_events"), 0);
    assert_eq!(context.count_rows("engagement_summaries"), 0);
}

#[rstest]
fn rolled_back_unit_of_work_is_discarded(db_context: Option<TestContext>) {
    let Some(context) = db_context else {
        eprintln!("SKIP-TEST-CLUSTER: rolled_back_unit_of_work_is_discarded skipped");
        return;
    };
    let store = context.store();

    context.runtime.block_on(async {
        let mut uow = store.begin().await.expect("begin");
        uow.insert_usage_counter(&UsageCounter::first(context.client_id, context.program_id))
            .await
            .expect("insert counter");
        uow.append_scan_event(&ScanStatEvent {
            partner_id: context.partner_id,
            program_id: context.program_id,
            occurred_at: Utc::now(),
            kind: ScanEventKind::Increment,
        })
        .await
        .expect("append event");
        uow.rollback().await.expect("rollback");
    });

    assert_eq!(context.usage_count(), None);
    assert_eq!(context.count_rows("scan_stat_events"), 0);
}

#[rstest]
fn identity_directory_resolves_seeded_rows(db_context: Option<TestContext>) {
    let Some(context) = db_context else {
        eprintln!("SKIP-TEST-CLUSTER: identity_directory_resolves_seeded_rows skipped");
        return;
    };
    let directory = DieselIdentityDirectory::new(context.pool.clone());

    let (known, unknown, program) = context.runtime.block_on(async {
        let known = directory
            .partner_exists(&context.partner_id)
            .await
            .expect("partner lookup");
        let unknown = directory
            .client_exists(&ClientId::random())
            .await
            .expect("client lookup");
        let program = directory
            .find_program(&context.program_id)
            .await
            .expect("program lookup")
            .expect("program exists");
        (known, unknown, program)
    });

    assert!(known);
    assert!(!unknown);
    assert_eq!(program.target(), 5);
    assert!(program.belongs_to(&context.partner_id));
}

#[rstest]
fn purge_deletes_receipts_at_or_before_the_cutoff(db_context: Option<TestContext>) {
    let Some(context) = db_context else {
        eprintln!("SKIP-TEST-CLUSTER: purge_deletes_receipts_at_or_before_the_cutoff skipped");
        return;
    };
    let scans = context.scans();
    let store = context.store();

    let (kept, purged) = context.runtime.block_on(async {
        for _ in 0..3 {
            scans
                .increment(
                    context
                        .request()
                        .with_idempotency_key(IdempotencyKey::random()),
                )
                .await
                .expect("keyed scan");
        }
        let kept = store
            .purge_expired_receipts(Utc::now() - chrono::Duration::hours(1))
            .await
            .expect("purge before receipts");
        let purged = store
            .purge_expired_receipts(Utc::now() + chrono::Duration::minutes(1))
            .await
            .expect("purge after receipts");
        (kept, purged)
    });

    assert_eq!(kept, 0);
    assert_eq!(purged, 3);
    assert_eq!(context.count_rows("scan_idempotency_keys"), 0);
    assert_eq!(context.usage_count(), Some(3));
}
