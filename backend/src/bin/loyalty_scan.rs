//! Operator CLI for the loyalty scan engine.
//!
//! Applies scans and reads loyalty state against PostgreSQL using the same
//! driving ports as any other adapter. Results are printed as JSON on stdout;
//! logs go to stderr.
//!
//! # Examples
//! ```sh
//! LOYALTY_DATABASE_URL=postgres://localhost/loyalty \
//!   cargo run --manifest-path backend/Cargo.toml --bin loyalty-scan -- migrate
//! cargo run --manifest-path backend/Cargo.toml --bin loyalty-scan -- \
//!   increment --partner <uuid> --client <uuid> --program <uuid>
//! ```

use std::ffi::OsString;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig;
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

use loyalty_backend::config::ScanSettings;
use loyalty_backend::domain::idempotency::IdempotencyKey;
use loyalty_backend::domain::ports::{LoyaltyQuery, ScanCommand, ScanRequest};
use loyalty_backend::domain::{
    ClientId, EngagementKey, LoyaltyProgramId, LoyaltyQueryService, PartnerId, ScanService,
};
use loyalty_backend::outbound::persistence::{
    DbPool, DieselIdentityDirectory, DieselLoyaltyQueryRepository, DieselScanStore,
    run_pending_migrations,
};

#[derive(Debug, Parser)]
#[command(name = "loyalty-scan", about = "Apply and inspect loyalty scans")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Count one usage towards a program.
    Increment(ScanArgs),
    /// Redeem a program reward and reset the count.
    Redeem(ScanArgs),
    /// Show a client's count and the program target.
    Usage {
        #[arg(long)]
        client: Uuid,
        #[arg(long)]
        program: Uuid,
    },
    /// List a client's achievement progress.
    Achievements {
        #[arg(long)]
        client: Uuid,
    },
    /// List every program of a partner with the client's counts.
    Overview {
        #[arg(long)]
        partner: Uuid,
        #[arg(long)]
        client: Uuid,
    },
    /// List a client's programs grouped by partner.
    Programs {
        #[arg(long)]
        client: Uuid,
    },
    /// Show the engagement flags for a partner, client and program.
    Engagement {
        #[arg(long)]
        partner: Uuid,
        #[arg(long)]
        client: Uuid,
        #[arg(long)]
        program: Uuid,
    },
    /// Delete scan receipts older than the configured TTL.
    PurgeReceipts,
    /// Apply pending database migrations.
    Migrate,
}

#[derive(Debug, Args)]
struct ScanArgs {
    #[arg(long)]
    partner: Uuid,
    #[arg(long)]
    client: Uuid,
    #[arg(long)]
    program: Uuid,
    /// Key identifying this physical scan for safe retries.
    #[arg(long)]
    idempotency_key: Option<Uuid>,
}

impl ScanArgs {
    fn into_request(self) -> ScanRequest {
        let request = ScanRequest::new(
            PartnerId::from_uuid(self.partner),
            ClientId::from_uuid(self.client),
            LoyaltyProgramId::from_uuid(self.program),
        );
        match self.idempotency_key {
            Some(key) => request.with_idempotency_key(IdempotencyKey::from_uuid(key)),
            None => request,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let cli = Cli::parse();
    // Flags belong to the subcommands; settings come from the environment
    // and config files only.
    let settings = ScanSettings::load_from_iter([OsString::from("loyalty-scan")])
        .map_err(|err| eyre!("load LOYALTY_* settings: {err}"))?;
    let database_url = settings
        .database_url()
        .ok_or_else(|| eyre!("LOYALTY_DATABASE_URL is not set"))?
        .to_owned();

    if matches!(cli.command, Command::Migrate) {
        let applied = run_pending_migrations(&database_url)
            .await
            .wrap_err("apply migrations")?;
        return print_json(&applied);
    }

    let pool = DbPool::new(settings.pool_config(&database_url))
        .await
        .wrap_err("connect to database")?;

    match cli.command {
        Command::Increment(args) => {
            let service = scan_service(&settings, pool)?;
            let response = service.increment(args.into_request()).await?;
            print_json(&response)
        }
        Command::Redeem(args) => {
            let service = scan_service(&settings, pool)?;
            let response = service.redeem(args.into_request()).await?;
            print_json(&response)
        }
        Command::PurgeReceipts => {
            let service = scan_service(&settings, pool)?;
            let purged = service.purge_expired_receipts().await?;
            print_json(&serde_json::json!({ "purged": purged }))
        }
        Command::Usage { client, program } => {
            let usage = query_service(pool)
                .current_usage(
                    &ClientId::from_uuid(client),
                    &LoyaltyProgramId::from_uuid(program),
                )
                .await?;
            print_json(&usage)
        }
        Command::Achievements { client } => {
            let progress = query_service(pool)
                .achievement_progress(&ClientId::from_uuid(client))
                .await?;
            print_json(&progress)
        }
        Command::Overview { partner, client } => {
            let programs = query_service(pool)
                .partner_programs_for_client(
                    &PartnerId::from_uuid(partner),
                    &ClientId::from_uuid(client),
                )
                .await?;
            print_json(&programs)
        }
        Command::Programs { client } => {
            let grouped = query_service(pool)
                .client_programs(&ClientId::from_uuid(client))
                .await?;
            print_json(&grouped)
        }
        Command::Engagement {
            partner,
            client,
            program,
        } => {
            let key = EngagementKey {
                partner_id: PartnerId::from_uuid(partner),
                client_id: ClientId::from_uuid(client),
                program_id: LoyaltyProgramId::from_uuid(program),
            };
            let summary = query_service(pool).engagement_summary(&key).await?;
            print_json(&summary)
        }
        Command::Migrate => Ok(()),
    }
}

fn scan_service(
    settings: &ScanSettings,
    pool: DbPool,
) -> Result<ScanService<DieselScanStore, DieselIdentityDirectory>> {
    let bindings = settings
        .load_achievement_bindings()
        .wrap_err("load achievement bindings")?;
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    Ok(ScanService::new(
        Arc::new(DieselScanStore::new(pool.clone())),
        Arc::new(DieselIdentityDirectory::new(pool)),
        Arc::new(bindings),
        clock,
    )
    .with_policy(settings.scan_policy()))
}

fn query_service(pool: DbPool) -> LoyaltyQueryService<DieselLoyaltyQueryRepository> {
    LoyaltyQueryService::new(Arc::new(DieselLoyaltyQueryRepository::new(pool)))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).wrap_err("render JSON output")?;
    println!("{rendered}");
    Ok(())
}
