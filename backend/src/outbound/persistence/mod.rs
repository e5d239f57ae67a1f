//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Adapters translate between Diesel rows and domain types; no business
//! rules live here. Connections come from a `bb8` pool through
//! `diesel-async`.
//!
//! - [`DieselScanStore`] opens one transaction per scan unit of work.
//! - [`DieselIdentityDirectory`] answers existence checks for scans.
//! - [`DieselLoyaltyQueryRepository`] serves the read-only lookups.
//!
//! # Example
//!
//! ```no_run
//! use loyalty_backend::outbound::persistence::{DbPool, DieselScanStore, PoolConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/loyalty")).await?;
//! let store = DieselScanStore::new(pool);
//! # let _ = store;
//! # Ok(())
//! # }
//! ```

mod diesel_error_mapping;
mod diesel_identity_directory;
mod diesel_loyalty_query_repository;
mod diesel_scan_store;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_identity_directory::DieselIdentityDirectory;
pub use diesel_loyalty_query_repository::DieselLoyaltyQueryRepository;
pub use diesel_scan_store::DieselScanStore;
pub use migrations::{MIGRATIONS, MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
