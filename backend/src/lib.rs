//! Loyalty scan engine.
//!
//! Partners scan clients to record program usages and redeem rewards. Every
//! scan updates the usage ledger, partner statistics and cross-partner
//! achievements in one unit of work. The crate follows a ports and adapters
//! layout: [`domain`] holds the rules and port traits, [`outbound`] the
//! PostgreSQL and in-memory adapters, and [`config`] the layered settings
//! consumed by the `loyalty-scan` operator CLI.

pub mod config;
pub mod domain;
pub mod outbound;
