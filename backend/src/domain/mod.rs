//! Domain primitives, services and ports of the loyalty scan engine.
//!
//! Purpose: model loyalty programs, usage counters, partner statistics and
//! cross-partner achievements, and orchestrate the scan transitions that
//! update them atomically.
//!
//! Public surface:
//! - [`ScanService`] implements the [`ports::ScanCommand`] driving port.
//! - [`LoyaltyQueryService`] implements the [`ports::LoyaltyQuery`] driving
//!   port.
//! - [`UsageLedger`], [`StatRecorder`] and [`AchievementTracker`] are the
//!   steps a scan runs inside one [`ports::ScanUnitOfWork`].
//! - [`Error`] / [`ErrorCode`] form the transport-agnostic error payload.

pub mod achievement_bindings;
pub mod achievements;
pub mod error;
pub mod idempotency;
pub mod ids;
pub mod loyalty;
pub mod loyalty_query_service;
pub mod ports;
pub mod scan_error;
pub mod scan_service;
pub mod stats;
pub mod usage_ledger;

pub use self::achievement_bindings::{AchievementBindings, AchievementBindingsError};
pub use self::achievements::{
    AchievementCounter, AchievementDefinition, AchievementEvent, AchievementProgress,
    AchievementStep, AchievementTracker, plan_achievement_step,
};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::ids::{AchievementId, ClientId, IdValidationError, LoyaltyProgramId, PartnerId};
pub use self::loyalty::{
    LoyaltyProgram, LoyaltyValidationError, Partner, PartnerPrograms, ProgramUsage, UsageCounter,
    UsageSnapshot,
};
pub use self::loyalty_query_service::LoyaltyQueryService;
pub use self::scan_error::{ScanEntity, ScanError};
pub use self::scan_service::{DEFAULT_MAX_SCAN_ATTEMPTS, ScanPolicy, ScanService};
pub use self::stats::{
    EngagementKey, ParseScanEventKindError, ProgramEngagementSummary, ScanEventKind,
    ScanStatEvent, StatRecorder,
};
pub use self::usage_ledger::{
    IncrementKind, IncrementOutcome, IncrementTransition, RedemptionOutcome, UsageLedger,
    plan_increment, plan_redemption,
};
