//! Usage counter state machine.
//!
//! ```text
//! EMPTY --increment--> ACCUMULATING(1)
//! ACCUMULATING(n < target) --increment--> ACCUMULATING(n + 1) | READY(target)
//! READY(target) --redeem--> ACCUMULATING(0)
//! ```
//!
//! The `plan_*` functions are pure; [`UsageLedger`] wraps them with the row
//! lock and writes of a [`ScanUnitOfWork`].

use tracing::debug;

use super::ports::{ScanStoreError, ScanUnitOfWork};
use super::{ClientId, LoyaltyProgram, UsageCounter};

/// How an accepted increment relates to the client's history with a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementKind {
    /// The counter did not exist before.
    First,
    /// The counter sat at zero after a redemption.
    Returning,
    /// Any other accepted increment.
    Continuing,
}

/// Accepted increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementTransition {
    /// Counter state after the increment.
    pub counter: UsageCounter,
    /// Relationship to earlier scans.
    pub kind: IncrementKind,
}

/// Result of applying an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The count advanced by one.
    Recorded(IncrementTransition),
    /// The count already equals the target; nothing changed.
    LimitReached {
        /// Current count.
        count: u32,
        /// Program target.
        target: u32,
    },
}

/// Result of applying a redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionOutcome {
    /// The reward was redeemed and the counter reset to zero.
    Redeemed(UsageCounter),
    /// The count is below the target; nothing changed.
    InsufficientUsage {
        /// Current count, zero when the client was never scanned.
        count: u32,
        /// Program target.
        target: u32,
    },
}

/// Decide the next counter state for an increment.
///
/// # Examples
/// ```
/// use loyalty_backend::domain::{
///     ClientId, IncrementKind, IncrementOutcome, LoyaltyProgram, LoyaltyProgramId, PartnerId,
///     plan_increment,
/// };
///
/// let program =
///     LoyaltyProgram::new(LoyaltyProgramId::random(), PartnerId::random(), "Stamps", 5)
///         .expect("valid program");
/// let outcome = plan_increment(None, ClientId::random(), &program);
/// let IncrementOutcome::Recorded(transition) = outcome else {
///     panic!("first increment is accepted");
/// };
/// assert_eq!(transition.counter.count, 1);
/// assert_eq!(transition.kind, IncrementKind::First);
/// ```
pub fn plan_increment(
    current: Option<UsageCounter>,
    client_id: ClientId,
    program: &LoyaltyProgram,
) -> IncrementOutcome {
    let target = program.target();
    let Some(mut counter) = current else {
        return IncrementOutcome::Recorded(IncrementTransition {
            counter: UsageCounter::first(client_id, program.id()),
            kind: IncrementKind::First,
        });
    };
    if counter.count >= target {
        return IncrementOutcome::LimitReached {
            count: counter.count,
            target,
        };
    }
    let kind = if counter.count == 0 {
        IncrementKind::Returning
    } else {
        IncrementKind::Continuing
    };
    counter.count += 1;
    IncrementOutcome::Recorded(IncrementTransition { counter, kind })
}

/// Decide the next counter state for a redemption.
pub fn plan_redemption(current: Option<UsageCounter>, program: &LoyaltyProgram) -> RedemptionOutcome {
    let target = program.target();
    match current {
        Some(mut counter) if counter.count >= target => {
            counter.count = 0;
            RedemptionOutcome::Redeemed(counter)
        }
        other => RedemptionOutcome::InsufficientUsage {
            count: other.map_or(0, |counter| counter.count),
            target,
        },
    }
}

/// Applies increment and redemption transitions inside a unit of work.
#[derive(Debug, Default, Clone, Copy)]
pub struct UsageLedger;

impl UsageLedger {
    /// Lock the counter, plan the increment and persist an accepted one.
    pub async fn record_increment(
        &self,
        uow: &mut dyn ScanUnitOfWork,
        client_id: ClientId,
        program: &LoyaltyProgram,
    ) -> Result<IncrementOutcome, ScanStoreError> {
        let current = uow.lock_usage_counter(&client_id, &program.id()).await?;
        let outcome = plan_increment(current, client_id, program);
        if let IncrementOutcome::Recorded(transition) = &outcome {
            match transition.kind {
                IncrementKind::First => uow.insert_usage_counter(&transition.counter).await?,
                IncrementKind::Returning | IncrementKind::Continuing => {
                    uow.update_usage_counter(&transition.counter).await?
                }
            }
            debug!(
                client_id = %client_id,
                program_id = %program.id(),
                count = transition.counter.count,
                "usage counter incremented"
            );
        }
        Ok(outcome)
    }

    /// Lock the counter, plan the redemption and persist an accepted one.
    pub async fn record_redemption(
        &self,
        uow: &mut dyn ScanUnitOfWork,
        client_id: ClientId,
        program: &LoyaltyProgram,
    ) -> Result<RedemptionOutcome, ScanStoreError> {
        let current = uow.lock_usage_counter(&client_id, &program.id()).await?;
        let outcome = plan_redemption(current, program);
        if let RedemptionOutcome::Redeemed(counter) = &outcome {
            uow.update_usage_counter(counter).await?;
            debug!(
                client_id = %client_id,
                program_id = %program.id(),
                "usage counter reset after redemption"
            );
        }
        Ok(outcome)
    }
}
