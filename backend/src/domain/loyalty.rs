//! Loyalty program entities and usage counters.
//!
//! A [`LoyaltyProgram`] belongs to exactly one partner and defines the number
//! of usages a client must accumulate before redeeming a reward. Progress is
//! held in a [`UsageCounter`] keyed by client and program.

use serde::{Deserialize, Serialize};

use super::{ClientId, LoyaltyProgramId, PartnerId};

/// Validation errors raised when constructing loyalty entities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoyaltyValidationError {
    /// Program targets must be positive.
    #[error("loyalty program target must be greater than zero")]
    ZeroTarget,
    /// Titles must contain visible characters.
    #[error("loyalty program title must not be empty")]
    EmptyTitle,
    /// A counter cannot exceed its program target.
    #[error("usage count {count} exceeds target {target}")]
    CountAboveTarget {
        /// Offending count.
        count: u32,
        /// Program target.
        target: u32,
    },
}

/// Partner business as seen by the loyalty engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partner {
    /// Partner identifier.
    pub id: PartnerId,
    /// Display name shown to clients.
    pub name: String,
}

/// Loyalty program owned by a partner.
///
/// ## Invariants
/// - `target` is greater than zero.
/// - `title` is non-empty once trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyProgram {
    id: LoyaltyProgramId,
    partner_id: PartnerId,
    title: String,
    target: u32,
}

impl LoyaltyProgram {
    /// Validate and construct a program.
    ///
    /// # Examples
    /// ```
    /// use loyalty_backend::domain::{LoyaltyProgram, LoyaltyProgramId, PartnerId};
    ///
    /// let program = LoyaltyProgram::new(
    ///     LoyaltyProgramId::random(),
    ///     PartnerId::random(),
    ///     "Tenth coffee free",
    ///     10,
    /// )
    /// .expect("valid program");
    /// assert_eq!(program.target(), 10);
    /// ```
    pub fn new(
        id: LoyaltyProgramId,
        partner_id: PartnerId,
        title: impl Into<String>,
        target: u32,
    ) -> Result<Self, LoyaltyValidationError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(LoyaltyValidationError::EmptyTitle);
        }
        if target == 0 {
            return Err(LoyaltyValidationError::ZeroTarget);
        }
        Ok(Self {
            id,
            partner_id,
            title,
            target,
        })
    }

    /// Program identifier.
    pub const fn id(&self) -> LoyaltyProgramId {
        self.id
    }

    /// Owning partner.
    pub const fn partner_id(&self) -> PartnerId {
        self.partner_id
    }

    /// Program title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Usages required before a redemption is allowed.
    pub const fn target(&self) -> u32 {
        self.target
    }

    /// Whether the program is run by `partner`.
    pub fn belongs_to(&self, partner: &PartnerId) -> bool {
        self.partner_id == *partner
    }
}

/// Per-client progress towards a loyalty program target.
///
/// ## Invariants
/// - `count <= target` of the program the counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounter {
    /// Client accumulating usages.
    pub client_id: ClientId,
    /// Program being accumulated.
    pub program_id: LoyaltyProgramId,
    /// Current usage count.
    pub count: u32,
}

impl UsageCounter {
    /// Counter for a client's first ever scan of a program.
    pub const fn first(client_id: ClientId, program_id: LoyaltyProgramId) -> Self {
        Self {
            client_id,
            program_id,
            count: 1,
        }
    }

    /// Check the counter against a program target.
    pub fn validate_against(&self, program: &LoyaltyProgram) -> Result<(), LoyaltyValidationError> {
        if self.count > program.target() {
            return Err(LoyaltyValidationError::CountAboveTarget {
                count: self.count,
                target: program.target(),
            });
        }
        Ok(())
    }
}

/// Read model pairing a client's count with the program target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    /// Current usage count, zero when the client was never scanned.
    pub count: u32,
    /// Program target.
    pub target: u32,
}

/// One program row of a client or partner overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramUsage {
    /// Program identifier.
    pub program_id: LoyaltyProgramId,
    /// Program title.
    pub title: String,
    /// Program target.
    pub target: u32,
    /// Client's current count.
    pub count: u32,
}

/// A client's programs at one partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerPrograms {
    /// Partner identifier.
    pub partner_id: PartnerId,
    /// Partner display name.
    pub partner_name: String,
    /// Programs the client has been scanned for, ordered by title.
    pub programs: Vec<ProgramUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", 5, LoyaltyValidationError::EmptyTitle)]
    #[case("Free bagel", 0, LoyaltyValidationError::ZeroTarget)]
    fn rejects_invalid_programs(
        #[case] title: &str,
        #[case] target: u32,
        #[case] expected: LoyaltyValidationError,
    ) {
        let error = LoyaltyProgram::new(LoyaltyProgramId::random(), PartnerId::random(), title, target)
            .expect_err("invalid program");
        assert_eq!(error, expected);
    }

    #[rstest]
    fn ownership_is_checked_against_partner() {
        let owner = PartnerId::random();
        let program = LoyaltyProgram::new(LoyaltyProgramId::random(), owner, "Stamps", 3)
            .expect("valid program");
        assert!(program.belongs_to(&owner));
        assert!(!program.belongs_to(&PartnerId::random()));
    }

    #[rstest]
    fn counter_above_target_is_invalid() {
        let program = LoyaltyProgram::new(LoyaltyProgramId::random(), PartnerId::random(), "Stamps", 3)
            .expect("valid program");
        let counter = UsageCounter {
            client_id: ClientId::random(),
            program_id: program.id(),
            count: 4,
        };
        assert_eq!(
            counter.validate_against(&program),
            Err(LoyaltyValidationError::CountAboveTarget { count: 4, target: 3 })
        );
    }
}
