//! Discriminator scoping idempotency keys per scan operation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The scan operation protected by an idempotency key.
///
/// Keys are isolated per operation so a terminal reusing a UUID for an
/// increment and a later redemption never collides.
///
/// # Example
///
/// ```
/// # use loyalty_backend::domain::idempotency::ScanMutation;
/// assert_eq!(ScanMutation::Increment.as_str(), "scan_increment");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMutation {
    /// Usage increment ("plus one").
    Increment,
    /// Reward redemption.
    Redeem,
}

impl ScanMutation {
    /// All variants, in storage order.
    pub const ALL: [Self; 2] = [Self::Increment, Self::Redeem];

    /// Returns the database string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Increment => "scan_increment",
            Self::Redeem => "scan_redeem",
        }
    }
}

impl fmt::Display for ScanMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown mutation string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid scan mutation '{input}': expected scan_increment or scan_redeem")]
pub struct ParseScanMutationError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for ScanMutation {
    type Err = ParseScanMutationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|variant| variant.as_str() == s)
            .copied()
            .ok_or_else(|| ParseScanMutationError {
                input: s.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ScanMutation::Increment)]
    #[case(ScanMutation::Redeem)]
    fn parses_its_own_storage_form(#[case] mutation: ScanMutation) {
        assert_eq!(mutation.as_str().parse::<ScanMutation>(), Ok(mutation));
    }

    #[rstest]
    fn rejects_unknown_input() {
        let error = "give".parse::<ScanMutation>().expect_err("unknown mutation");
        assert!(error.to_string().contains("give"));
    }
}
