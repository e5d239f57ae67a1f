//! Partner-facing scan statistics.
//!
//! Every applied scan appends a [`ScanStatEvent`]. A
//! [`ProgramEngagementSummary`] per partner, client and program records
//! whether the client ever started, came back to, or finished the program.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ports::{ScanStoreError, ScanUnitOfWork};
use super::{ClientId, IncrementKind, LoyaltyProgramId, PartnerId};

/// Kind of an applied scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanEventKind {
    /// One usage was counted.
    Increment,
    /// A reward was redeemed.
    Redeem,
}

impl ScanEventKind {
    /// Storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::Redeem => "redeem",
        }
    }
}

impl fmt::Display for ScanEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored event kind is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scan event kind: {input}")]
pub struct ParseScanEventKindError {
    /// Rejected input.
    pub input: String,
}

impl FromStr for ScanEventKind {
    type Err = ParseScanEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increment" => Ok(Self::Increment),
            "redeem" => Ok(Self::Redeem),
            other => Err(ParseScanEventKindError {
                input: other.to_owned(),
            }),
        }
    }
}

/// Append-only statistics entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStatEvent {
    /// Partner whose terminal performed the scan.
    pub partner_id: PartnerId,
    /// Program scanned.
    pub program_id: LoyaltyProgramId,
    /// Time the scan was applied.
    pub occurred_at: DateTime<Utc>,
    /// Scan kind.
    pub kind: ScanEventKind,
}

/// Key of an engagement summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngagementKey {
    /// Partner running the program.
    pub partner_id: PartnerId,
    /// Client engaging with the program.
    pub client_id: ClientId,
    /// Program engaged with.
    pub program_id: LoyaltyProgramId,
}

/// Lifecycle flags of a client's engagement with a program.
///
/// All flags are sticky: once set they stay set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramEngagementSummary {
    /// Partner running the program.
    pub partner_id: PartnerId,
    /// Client engaging with the program.
    pub client_id: ClientId,
    /// Program engaged with.
    pub program_id: LoyaltyProgramId,
    /// The client was scanned at least once.
    pub started: bool,
    /// The client was scanned again after a redemption.
    pub returned: bool,
    /// The client has redeemed at least once.
    pub finished: bool,
}

impl ProgramEngagementSummary {
    /// Summary created by a client's first scan.
    pub const fn started(key: EngagementKey) -> Self {
        Self {
            partner_id: key.partner_id,
            client_id: key.client_id,
            program_id: key.program_id,
            started: true,
            returned: false,
            finished: false,
        }
    }

    /// Key this summary is stored under.
    pub const fn key(&self) -> EngagementKey {
        EngagementKey {
            partner_id: self.partner_id,
            client_id: self.client_id,
            program_id: self.program_id,
        }
    }
}

/// Records statistics for applied scans inside a unit of work.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatRecorder;

impl StatRecorder {
    /// Record an accepted increment.
    ///
    /// First increments create the summary; returning increments mark it
    /// `returned`. Continuing increments only append the event.
    pub async fn on_increment(
        &self,
        uow: &mut dyn ScanUnitOfWork,
        key: EngagementKey,
        kind: IncrementKind,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ScanStoreError> {
        uow.append_scan_event(&ScanStatEvent {
            partner_id: key.partner_id,
            program_id: key.program_id,
            occurred_at,
            kind: ScanEventKind::Increment,
        })
        .await?;

        match kind {
            IncrementKind::First => {
                let summary = uow
                    .lock_engagement_summary(&key)
                    .await?
                    .map_or(ProgramEngagementSummary::started(key), |mut existing| {
                        existing.started = true;
                        existing
                    });
                uow.save_engagement_summary(&summary).await
            }
            IncrementKind::Returning => {
                let mut summary = load_or_recreate(uow, key).await?;
                summary.returned = true;
                uow.save_engagement_summary(&summary).await
            }
            IncrementKind::Continuing => Ok(()),
        }
    }

    /// Record a redemption and mark the summary `finished`.
    pub async fn on_redemption(
        &self,
        uow: &mut dyn ScanUnitOfWork,
        key: EngagementKey,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ScanStoreError> {
        uow.append_scan_event(&ScanStatEvent {
            partner_id: key.partner_id,
            program_id: key.program_id,
            occurred_at,
            kind: ScanEventKind::Redeem,
        })
        .await?;

        let mut summary = load_or_recreate(uow, key).await?;
        summary.finished = true;
        uow.save_engagement_summary(&summary).await
    }
}

async fn load_or_recreate(
    uow: &mut dyn ScanUnitOfWork,
    key: EngagementKey,
) -> Result<ProgramEngagementSummary, ScanStoreError> {
    if let Some(summary) = uow.lock_engagement_summary(&key).await? {
        return Ok(summary);
    }
    warn!(
        partner_id = %key.partner_id,
        client_id = %key.client_id,
        program_id = %key.program_id,
        "engagement summary missing for existing usage counter; recreating"
    );
    Ok(ProgramEngagementSummary::started(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("increment", ScanEventKind::Increment)]
    #[case("redeem", ScanEventKind::Redeem)]
    fn event_kind_round_trips_storage_text(#[case] raw: &str, #[case] kind: ScanEventKind) {
        assert_eq!(raw.parse::<ScanEventKind>(), Ok(kind));
        assert_eq!(kind.as_str(), raw);
    }

    #[rstest]
    fn unknown_event_kind_is_rejected() {
        let error = "give".parse::<ScanEventKind>().expect_err("unknown kind");
        assert_eq!(error.input, "give");
    }

    #[rstest]
    fn started_summary_has_only_started_flag() {
        let key = EngagementKey {
            partner_id: PartnerId::random(),
            client_id: ClientId::random(),
            program_id: LoyaltyProgramId::random(),
        };
        let summary = ProgramEngagementSummary::started(key);
        assert!(summary.started);
        assert!(!summary.returned);
        assert!(!summary.finished);
        assert_eq!(summary.key(), key);
    }
}
