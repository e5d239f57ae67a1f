//! Cross-partner achievements.
//!
//! Achievements are not owned by any partner. A scan event advances every
//! achievement bound to it in [`AchievementBindings`]; counters saturate at
//! the achievement target.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ports::{ScanStoreError, ScanUnitOfWork};
use super::{AchievementBindings, AchievementId, ClientId};

/// Scan event category that can advance achievements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AchievementEvent {
    /// A usage was counted.
    OnIncrement,
    /// A reward was redeemed.
    OnRedemption,
}

impl fmt::Display for AchievementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OnIncrement => "onIncrement",
            Self::OnRedemption => "onRedemption",
        })
    }
}

/// Achievement definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDefinition {
    /// Achievement identifier.
    pub id: AchievementId,
    /// Display title.
    pub title: String,
    /// Count at which the achievement is complete.
    pub target: u32,
}

/// A client's progress towards one achievement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AchievementCounter {
    /// Client progressing.
    pub client_id: ClientId,
    /// Achievement progressed.
    pub achievement_id: AchievementId,
    /// Current count, never above the target.
    pub count: u32,
}

/// Read model of a client's achievement progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgress {
    /// Achievement title.
    pub title: String,
    /// Achievement target.
    pub target: u32,
    /// Client's current count.
    pub count: u32,
}

/// Next state of an achievement counter for one qualifying event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AchievementStep {
    /// No counter existed; create one.
    Create(AchievementCounter),
    /// The counter advanced by one.
    Advance(AchievementCounter),
    /// The counter is already at the target.
    Saturated,
}

/// Decide how a qualifying event changes a counter.
pub fn plan_achievement_step(
    current: Option<AchievementCounter>,
    client_id: ClientId,
    definition: &AchievementDefinition,
) -> AchievementStep {
    match current {
        None => AchievementStep::Create(AchievementCounter {
            client_id,
            achievement_id: definition.id,
            count: 1.min(definition.target),
        }),
        Some(counter) if counter.count >= definition.target => AchievementStep::Saturated,
        Some(mut counter) => {
            counter.count += 1;
            AchievementStep::Advance(counter)
        }
    }
}

/// Advances the achievements bound to scan events.
#[derive(Debug, Clone)]
pub struct AchievementTracker {
    bindings: Arc<AchievementBindings>,
}

impl AchievementTracker {
    /// Create a tracker over the given bindings.
    pub fn new(bindings: Arc<AchievementBindings>) -> Self {
        Self { bindings }
    }

    /// Advance every achievement bound to `event` for the client.
    ///
    /// Ids are processed in ascending order. Bound ids without a definition
    /// are skipped.
    pub async fn apply_event(
        &self,
        uow: &mut dyn ScanUnitOfWork,
        client_id: ClientId,
        event: AchievementEvent,
    ) -> Result<(), ScanStoreError> {
        for achievement_id in self.bindings.for_event(event) {
            let Some(definition) = uow.find_achievement(achievement_id).await? else {
                warn!(
                    achievement_id = %achievement_id,
                    event = %event,
                    "bound achievement has no definition; skipping"
                );
                continue;
            };
            let current = uow.lock_achievement_counter(&client_id, achievement_id).await?;
            match plan_achievement_step(current, client_id, &definition) {
                AchievementStep::Create(counter) => uow.insert_achievement_counter(&counter).await?,
                AchievementStep::Advance(counter) => {
                    uow.update_achievement_counter(&counter).await?
                }
                AchievementStep::Saturated => {
                    debug!(achievement_id = %achievement_id, "achievement already complete");
                }
            }
        }
        Ok(())
    }
}
