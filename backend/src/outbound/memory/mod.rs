//! In-process adapter implementing the scan and query ports.
//!
//! All state lives behind one `tokio` mutex. A unit of work holds the owned
//! guard for its whole lifetime, so scans run one at a time, and stages its
//! writes on a copy of the state that replaces the original only on commit.
//! Used by tests and for dry runs without PostgreSQL.

mod query;
mod unit_of_work;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::idempotency::{IdempotencyKey, ScanMutation, ScanReceipt};
use crate::domain::ports::{ScanStore, ScanStoreError, ScanUnitOfWork};
use crate::domain::{
    AchievementDefinition, AchievementId, ClientId, EngagementKey, LoyaltyProgram,
    LoyaltyProgramId, Partner, PartnerId, ProgramEngagementSummary, ScanStatEvent,
};

use unit_of_work::InMemoryUnitOfWork;

type ReceiptKey = (IdempotencyKey, PartnerId, ScanMutation);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    partners: HashMap<PartnerId, Partner>,
    clients: HashSet<ClientId>,
    programs: HashMap<LoyaltyProgramId, LoyaltyProgram>,
    usage_counts: HashMap<(ClientId, LoyaltyProgramId), u32>,
    scan_events: Vec<ScanStatEvent>,
    summaries: HashMap<EngagementKey, ProgramEngagementSummary>,
    achievements: HashMap<AchievementId, AchievementDefinition>,
    achievement_counts: HashMap<(ClientId, AchievementId), u32>,
    receipts: HashMap<ReceiptKey, ScanReceipt>,
}

/// In-memory loyalty store.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoyaltyStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLoyaltyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a partner.
    pub async fn insert_partner(&self, partner: Partner) {
        self.state.lock().await.partners.insert(partner.id, partner);
    }

    /// Register a client.
    pub async fn insert_client(&self, client_id: ClientId) {
        self.state.lock().await.clients.insert(client_id);
    }

    /// Register a loyalty program.
    pub async fn insert_program(&self, program: LoyaltyProgram) {
        self.state.lock().await.programs.insert(program.id(), program);
    }

    /// Register an achievement definition.
    pub async fn insert_achievement(&self, definition: AchievementDefinition) {
        self.state
            .lock()
            .await
            .achievements
            .insert(definition.id, definition);
    }

    /// Committed usage count, `None` before the first scan.
    pub async fn usage_count(&self, client_id: ClientId, program_id: LoyaltyProgramId) -> Option<u32> {
        self.state
            .lock()
            .await
            .usage_counts
            .get(&(client_id, program_id))
            .copied()
    }

    /// Committed achievement count, `None` before the first qualifying scan.
    pub async fn achievement_count(
        &self,
        client_id: ClientId,
        achievement_id: AchievementId,
    ) -> Option<u32> {
        self.state
            .lock()
            .await
            .achievement_counts
            .get(&(client_id, achievement_id))
            .copied()
    }

    /// Committed statistics events in append order.
    pub async fn scan_events(&self) -> Vec<ScanStatEvent> {
        self.state.lock().await.scan_events.clone()
    }

    /// Number of committed scan receipts.
    pub async fn receipt_count(&self) -> usize {
        self.state.lock().await.receipts.len()
    }
}

#[async_trait]
impl ScanStore for InMemoryLoyaltyStore {
    async fn begin(&self) -> Result<Box<dyn ScanUnitOfWork>, ScanStoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(InMemoryUnitOfWork::new(guard)))
    }

    async fn purge_expired_receipts(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<u64, ScanStoreError> {
        let mut state = self.state.lock().await;
        let before = state.receipts.len();
        state
            .receipts
            .retain(|_, receipt| receipt.created_at > created_before);
        let removed = before - state.receipts.len();
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}
