//! Services module
//!
//! Seams around the engine (registration directory, audit recorder,
//! conflict notifier) plus the factory that wires the whole engine
//! together from a database pool and settings.

pub mod audit;
pub mod notification;
pub mod registration;

pub use audit::{AuditRecorder, MemoryAuditRecorder, PgAuditRecorder};
pub use notification::{ConflictNotice, ConflictNotifier, NullNotifier, WebhookNotifier};
pub use registration::{
    MemoryRegistrationDirectory, PgRegistrationDirectory, RegistrationDirectory, StatusChange,
};

use std::sync::Arc;

use tracing::info;

use crate::capacity::{
    CapacityGuard, CheckInLedger, PgCheckInLedger, SessionStore, TicketTypeAvailabilityCalculator,
};
use crate::config::settings::Settings;
use crate::database::{DatabasePool, DatabaseService};
use crate::sync::{PgSyncQueueStore, SyncIngress, SyncProcessor, SyncQueueStore};
use crate::utils::errors::Result;

/// Wires every engine component from a pool and settings. Components share
/// the same session store, so counters observed by availability, admission
/// and ingress are always the same actors.
#[derive(Clone)]
pub struct ServiceFactory {
    pub database: DatabaseService,
    pub store: SessionStore,
    pub guard: CapacityGuard,
    pub availability: TicketTypeAvailabilityCalculator,
    pub ingress: Arc<SyncIngress>,
    pub queue: Arc<dyn SyncQueueStore>,
    pub directory: Arc<dyn RegistrationDirectory>,
    pub auditor: Arc<dyn AuditRecorder>,
    pub notifier: Arc<dyn ConflictNotifier>,
    settings: Settings,
}

impl ServiceFactory {
    pub fn new(pool: DatabasePool, settings: Settings) -> Result<Self> {
        let database = DatabaseService::new(pool.clone());

        let ledger: Arc<dyn CheckInLedger> = Arc::new(PgCheckInLedger::new(pool));
        let store = SessionStore::new(Arc::clone(&ledger), settings.capacity.actor_mailbox_size);
        let directory: Arc<dyn RegistrationDirectory> = Arc::new(PgRegistrationDirectory::new(
            database.attendees.clone(),
        ));
        let auditor: Arc<dyn AuditRecorder> =
            Arc::new(PgAuditRecorder::new(database.audit.clone()));
        let queue: Arc<dyn SyncQueueStore> =
            Arc::new(PgSyncQueueStore::new(database.sync_queue.clone()));

        let notifier: Arc<dyn ConflictNotifier> = if settings.notifications.enabled {
            Arc::new(WebhookNotifier::new(&settings.notifications)?)
        } else {
            Arc::new(NullNotifier::new())
        };

        let guard = CapacityGuard::new(store.clone(), Arc::clone(&directory), ledger);
        let availability = TicketTypeAvailabilityCalculator::new(store.clone());
        let ingress = Arc::new(SyncIngress::new(
            Arc::clone(&queue),
            store.clone(),
            &settings.features,
        ));

        Ok(Self {
            database,
            store,
            guard,
            availability,
            ingress,
            queue,
            directory,
            auditor,
            notifier,
            settings,
        })
    }

    /// Build the queue processor over the shared components. The caller
    /// decides when to `recover()` and `spawn()` it.
    pub fn processor(&self) -> Arc<SyncProcessor> {
        Arc::new(SyncProcessor::new(
            Arc::clone(&self.queue),
            self.guard.clone(),
            Arc::clone(&self.directory),
            Arc::clone(&self.auditor),
            Arc::clone(&self.notifier),
            self.settings.sync.clone(),
        ))
    }

    /// Register an actor for every stored session, with checked-in counts
    /// recounted from the ledger rather than trusted from counter columns.
    pub async fn seed_sessions(&self) -> Result<usize> {
        let sessions = self.database.sessions_for_seeding().await?;
        for session in &sessions {
            self.store.register(session).await;
        }
        info!(count = sessions.len(), "Session actors seeded");
        Ok(sessions.len())
    }

    /// Health check across the engine's moving parts.
    pub async fn health_check(&self) -> ServiceHealthStatus {
        let database_healthy = self
            .database
            .sessions
            .list_all()
            .await
            .is_ok();
        let live_sessions = self.store.session_count().await;

        ServiceHealthStatus {
            database_healthy,
            live_sessions,
            notifications_enabled: self.settings.notifications.enabled,
        }
    }
}

/// Point-in-time engine health.
#[derive(Debug, Clone)]
pub struct ServiceHealthStatus {
    pub database_healthy: bool,
    pub live_sessions: usize,
    pub notifications_enabled: bool,
}

impl ServiceHealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.database_healthy
    }

    pub fn get_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !self.database_healthy {
            issues.push("Database connection failed".to_string());
        }
        if self.live_sessions == 0 {
            issues.push("No session actors are live".to_string());
        }
        issues
    }
}
