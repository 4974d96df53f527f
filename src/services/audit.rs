//! Audit recorder service implementation
//!
//! Called once per accepted state transition. Recording failures propagate
//! to the caller; an admission whose audit could not be written is treated
//! as a transient failure, not silently unaudited.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::database::repositories::AuditRepository;
use crate::models::audit::{AuditAction, AuditEntry, AuditEvent};
use crate::utils::errors::Result;

#[async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<AuditEntry>;
}

/// PostgreSQL-backed recorder.
#[derive(Clone)]
pub struct PgAuditRecorder {
    repository: AuditRepository,
}

impl PgAuditRecorder {
    pub fn new(repository: AuditRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl AuditRecorder for PgAuditRecorder {
    async fn record(&self, event: AuditEvent) -> Result<AuditEntry> {
        debug!(
            event_id = %event.event_id,
            action = %event.action,
            "Recording audit entry"
        );
        self.repository.append(event).await
    }
}

/// In-memory recorder for local mode and tests.
#[derive(Clone, Default)]
pub struct MemoryAuditRecorder {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl MemoryAuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    pub async fn count_by_action(&self, action: AuditAction) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.action == action)
            .count()
    }

    pub async fn entries_for_attendee(&self, attendee_id: Uuid) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.event_attendee_id == Some(attendee_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditRecorder for MemoryAuditRecorder {
    async fn record(&self, event: AuditEvent) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            event_id: event.event_id,
            event_attendee_id: event.event_attendee_id,
            action: event.action,
            description: event.description,
            old_values: event.old_values,
            new_values: event.new_values,
            created_by: event.actor,
            created_at: chrono::Utc::now(),
        };
        self.entries.write().await.push(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_recorder_appends() {
        let recorder = MemoryAuditRecorder::new();
        let event_id = Uuid::new_v4();
        let attendee_id = Uuid::new_v4();

        recorder
            .record(
                AuditEvent::new(event_id, AuditAction::CheckIn, "Attendee checked in to S1")
                    .attendee(attendee_id)
                    .actor(Uuid::new_v4()),
            )
            .await
            .unwrap();
        recorder
            .record(AuditEvent::new(
                event_id,
                AuditAction::CapacityOverride,
                "Override admission to S1",
            ))
            .await
            .unwrap();

        assert_eq!(recorder.entries().await.len(), 2);
        assert_eq!(
            recorder.count_by_action(AuditAction::CapacityOverride).await,
            1
        );
        assert_eq!(recorder.entries_for_attendee(attendee_id).await.len(), 1);
    }
}
