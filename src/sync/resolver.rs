//! Check-in conflict resolver
//!
//! Operator-facing surface for `conflict`-status queue entries.
//! Classification re-derives from current authoritative state, never from
//! the stored reason string, so a conflict reported hours ago classifies
//! against what is true now. Conflict entries stay terminal: every
//! resolution leaves the original entry untouched and records an audit
//! trail, and override re-submission enqueues a fresh entry carrying the
//! approving operator.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::capacity::{CheckInLedger, SessionStore};
use crate::models::audit::{AuditAction, AuditEvent};
use crate::models::checkin::CheckIn;
use crate::models::session::SessionKey;
use crate::models::sync::{
    CapacityOverrideAction, NewSyncEntry, SyncAction, SyncQueueEntry, SyncStatus,
};
use crate::services::audit::AuditRecorder;
use crate::services::registration::RegistrationDirectory;
use crate::utils::errors::{DoorListError, Result};
use crate::utils::logging::log_operator_action;

use super::store::SyncQueueStore;

/// What a conflict entry turned out to be, against current state.
#[derive(Debug, Clone)]
pub enum ConflictClass {
    /// The attendee already holds a check-in; the entry is a duplicate.
    DuplicateCheckIn { existing: CheckIn },
    /// The target session is full; admission needs an explicit override.
    CapacityExceeded {
        session: String,
        capacity: i32,
        checked_in: i32,
    },
    /// The session or attendee the entry references no longer resolves.
    StaleReference { detail: String },
}

impl ConflictClass {
    pub fn summary(&self) -> String {
        match self {
            ConflictClass::DuplicateCheckIn { existing } => {
                format!("duplicate of check-in to session {}", existing.session_code)
            }
            ConflictClass::CapacityExceeded {
                session,
                capacity,
                checked_in,
            } => format!("session {} at capacity ({}/{})", session, checked_in, capacity),
            ConflictClass::StaleReference { detail } => format!("stale reference: {}", detail),
        }
    }
}

pub struct CheckInConflictResolver {
    queue: Arc<dyn SyncQueueStore>,
    ledger: Arc<dyn CheckInLedger>,
    directory: Arc<dyn RegistrationDirectory>,
    store: SessionStore,
    auditor: Arc<dyn AuditRecorder>,
}

impl CheckInConflictResolver {
    pub fn new(
        queue: Arc<dyn SyncQueueStore>,
        ledger: Arc<dyn CheckInLedger>,
        directory: Arc<dyn RegistrationDirectory>,
        store: SessionStore,
        auditor: Arc<dyn AuditRecorder>,
    ) -> Self {
        Self {
            queue,
            ledger,
            directory,
            store,
            auditor,
        }
    }

    /// Conflict entries awaiting an operator for one event, oldest first.
    pub async fn pending_conflicts(&self, event_id: Uuid) -> Result<Vec<SyncQueueEntry>> {
        self.queue.list_conflicts(event_id).await
    }

    /// Classify one conflict entry against current authoritative state.
    pub async fn classify(&self, entry: &SyncQueueEntry) -> Result<ConflictClass> {
        self.ensure_conflict(entry)?;

        if let Some(existing) = self
            .ledger
            .find_for_attendee(entry.action.attendee_id())
            .await?
        {
            return Ok(ConflictClass::DuplicateCheckIn { existing });
        }

        if self
            .directory
            .find(entry.action.attendee_id())
            .await?
            .is_none()
        {
            return Ok(ConflictClass::StaleReference {
                detail: format!("attendee {} no longer exists", entry.action.attendee_id()),
            });
        }

        let Some(code) = entry.action.session_code() else {
            // A conflicted status update with a live attendee: the requested
            // transition was illegal against state that has since moved on.
            return Ok(ConflictClass::StaleReference {
                detail: "registration state changed since the action was recorded".to_string(),
            });
        };

        let key = SessionKey::new(entry.event_id, code);
        match self.store.snapshot(&key).await? {
            Some(snapshot) => Ok(ConflictClass::CapacityExceeded {
                session: key.code,
                capacity: snapshot.capacity,
                checked_in: snapshot.checked_in_count,
            }),
            None => Ok(ConflictClass::StaleReference {
                detail: format!("session {} is no longer live", key),
            }),
        }
    }

    /// Discard a conflict entry: no state change beyond the explanatory
    /// audit record. Used for duplicates and stale references.
    pub async fn resolve_discard(
        &self,
        entry: &SyncQueueEntry,
        operator_id: Uuid,
        note: Option<&str>,
    ) -> Result<ConflictClass> {
        let class = self.classify(entry).await?;

        self.auditor
            .record(
                AuditEvent::new(
                    entry.event_id,
                    AuditAction::DataUpdate,
                    format!(
                        "Conflict entry {} discarded ({}){}",
                        entry.id,
                        class.summary(),
                        note.map(|n| format!(": {}", n)).unwrap_or_default()
                    ),
                )
                .attendee(entry.action.attendee_id())
                .actor(operator_id),
            )
            .await?;

        log_operator_action(
            operator_id,
            "discard-conflict",
            Some(&entry.id.to_string()),
            note,
        );
        Ok(class)
    }

    /// Re-submit a capacity conflict with an explicit, audited override:
    /// enqueues a fresh `capacity-override` entry referencing the original.
    /// The original entry keeps its `conflict` status. Refused for entries
    /// that classify as duplicates or stale references.
    pub async fn resolve_with_override(
        &self,
        entry: &SyncQueueEntry,
        operator_id: Uuid,
        notes: Option<String>,
    ) -> Result<SyncQueueEntry> {
        let class = self.classify(entry).await?;
        match class {
            ConflictClass::CapacityExceeded { .. } => {}
            other => {
                return Err(DoorListError::InvalidInput(format!(
                    "Entry {} does not need an override: {}",
                    entry.id,
                    other.summary()
                )));
            }
        }

        let (session_code, check_in_time) = match &entry.action {
            SyncAction::CheckIn(action) => (action.session_code.clone(), action.check_in_time),
            SyncAction::ManualEntry(action) => {
                (action.session_code.clone(), action.check_in_time)
            }
            SyncAction::CapacityOverride(action) => {
                (action.session_code.clone(), action.check_in_time)
            }
            SyncAction::StatusUpdate(_) => {
                return Err(DoorListError::InvalidInput(
                    "Status updates cannot be re-submitted with an override".to_string(),
                ));
            }
        };

        let resubmitted = self
            .queue
            .enqueue(NewSyncEntry {
                event_id: entry.event_id,
                device_id: entry.device_id.clone(),
                submitted_by: operator_id,
                action: SyncAction::CapacityOverride(CapacityOverrideAction {
                    attendee_id: entry.action.attendee_id(),
                    session_code,
                    staff_member_id: entry.action.staff_member_id(),
                    approved_by: operator_id,
                    original_entry_id: Some(entry.id),
                    check_in_time,
                    notes,
                }),
                local_timestamp: Utc::now(),
            })
            .await?;

        self.auditor
            .record(
                AuditEvent::new(
                    entry.event_id,
                    AuditAction::DataUpdate,
                    format!(
                        "Conflict entry {} re-submitted as capacity override entry {}",
                        entry.id, resubmitted.id
                    ),
                )
                .attendee(entry.action.attendee_id())
                .actor(operator_id),
            )
            .await?;

        log_operator_action(
            operator_id,
            "resubmit-with-override",
            Some(&entry.id.to_string()),
            None,
        );
        info!(
            original = %entry.id,
            resubmitted = %resubmitted.id,
            operator_id = %operator_id,
            "Capacity conflict re-submitted with override"
        );
        Ok(resubmitted)
    }

    fn ensure_conflict(&self, entry: &SyncQueueEntry) -> Result<()> {
        match &entry.status {
            SyncStatus::Conflict { .. } => Ok(()),
            other => Err(DoorListError::InvalidStateTransition {
                from: other.kind_str().to_string(),
                to: "resolved".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::MemoryCheckInLedger;
    use crate::models::attendee::RegistrationStatus;
    use crate::models::sync::CheckInAction;
    use crate::services::audit::MemoryAuditRecorder;
    use crate::services::registration::MemoryRegistrationDirectory;
    use crate::sync::store::MemorySyncQueueStore;

    struct Fixture {
        resolver: CheckInConflictResolver,
        queue: Arc<MemorySyncQueueStore>,
        directory: Arc<MemoryRegistrationDirectory>,
        auditor: Arc<MemoryAuditRecorder>,
        event_id: Uuid,
    }

    async fn fixture(capacity: i32, checked_in: i32) -> Fixture {
        let ledger: Arc<dyn CheckInLedger> = Arc::new(MemoryCheckInLedger::new());
        let store = SessionStore::new(Arc::clone(&ledger), 16);
        let event_id = Uuid::new_v4();
        store
            .register_counts(
                SessionKey::new(event_id, "S1"),
                capacity,
                checked_in,
                checked_in,
            )
            .await;

        let queue = Arc::new(MemorySyncQueueStore::new());
        let directory = Arc::new(MemoryRegistrationDirectory::new());
        let auditor = Arc::new(MemoryAuditRecorder::new());
        let resolver = CheckInConflictResolver::new(
            Arc::clone(&queue) as Arc<dyn SyncQueueStore>,
            ledger,
            Arc::clone(&directory) as Arc<dyn RegistrationDirectory>,
            store,
            Arc::clone(&auditor) as Arc<dyn AuditRecorder>,
        );

        Fixture {
            resolver,
            queue,
            directory,
            auditor,
            event_id,
        }
    }

    async fn conflicted_entry(fx: &Fixture, attendee_id: Uuid) -> SyncQueueEntry {
        let entry = fx
            .queue
            .enqueue(NewSyncEntry {
                event_id: fx.event_id,
                device_id: "door-1".to_string(),
                submitted_by: Uuid::new_v4(),
                action: SyncAction::CheckIn(CheckInAction {
                    attendee_id,
                    session_code: "S1".to_string(),
                    staff_member_id: Uuid::new_v4(),
                    check_in_time: Utc::now(),
                    notes: None,
                    override_capacity: false,
                }),
                local_timestamp: Utc::now(),
            })
            .await
            .unwrap();
        fx.queue.claim(entry.id).await.unwrap().unwrap();
        fx.queue
            .mark_conflict(entry.id, "session S1 at capacity (1/1)")
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_classify_capacity_exceeded() {
        let fx = fixture(1, 1).await;
        let attendee = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Confirmed, true)
            .await;
        let entry = conflicted_entry(&fx, attendee.id).await;

        match fx.resolver.classify(&entry).await.unwrap() {
            ConflictClass::CapacityExceeded {
                capacity,
                checked_in,
                ..
            } => {
                assert_eq!(capacity, 1);
                assert_eq!(checked_in, 1);
            }
            other => panic!("expected capacity class, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_classify_stale_attendee() {
        let fx = fixture(1, 1).await;
        let entry = conflicted_entry(&fx, Uuid::new_v4()).await;

        assert!(matches!(
            fx.resolver.classify(&entry).await.unwrap(),
            ConflictClass::StaleReference { .. }
        ));
    }

    #[tokio::test]
    async fn test_classify_refuses_non_conflict_entries() {
        let fx = fixture(1, 0).await;
        let attendee = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Confirmed, true)
            .await;
        let pending = fx
            .queue
            .enqueue(NewSyncEntry {
                event_id: fx.event_id,
                device_id: "door-1".to_string(),
                submitted_by: Uuid::new_v4(),
                action: SyncAction::CheckIn(CheckInAction {
                    attendee_id: attendee.id,
                    session_code: "S1".to_string(),
                    staff_member_id: Uuid::new_v4(),
                    check_in_time: Utc::now(),
                    notes: None,
                    override_capacity: false,
                }),
                local_timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let err = fx.resolver.classify(&pending).await.unwrap_err();
        assert!(matches!(err, DoorListError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_resolve_with_override_enqueues_fresh_entry() {
        let fx = fixture(1, 1).await;
        let attendee = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Confirmed, true)
            .await;
        let entry = conflicted_entry(&fx, attendee.id).await;
        let operator = Uuid::new_v4();

        let resubmitted = fx
            .resolver
            .resolve_with_override(&entry, operator, Some("approved at the desk".to_string()))
            .await
            .unwrap();

        assert_ne!(resubmitted.id, entry.id);
        assert!(matches!(resubmitted.status, SyncStatus::Pending));
        match &resubmitted.action {
            SyncAction::CapacityOverride(action) => {
                assert_eq!(action.approved_by, operator);
                assert_eq!(action.original_entry_id, Some(entry.id));
                assert_eq!(action.attendee_id, attendee.id);
            }
            other => panic!("expected capacity override action, got {:?}", other),
        }

        // The original stays parked in conflict.
        let original = fx.queue.find(entry.id).await.unwrap().unwrap();
        assert!(matches!(original.status, SyncStatus::Conflict { .. }));
        assert_eq!(fx.auditor.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_discard_records_audit_only() {
        let fx = fixture(1, 1).await;
        let entry = conflicted_entry(&fx, Uuid::new_v4()).await;
        let operator = Uuid::new_v4();

        let class = fx
            .resolver
            .resolve_discard(&entry, operator, Some("device retired"))
            .await
            .unwrap();
        assert!(matches!(class, ConflictClass::StaleReference { .. }));

        let entries = fx.auditor.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::DataUpdate);
        assert_eq!(entries[0].created_by, Some(operator));
        assert_eq!(fx.queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_override_refused_for_stale_reference() {
        let fx = fixture(1, 1).await;
        let entry = conflicted_entry(&fx, Uuid::new_v4()).await;

        let err = fx
            .resolver
            .resolve_with_override(&entry, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DoorListError::InvalidInput(_)));
        assert_eq!(fx.queue.len().await, 1);
    }
}
