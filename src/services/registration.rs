//! Registration directory service implementation
//!
//! The engine's view of the registration subsystem. It reads registrations
//! and mutates them in exactly two ways: moving an admitted attendee to
//! checked-in, and applying operator status updates under the closed
//! transition table. Walk-ins arrive here as device-minted registrations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::repositories::AttendeeRepository;
use crate::models::attendee::{CreateAttendeeRequest, EventAttendee, RegistrationStatus};
use crate::models::checkin::ManualEntryData;
use crate::utils::errors::{DoorListError, Result};

/// Outcome of a status update. `changed` is false for an idempotent
/// reapplication of the same target status.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub attendee: EventAttendee,
    pub old_status: RegistrationStatus,
    pub new_status: RegistrationStatus,
    pub changed: bool,
}

#[async_trait]
pub trait RegistrationDirectory: Send + Sync {
    async fn find(&self, attendee_id: Uuid) -> Result<Option<EventAttendee>>;

    /// Return the registration for a device-minted walk-in, creating it on
    /// first sight. The created registration is confirmed with the waiver
    /// flag set, since door staff collect a paper waiver before entry.
    async fn ensure_walk_in(
        &self,
        event_id: Uuid,
        attendee_id: Uuid,
        data: &ManualEntryData,
        staff_member_id: Uuid,
    ) -> Result<EventAttendee>;

    /// Move an attendee to checked-in, clearing any waitlist position.
    /// Returns false when the attendee was already checked in.
    async fn mark_checked_in(&self, attendee_id: Uuid, actor: Uuid) -> Result<bool>;

    /// Apply an operator status update under the transition table.
    /// Reapplying the current status is a no-op, not an error.
    async fn update_status(
        &self,
        attendee_id: Uuid,
        new_status: RegistrationStatus,
        actor: Uuid,
    ) -> Result<StatusChange>;
}

fn walk_in_request(
    event_id: Uuid,
    data: &ManualEntryData,
    staff_member_id: Uuid,
) -> CreateAttendeeRequest {
    CreateAttendeeRequest {
        event_id,
        user_id: Uuid::new_v4(),
        registration_status: RegistrationStatus::Confirmed,
        ticket_number: None,
        waitlist_position: None,
        is_first_time: true,
        has_completed_waiver: true,
        metadata: json!({
            "walkIn": true,
            "name": data.name,
            "email": data.email,
            "phone": data.phone,
        }),
        created_by: Some(staff_member_id),
    }
}

/// PostgreSQL-backed directory.
#[derive(Clone)]
pub struct PgRegistrationDirectory {
    attendees: AttendeeRepository,
}

impl PgRegistrationDirectory {
    pub fn new(attendees: AttendeeRepository) -> Self {
        Self { attendees }
    }
}

#[async_trait]
impl RegistrationDirectory for PgRegistrationDirectory {
    async fn find(&self, attendee_id: Uuid) -> Result<Option<EventAttendee>> {
        self.attendees.find_by_id(attendee_id).await
    }

    async fn ensure_walk_in(
        &self,
        event_id: Uuid,
        attendee_id: Uuid,
        data: &ManualEntryData,
        staff_member_id: Uuid,
    ) -> Result<EventAttendee> {
        if let Some(existing) = self.attendees.find_by_id(attendee_id).await? {
            return Ok(existing);
        }

        data.validate()?;
        let attendee = self
            .attendees
            .create_with_id(attendee_id, walk_in_request(event_id, data, staff_member_id))
            .await?;
        info!(
            attendee_id = %attendee.id,
            %event_id,
            name = %data.name,
            "Walk-in registration created"
        );
        Ok(attendee)
    }

    async fn mark_checked_in(&self, attendee_id: Uuid, actor: Uuid) -> Result<bool> {
        let attendee = self
            .attendees
            .find_by_id(attendee_id)
            .await?
            .ok_or(DoorListError::AttendeeNotFound { attendee_id })?;

        if attendee.registration_status == RegistrationStatus::CheckedIn {
            return Ok(false);
        }

        self.attendees.mark_checked_in(attendee_id, Some(actor)).await?;
        Ok(true)
    }

    async fn update_status(
        &self,
        attendee_id: Uuid,
        new_status: RegistrationStatus,
        actor: Uuid,
    ) -> Result<StatusChange> {
        let attendee = self
            .attendees
            .find_by_id(attendee_id)
            .await?
            .ok_or(DoorListError::AttendeeNotFound { attendee_id })?;
        let old_status = attendee.registration_status;

        if old_status == new_status {
            debug!(%attendee_id, status = %new_status, "Status already applied");
            return Ok(StatusChange {
                attendee,
                old_status,
                new_status,
                changed: false,
            });
        }

        if !old_status.can_transition_to(new_status) {
            return Err(DoorListError::InvalidStateTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }

        let updated = self
            .attendees
            .update_status(attendee_id, new_status, None, Some(actor))
            .await?;
        info!(
            %attendee_id,
            from = %old_status,
            to = %new_status,
            "Registration status updated"
        );
        Ok(StatusChange {
            attendee: updated,
            old_status,
            new_status,
            changed: true,
        })
    }
}

/// In-memory directory for local mode and tests.
#[derive(Clone, Default)]
pub struct MemoryRegistrationDirectory {
    inner: Arc<RwLock<HashMap<Uuid, EventAttendee>>>,
}

impl MemoryRegistrationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a registration with the given status and waiver state,
    /// returning it.
    pub async fn seed(
        &self,
        event_id: Uuid,
        status: RegistrationStatus,
        has_completed_waiver: bool,
    ) -> EventAttendee {
        let now = chrono::Utc::now();
        let attendee = EventAttendee {
            id: Uuid::new_v4(),
            event_id,
            user_id: Uuid::new_v4(),
            registration_status: status,
            ticket_number: None,
            waitlist_position: match status {
                RegistrationStatus::Waitlist => Some(1),
                _ => None,
            },
            is_first_time: false,
            has_completed_waiver,
            metadata: json!({}),
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
        };
        self.inner
            .write()
            .await
            .insert(attendee.id, attendee.clone());
        attendee
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl RegistrationDirectory for MemoryRegistrationDirectory {
    async fn find(&self, attendee_id: Uuid) -> Result<Option<EventAttendee>> {
        Ok(self.inner.read().await.get(&attendee_id).cloned())
    }

    async fn ensure_walk_in(
        &self,
        event_id: Uuid,
        attendee_id: Uuid,
        data: &ManualEntryData,
        staff_member_id: Uuid,
    ) -> Result<EventAttendee> {
        let mut attendees = self.inner.write().await;
        if let Some(existing) = attendees.get(&attendee_id) {
            return Ok(existing.clone());
        }

        data.validate()?;
        let request = walk_in_request(event_id, data, staff_member_id);
        let now = chrono::Utc::now();
        let attendee = EventAttendee {
            id: attendee_id,
            event_id: request.event_id,
            user_id: request.user_id,
            registration_status: request.registration_status,
            ticket_number: request.ticket_number,
            waitlist_position: request.waitlist_position,
            is_first_time: request.is_first_time,
            has_completed_waiver: request.has_completed_waiver,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
            created_by: request.created_by,
            updated_by: request.created_by,
        };
        attendees.insert(attendee_id, attendee.clone());
        Ok(attendee)
    }

    async fn mark_checked_in(&self, attendee_id: Uuid, actor: Uuid) -> Result<bool> {
        let mut attendees = self.inner.write().await;
        let attendee = attendees
            .get_mut(&attendee_id)
            .ok_or(DoorListError::AttendeeNotFound { attendee_id })?;

        if attendee.registration_status == RegistrationStatus::CheckedIn {
            return Ok(false);
        }

        attendee.registration_status = RegistrationStatus::CheckedIn;
        attendee.waitlist_position = None;
        attendee.updated_at = chrono::Utc::now();
        attendee.updated_by = Some(actor);
        Ok(true)
    }

    async fn update_status(
        &self,
        attendee_id: Uuid,
        new_status: RegistrationStatus,
        actor: Uuid,
    ) -> Result<StatusChange> {
        let mut attendees = self.inner.write().await;
        let attendee = attendees
            .get_mut(&attendee_id)
            .ok_or(DoorListError::AttendeeNotFound { attendee_id })?;
        let old_status = attendee.registration_status;

        if old_status == new_status {
            return Ok(StatusChange {
                attendee: attendee.clone(),
                old_status,
                new_status,
                changed: false,
            });
        }

        if !old_status.can_transition_to(new_status) {
            return Err(DoorListError::InvalidStateTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }

        attendee.registration_status = new_status;
        attendee.waitlist_position = None;
        attendee.updated_at = chrono::Utc::now();
        attendee.updated_by = Some(actor);
        Ok(StatusChange {
            attendee: attendee.clone(),
            old_status,
            new_status,
            changed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_data() -> ManualEntryData {
        ManualEntryData {
            name: "Door Guest".to_string(),
            email: "guest@example.com".to_string(),
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_ensure_walk_in_is_idempotent() {
        let directory = MemoryRegistrationDirectory::new();
        let event_id = Uuid::new_v4();
        let walk_in_id = Uuid::new_v4();
        let staff = Uuid::new_v4();

        let first = directory
            .ensure_walk_in(event_id, walk_in_id, &manual_data(), staff)
            .await
            .unwrap();
        let second = directory
            .ensure_walk_in(event_id, walk_in_id, &manual_data(), staff)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.user_id, second.user_id);
        assert_eq!(directory.len().await, 1);
        assert!(first.has_completed_waiver);
        assert_eq!(first.metadata["walkIn"], json!(true));
    }

    #[tokio::test]
    async fn test_mark_checked_in_reports_change() {
        let directory = MemoryRegistrationDirectory::new();
        let attendee = directory
            .seed(Uuid::new_v4(), RegistrationStatus::Waitlist, true)
            .await;
        let actor = Uuid::new_v4();

        assert!(directory.mark_checked_in(attendee.id, actor).await.unwrap());
        assert!(!directory.mark_checked_in(attendee.id, actor).await.unwrap());

        let stored = directory.find(attendee.id).await.unwrap().unwrap();
        assert_eq!(stored.registration_status, RegistrationStatus::CheckedIn);
        assert_eq!(stored.waitlist_position, None);
    }

    #[tokio::test]
    async fn test_update_status_enforces_transitions() {
        let directory = MemoryRegistrationDirectory::new();
        let attendee = directory
            .seed(Uuid::new_v4(), RegistrationStatus::Confirmed, true)
            .await;
        let actor = Uuid::new_v4();

        let change = directory
            .update_status(attendee.id, RegistrationStatus::NoShow, actor)
            .await
            .unwrap();
        assert!(change.changed);
        assert_eq!(change.old_status, RegistrationStatus::Confirmed);

        // Direct entry into checked-in is reserved for admissions.
        let err = directory
            .update_status(attendee.id, RegistrationStatus::CheckedIn, actor)
            .await
            .unwrap_err();
        assert!(matches!(err, DoorListError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_update_status_reapplication_is_noop() {
        let directory = MemoryRegistrationDirectory::new();
        let attendee = directory
            .seed(Uuid::new_v4(), RegistrationStatus::NoShow, true)
            .await;

        let change = directory
            .update_status(attendee.id, RegistrationStatus::NoShow, Uuid::new_v4())
            .await
            .unwrap();
        assert!(!change.changed);
    }

    #[tokio::test]
    async fn test_unknown_attendee_is_stale() {
        let directory = MemoryRegistrationDirectory::new();
        let err = directory
            .update_status(Uuid::new_v4(), RegistrationStatus::Confirmed, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(err.is_stale_reference());
    }
}
