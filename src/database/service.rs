//! Database service layer
//!
//! This module provides a high-level interface to database operations

use uuid::Uuid;

use crate::database::{
    AttendeeRepository, AuditRepository, CheckInRepository, DatabasePool, SessionRepository,
    SyncQueueRepository, TicketTypeRepository,
};
use crate::models::attendee::{CreateAttendeeRequest, EventAttendee};
use crate::models::session::{CreateSessionRequest, EventSession};
use crate::models::ticket::{CreateTicketTypeRequest, TicketType};
use crate::utils::errors::DoorListError;

#[derive(Debug, Clone)]
pub struct DatabaseService {
    pub sessions: SessionRepository,
    pub tickets: TicketTypeRepository,
    pub attendees: AttendeeRepository,
    pub check_ins: CheckInRepository,
    pub sync_queue: SyncQueueRepository,
    pub audit: AuditRepository,
}

impl DatabaseService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            sessions: SessionRepository::new(pool.clone()),
            tickets: TicketTypeRepository::new(pool.clone()),
            attendees: AttendeeRepository::new(pool.clone()),
            check_ins: CheckInRepository::new(pool.clone()),
            sync_queue: SyncQueueRepository::new(pool.clone()),
            audit: AuditRepository::new(pool),
        }
    }

    /// Create a session after checking the code is free within its event
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<EventSession, DoorListError> {
        if request.capacity <= 0 {
            return Err(DoorListError::Validation(
                "Session capacity must be positive".to_string(),
            ));
        }
        if !crate::utils::helpers::is_valid_session_code(&request.session_code) {
            return Err(DoorListError::Validation(format!(
                "Invalid session code '{}'",
                request.session_code
            )));
        }
        if let Some(existing) = self
            .sessions
            .find_by_key(request.event_id, &request.session_code)
            .await?
        {
            return Err(DoorListError::Validation(format!(
                "Session code '{}' already used by session '{}'",
                existing.session_code, existing.name
            )));
        }

        self.sessions.create(request).await
    }

    /// Create a ticket type after checking every bundled session belongs to
    /// the same event
    pub async fn create_ticket_type(
        &self,
        request: CreateTicketTypeRequest,
    ) -> Result<TicketType, DoorListError> {
        request.validate()?;

        for code in &request.session_codes {
            if self
                .sessions
                .find_by_key(request.event_id, code)
                .await?
                .is_none()
            {
                return Err(DoorListError::Validation(format!(
                    "Ticket '{}' bundles unknown session '{}'",
                    request.name, code
                )));
            }
        }

        self.tickets.create(request).await
    }

    /// Register an attendee, enforcing one registration per (event, user)
    pub async fn register_attendee(
        &self,
        request: CreateAttendeeRequest,
    ) -> Result<EventAttendee, DoorListError> {
        if let Some(existing) = self
            .attendees
            .find_by_event_and_user(request.event_id, request.user_id)
            .await?
        {
            return Err(DoorListError::Validation(format!(
                "User {} is already registered for event {} (status {})",
                request.user_id, request.event_id, existing.registration_status
            )));
        }

        self.attendees.create(request).await
    }

    /// Sessions for the capacity store, with checked-in counts recomputed
    /// from the check-in rows rather than trusted from the counter column
    pub async fn sessions_for_seeding(&self) -> Result<Vec<EventSession>, DoorListError> {
        let sessions = self.sessions.list_all().await?;
        let mut seeded = Vec::with_capacity(sessions.len());
        for session in sessions {
            let recounted = self
                .sessions
                .recount_checked_in(session.event_id, &session.session_code)
                .await?;
            seeded.push(recounted);
        }
        Ok(seeded)
    }

    /// Counters and queue totals for one event
    pub async fn event_stats(&self, event_id: Uuid) -> Result<serde_json::Value, DoorListError> {
        let sessions = self.sessions.list_for_event(event_id).await?;
        let attendee_counts = self.attendees.count_by_status(event_id).await?;
        let queue_counts = self.sync_queue.counts_by_status(event_id).await?;
        let override_count = self.audit.count_overrides(event_id).await?;

        let stats = serde_json::json!({
            "sessions": sessions,
            "attendees_by_status": attendee_counts
                .into_iter()
                .collect::<std::collections::BTreeMap<String, i64>>(),
            "sync_queue_by_status": queue_counts
                .into_iter()
                .collect::<std::collections::BTreeMap<String, i64>>(),
            "capacity_overrides": override_count,
        });

        Ok(stats)
    }
}
