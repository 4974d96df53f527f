//! Event attendee repository implementation
//!
//! Raw column access only; registration-status transition rules live in the
//! registration directory service.

use sqlx::PgPool;
use chrono::Utc;
use uuid::Uuid;

use crate::models::attendee::{CreateAttendeeRequest, EventAttendee, RegistrationStatus};
use crate::utils::errors::DoorListError;

#[derive(Clone)]
#[derive(Debug)]
pub struct AttendeeRepository {
    pool: PgPool,
}

impl AttendeeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new attendee registration
    pub async fn create(
        &self,
        request: CreateAttendeeRequest,
    ) -> Result<EventAttendee, DoorListError> {
        let attendee = sqlx::query_as::<_, EventAttendee>(
            r#"
            INSERT INTO event_attendees (id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, $11, $11)
            RETURNING id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by
            "#
        )
        .bind(Uuid::new_v4())
        .bind(request.event_id)
        .bind(request.user_id)
        .bind(request.registration_status.as_str())
        .bind(&request.ticket_number)
        .bind(request.waitlist_position)
        .bind(request.is_first_time)
        .bind(request.has_completed_waiver)
        .bind(&request.metadata)
        .bind(Utc::now())
        .bind(request.created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(attendee)
    }

    /// Create a registration with a caller-chosen ID, used for walk-ins
    /// whose identifier was minted on the door device
    pub async fn create_with_id(
        &self,
        id: Uuid,
        request: CreateAttendeeRequest,
    ) -> Result<EventAttendee, DoorListError> {
        let attendee = sqlx::query_as::<_, EventAttendee>(
            r#"
            INSERT INTO event_attendees (id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, $11, $11)
            ON CONFLICT (id) DO NOTHING
            RETURNING id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by
            "#
        )
        .bind(id)
        .bind(request.event_id)
        .bind(request.user_id)
        .bind(request.registration_status.as_str())
        .bind(&request.ticket_number)
        .bind(request.waitlist_position)
        .bind(request.is_first_time)
        .bind(request.has_completed_waiver)
        .bind(&request.metadata)
        .bind(Utc::now())
        .bind(request.created_by)
        .fetch_optional(&self.pool)
        .await?;

        match attendee {
            Some(attendee) => Ok(attendee),
            // Lost an insert race for the same device-minted ID.
            None => self
                .find_by_id(id)
                .await?
                .ok_or(DoorListError::AttendeeNotFound { attendee_id: id }),
        }
    }

    /// Find attendee by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<EventAttendee>, DoorListError> {
        let attendee = sqlx::query_as::<_, EventAttendee>(
            "SELECT id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by FROM event_attendees WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attendee)
    }

    /// Find the one registration for an (event, user) pair
    pub async fn find_by_event_and_user(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<EventAttendee>, DoorListError> {
        let attendee = sqlx::query_as::<_, EventAttendee>(
            "SELECT id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by FROM event_attendees WHERE event_id = $1 AND user_id = $2"
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attendee)
    }

    /// List attendees for an event
    pub async fn list_for_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<EventAttendee>, DoorListError> {
        let attendees = sqlx::query_as::<_, EventAttendee>(
            "SELECT id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by FROM event_attendees WHERE event_id = $1 ORDER BY created_at"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attendees)
    }

    /// List attendees of one status, waitlist ordered by position
    pub async fn list_by_status(
        &self,
        event_id: Uuid,
        status: RegistrationStatus,
    ) -> Result<Vec<EventAttendee>, DoorListError> {
        let attendees = sqlx::query_as::<_, EventAttendee>(
            "SELECT id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by FROM event_attendees WHERE event_id = $1 AND registration_status = $2 ORDER BY waitlist_position NULLS LAST, created_at"
        )
        .bind(event_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(attendees)
    }

    /// Overwrite status and waitlist position
    pub async fn update_status(
        &self,
        id: Uuid,
        status: RegistrationStatus,
        waitlist_position: Option<i32>,
        updated_by: Option<Uuid>,
    ) -> Result<EventAttendee, DoorListError> {
        let attendee = sqlx::query_as::<_, EventAttendee>(
            r#"
            UPDATE event_attendees
            SET registration_status = $2, waitlist_position = $3, updated_at = $4, updated_by = $5
            WHERE id = $1
            RETURNING id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by
            "#
        )
        .bind(id)
        .bind(status.as_str())
        .bind(waitlist_position)
        .bind(Utc::now())
        .bind(updated_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(attendee)
    }

    /// Move an attendee to checked-in, clearing any waitlist position
    pub async fn mark_checked_in(
        &self,
        id: Uuid,
        updated_by: Option<Uuid>,
    ) -> Result<EventAttendee, DoorListError> {
        let attendee = sqlx::query_as::<_, EventAttendee>(
            r#"
            UPDATE event_attendees
            SET registration_status = 'checked-in', waitlist_position = NULL, updated_at = $2, updated_by = $3
            WHERE id = $1
            RETURNING id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by
            "#
        )
        .bind(id)
        .bind(Utc::now())
        .bind(updated_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(attendee)
    }

    /// Record waiver completion
    pub async fn set_waiver_completed(
        &self,
        id: Uuid,
        completed: bool,
        updated_by: Option<Uuid>,
    ) -> Result<EventAttendee, DoorListError> {
        let attendee = sqlx::query_as::<_, EventAttendee>(
            r#"
            UPDATE event_attendees
            SET has_completed_waiver = $2, updated_at = $3, updated_by = $4
            WHERE id = $1
            RETURNING id, event_id, user_id, registration_status, ticket_number, waitlist_position, is_first_time, has_completed_waiver, metadata, created_at, updated_at, created_by, updated_by
            "#
        )
        .bind(id)
        .bind(completed)
        .bind(Utc::now())
        .bind(updated_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(attendee)
    }

    /// Count attendees per status for an event
    pub async fn count_by_status(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<(String, i64)>, DoorListError> {
        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT registration_status, COUNT(*) FROM event_attendees WHERE event_id = $1 GROUP BY registration_status ORDER BY registration_status"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }

    /// Delete attendee registration
    pub async fn delete(&self, id: Uuid) -> Result<(), DoorListError> {
        sqlx::query("DELETE FROM event_attendees WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
