//! Check-in repository implementation
//!
//! Read side of the check-in table. Inserts go through the ledger, which
//! serializes them behind the session actors.

use sqlx::PgPool;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::checkin::CheckIn;
use crate::utils::errors::DoorListError;

#[derive(Clone, Debug)]
pub struct CheckInRepository {
    pool: PgPool,
}

impl CheckInRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find check-in by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<CheckIn>, DoorListError> {
        let check_in = sqlx::query_as::<_, CheckIn>(
            "SELECT id, event_attendee_id, event_id, session_code, check_in_time, staff_member_id, notes, is_manual_entry, override_capacity, manual_entry_data, created_at, created_by FROM check_ins WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(check_in)
    }

    /// Find the check-in for an attendee, if any
    pub async fn find_by_attendee(
        &self,
        event_attendee_id: Uuid,
    ) -> Result<Option<CheckIn>, DoorListError> {
        let check_in = sqlx::query_as::<_, CheckIn>(
            "SELECT id, event_attendee_id, event_id, session_code, check_in_time, staff_member_id, notes, is_manual_entry, override_capacity, manual_entry_data, created_at, created_by FROM check_ins WHERE event_attendee_id = $1"
        )
        .bind(event_attendee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(check_in)
    }

    /// List check-ins for one session in admission order
    pub async fn list_for_session(
        &self,
        event_id: Uuid,
        session_code: &str,
    ) -> Result<Vec<CheckIn>, DoorListError> {
        let check_ins = sqlx::query_as::<_, CheckIn>(
            "SELECT id, event_attendee_id, event_id, session_code, check_in_time, staff_member_id, notes, is_manual_entry, override_capacity, manual_entry_data, created_at, created_by FROM check_ins WHERE event_id = $1 AND session_code = $2 ORDER BY check_in_time"
        )
        .bind(event_id)
        .bind(session_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(check_ins)
    }

    /// List check-ins for an event
    pub async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<CheckIn>, DoorListError> {
        let check_ins = sqlx::query_as::<_, CheckIn>(
            "SELECT id, event_attendee_id, event_id, session_code, check_in_time, staff_member_id, notes, is_manual_entry, override_capacity, manual_entry_data, created_at, created_by FROM check_ins WHERE event_id = $1 ORDER BY check_in_time"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(check_ins)
    }

    /// List admissions that exceeded nominal capacity
    pub async fn list_overrides_for_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<CheckIn>, DoorListError> {
        let check_ins = sqlx::query_as::<_, CheckIn>(
            "SELECT id, event_attendee_id, event_id, session_code, check_in_time, staff_member_id, notes, is_manual_entry, override_capacity, manual_entry_data, created_at, created_by FROM check_ins WHERE event_id = $1 AND override_capacity = true ORDER BY check_in_time"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(check_ins)
    }

    /// List manual-entry admissions recorded by one staff member
    pub async fn list_by_staff_member(
        &self,
        event_id: Uuid,
        staff_member_id: Uuid,
    ) -> Result<Vec<CheckIn>, DoorListError> {
        let check_ins = sqlx::query_as::<_, CheckIn>(
            "SELECT id, event_attendee_id, event_id, session_code, check_in_time, staff_member_id, notes, is_manual_entry, override_capacity, manual_entry_data, created_at, created_by FROM check_ins WHERE event_id = $1 AND staff_member_id = $2 ORDER BY check_in_time"
        )
        .bind(event_id)
        .bind(staff_member_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(check_ins)
    }

    /// Count check-ins for one session
    pub async fn count_for_session(
        &self,
        event_id: Uuid,
        session_code: &str,
    ) -> Result<i64, DoorListError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM check_ins WHERE event_id = $1 AND session_code = $2",
        )
        .bind(event_id)
        .bind(session_code)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    /// Count check-ins recorded in a time window, for door-flow reporting
    pub async fn count_in_window(
        &self,
        event_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, DoorListError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM check_ins WHERE event_id = $1 AND check_in_time >= $2 AND check_in_time < $3"
        )
        .bind(event_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}
