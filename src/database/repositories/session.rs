//! Event session repository implementation

use sqlx::PgPool;
use chrono::Utc;
use uuid::Uuid;

use crate::models::session::{CreateSessionRequest, EventSession};
use crate::utils::errors::DoorListError;

#[derive(Clone, Debug)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new session
    pub async fn create(
        &self,
        request: CreateSessionRequest,
    ) -> Result<EventSession, DoorListError> {
        let session = sqlx::query_as::<_, EventSession>(
            r#"
            INSERT INTO event_sessions (id, event_id, session_code, name, session_date, start_time, end_time, capacity, registered_count, checked_in_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 0, $9, $9)
            RETURNING id, event_id, session_code, name, session_date, start_time, end_time, capacity, registered_count, checked_in_count, created_at, updated_at
            "#
        )
        .bind(Uuid::new_v4())
        .bind(request.event_id)
        .bind(&request.session_code)
        .bind(&request.name)
        .bind(request.session_date)
        .bind(request.start_time)
        .bind(request.end_time)
        .bind(request.capacity)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Find session by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<EventSession>, DoorListError> {
        let session = sqlx::query_as::<_, EventSession>(
            "SELECT id, event_id, session_code, name, session_date, start_time, end_time, capacity, registered_count, checked_in_count, created_at, updated_at FROM event_sessions WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Find session by its event and short code
    pub async fn find_by_key(
        &self,
        event_id: Uuid,
        session_code: &str,
    ) -> Result<Option<EventSession>, DoorListError> {
        let session = sqlx::query_as::<_, EventSession>(
            "SELECT id, event_id, session_code, name, session_date, start_time, end_time, capacity, registered_count, checked_in_count, created_at, updated_at FROM event_sessions WHERE event_id = $1 AND session_code = $2"
        )
        .bind(event_id)
        .bind(session_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// List sessions for an event in schedule order
    pub async fn list_for_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<EventSession>, DoorListError> {
        let sessions = sqlx::query_as::<_, EventSession>(
            "SELECT id, event_id, session_code, name, session_date, start_time, end_time, capacity, registered_count, checked_in_count, created_at, updated_at FROM event_sessions WHERE event_id = $1 ORDER BY session_date, start_time, session_code"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// List every session, for seeding counters at startup
    pub async fn list_all(&self) -> Result<Vec<EventSession>, DoorListError> {
        let sessions = sqlx::query_as::<_, EventSession>(
            "SELECT id, event_id, session_code, name, session_date, start_time, end_time, capacity, registered_count, checked_in_count, created_at, updated_at FROM event_sessions ORDER BY event_id, session_date, start_time"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Overwrite the registered count pushed by the registration subsystem
    pub async fn set_registered_count(
        &self,
        event_id: Uuid,
        session_code: &str,
        count: i32,
    ) -> Result<EventSession, DoorListError> {
        let session = sqlx::query_as::<_, EventSession>(
            r#"
            UPDATE event_sessions
            SET registered_count = $3, updated_at = $4
            WHERE event_id = $1 AND session_code = $2
            RETURNING id, event_id, session_code, name, session_date, start_time, end_time, capacity, registered_count, checked_in_count, created_at, updated_at
            "#
        )
        .bind(event_id)
        .bind(session_code)
        .bind(count)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Recompute the checked-in count from the check-in rows themselves
    pub async fn recount_checked_in(
        &self,
        event_id: Uuid,
        session_code: &str,
    ) -> Result<EventSession, DoorListError> {
        let session = sqlx::query_as::<_, EventSession>(
            r#"
            UPDATE event_sessions s
            SET checked_in_count = (
                SELECT COUNT(*) FROM check_ins c
                WHERE c.event_id = s.event_id AND c.session_code = s.session_code
            ),
            updated_at = $3
            WHERE s.event_id = $1 AND s.session_code = $2
            RETURNING id, event_id, session_code, name, session_date, start_time, end_time, capacity, registered_count, checked_in_count, created_at, updated_at
            "#
        )
        .bind(event_id)
        .bind(session_code)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Delete session
    pub async fn delete(&self, id: Uuid) -> Result<(), DoorListError> {
        sqlx::query("DELETE FROM event_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Count sessions for an event
    pub async fn count_for_event(&self, event_id: Uuid) -> Result<i64, DoorListError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM event_sessions WHERE event_id = $1")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }
}
