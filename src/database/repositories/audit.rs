//! Check-in audit log repository implementation
//!
//! Append-only; rows are never updated or deleted by the application.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::audit::{AuditAction, AuditEntry, AuditEvent};
use crate::utils::errors::DoorListError;

#[derive(Clone, Debug)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an audit entry
    pub async fn append(&self, event: AuditEvent) -> Result<AuditEntry, DoorListError> {
        let entry = sqlx::query_as::<_, AuditEntry>(
            r#"
            INSERT INTO check_in_audit_log (id, event_id, event_attendee_id, action_type, action_description, old_values, new_values, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING id, event_id, event_attendee_id, action_type, action_description, old_values, new_values, created_by, created_at
            "#
        )
        .bind(Uuid::new_v4())
        .bind(event.event_id)
        .bind(event.event_attendee_id)
        .bind(event.action.as_str())
        .bind(&event.description)
        .bind(&event.old_values)
        .bind(&event.new_values)
        .bind(event.actor)
        .fetch_one(&self.pool)
        .await?;

        Ok(entry)
    }

    /// List audit entries for an event, newest first
    pub async fn list_for_event(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, DoorListError> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            "SELECT id, event_id, event_attendee_id, action_type, action_description, old_values, new_values, created_by, created_at FROM check_in_audit_log WHERE event_id = $1 ORDER BY created_at DESC LIMIT $2"
        )
        .bind(event_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// List audit entries for one attendee
    pub async fn list_for_attendee(
        &self,
        event_attendee_id: Uuid,
    ) -> Result<Vec<AuditEntry>, DoorListError> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            "SELECT id, event_id, event_attendee_id, action_type, action_description, old_values, new_values, created_by, created_at FROM check_in_audit_log WHERE event_attendee_id = $1 ORDER BY created_at"
        )
        .bind(event_attendee_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// List audit entries of one action type for an event
    pub async fn list_by_action(
        &self,
        event_id: Uuid,
        action: AuditAction,
    ) -> Result<Vec<AuditEntry>, DoorListError> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            "SELECT id, event_id, event_attendee_id, action_type, action_description, old_values, new_values, created_by, created_at FROM check_in_audit_log WHERE event_id = $1 AND action_type = $2 ORDER BY created_at"
        )
        .bind(event_id)
        .bind(action.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Count capacity-override entries for an event
    pub async fn count_overrides(&self, event_id: Uuid) -> Result<i64, DoorListError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM check_in_audit_log WHERE event_id = $1 AND action_type = 'capacity-override'"
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}
