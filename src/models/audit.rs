//! Check-in audit log model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::utils::errors::DoorListError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    CheckIn,
    ManualEntry,
    CapacityOverride,
    StatusChange,
    DataUpdate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CheckIn => "check-in",
            AuditAction::ManualEntry => "manual-entry",
            AuditAction::CapacityOverride => "capacity-override",
            AuditAction::StatusChange => "status-change",
            AuditAction::DataUpdate => "data-update",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = DoorListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check-in" => Ok(AuditAction::CheckIn),
            "manual-entry" => Ok(AuditAction::ManualEntry),
            "capacity-override" => Ok(AuditAction::CapacityOverride),
            "status-change" => Ok(AuditAction::StatusChange),
            "data-update" => Ok(AuditAction::DataUpdate),
            other => Err(DoorListError::InvalidInput(format!(
                "Unknown audit action: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one accepted state transition. The attendee
/// reference is nullable so audit history survives attendee deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub event_attendee_id: Option<Uuid>,
    pub action: AuditAction,
    pub description: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    /// Absent for system-initiated actions.
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for AuditEntry {
    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error> {
        let action_raw: String = row.try_get("action_type")?;
        let action = action_raw
            .parse::<AuditAction>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "action_type".into(),
                source: Box::new(e),
            })?;

        Ok(AuditEntry {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            event_attendee_id: row.try_get("event_attendee_id")?,
            action,
            description: row.try_get("action_description")?,
            old_values: row.try_get("old_values")?,
            new_values: row.try_get("new_values")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Recording shape handed to the audit recorder: one call per accepted
/// state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_attendee_id: Option<Uuid>,
    pub action: AuditAction,
    pub description: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub actor: Option<Uuid>,
}

impl AuditEvent {
    pub fn new(event_id: Uuid, action: AuditAction, description: impl Into<String>) -> Self {
        Self {
            event_id,
            event_attendee_id: None,
            action,
            description: description.into(),
            old_values: None,
            new_values: None,
            actor: None,
        }
    }

    pub fn attendee(mut self, attendee_id: Uuid) -> Self {
        self.event_attendee_id = Some(attendee_id);
        self
    }

    pub fn old_values(mut self, values: serde_json::Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: serde_json::Value) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn actor(mut self, actor: Uuid) -> Self {
        self.actor = Some(actor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_round_trip() {
        for action in [
            AuditAction::CheckIn,
            AuditAction::ManualEntry,
            AuditAction::CapacityOverride,
            AuditAction::StatusChange,
            AuditAction::DataUpdate,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("checkin".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_audit_event_builder() {
        let event_id = Uuid::new_v4();
        let attendee_id = Uuid::new_v4();
        let actor = Uuid::new_v4();

        let event = AuditEvent::new(event_id, AuditAction::CapacityOverride, "Override approved")
            .attendee(attendee_id)
            .new_values(serde_json::json!({"overrideCapacity": true}))
            .actor(actor);

        assert_eq!(event.event_attendee_id, Some(attendee_id));
        assert_eq!(event.actor, Some(actor));
        assert!(event.old_values.is_none());
        assert_eq!(event.action, AuditAction::CapacityOverride);
    }
}
