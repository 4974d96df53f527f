//! Offline sync queue model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::models::attendee::RegistrationStatus;
use crate::models::checkin::ManualEntryData;
use crate::utils::errors::{DoorListError, Result};
use crate::utils::helpers;

/// Hard cap on retry attempts, mirrored by a database check constraint so
/// even a buggy retriever cannot exceed it.
pub const MAX_RETRY_COUNT: i32 = 10;

/// Failed entries below this count are picked up by the automatic re-drive
/// scan; between this and [`MAX_RETRY_COUNT`] only operator-triggered
/// re-drives continue.
pub const AUTO_RETRY_LIMIT: i32 = 5;

/// Admission recorded by a door device for a registered attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInAction {
    pub attendee_id: Uuid,
    pub session_code: String,
    pub staff_member_id: Uuid,
    pub check_in_time: DateTime<Utc>,
    pub notes: Option<String>,
    pub override_capacity: bool,
}

/// Walk-in admission; the device generates the attendee id and captures
/// identity in [`ManualEntryData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualEntryAction {
    pub attendee_id: Uuid,
    pub session_code: String,
    pub staff_member_id: Uuid,
    pub check_in_time: DateTime<Utc>,
    pub manual_entry_data: ManualEntryData,
    pub notes: Option<String>,
    pub override_capacity: bool,
}

/// Registration status transition requested at the door (cancel, no-show,
/// reinstate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateAction {
    pub attendee_id: Uuid,
    pub new_status: RegistrationStatus,
    pub staff_member_id: Uuid,
    pub reason: Option<String>,
}

/// Operator-approved admission past capacity, typically re-submitting a
/// conflicted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityOverrideAction {
    pub attendee_id: Uuid,
    pub session_code: String,
    pub staff_member_id: Uuid,
    pub approved_by: Uuid,
    pub original_entry_id: Option<Uuid>,
    pub check_in_time: DateTime<Utc>,
    pub notes: Option<String>,
}

/// The four queueable door actions with their typed payloads. The
/// (action_type, action_data) column pair exists only at the storage
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncAction {
    CheckIn(CheckInAction),
    ManualEntry(ManualEntryAction),
    StatusUpdate(StatusUpdateAction),
    CapacityOverride(CapacityOverrideAction),
}

impl SyncAction {
    pub fn action_type(&self) -> &'static str {
        match self {
            SyncAction::CheckIn(_) => "check-in",
            SyncAction::ManualEntry(_) => "manual-entry",
            SyncAction::StatusUpdate(_) => "status-update",
            SyncAction::CapacityOverride(_) => "capacity-override",
        }
    }

    /// Serialize the payload for the `action_data` column.
    pub fn payload(&self) -> Result<serde_json::Value> {
        let value = match self {
            SyncAction::CheckIn(action) => serde_json::to_value(action)?,
            SyncAction::ManualEntry(action) => serde_json::to_value(action)?,
            SyncAction::StatusUpdate(action) => serde_json::to_value(action)?,
            SyncAction::CapacityOverride(action) => serde_json::to_value(action)?,
        };
        Ok(value)
    }

    /// Rebuild from the (action_type, action_data) column pair.
    pub fn from_parts(action_type: &str, payload: serde_json::Value) -> Result<Self> {
        match action_type {
            "check-in" => Ok(SyncAction::CheckIn(serde_json::from_value(payload)?)),
            "manual-entry" => Ok(SyncAction::ManualEntry(serde_json::from_value(payload)?)),
            "status-update" => Ok(SyncAction::StatusUpdate(serde_json::from_value(payload)?)),
            "capacity-override" => {
                Ok(SyncAction::CapacityOverride(serde_json::from_value(payload)?))
            }
            other => Err(DoorListError::InvalidInput(format!(
                "Unknown sync action type: {}",
                other
            ))),
        }
    }

    pub fn attendee_id(&self) -> Uuid {
        match self {
            SyncAction::CheckIn(action) => action.attendee_id,
            SyncAction::ManualEntry(action) => action.attendee_id,
            SyncAction::StatusUpdate(action) => action.attendee_id,
            SyncAction::CapacityOverride(action) => action.attendee_id,
        }
    }

    pub fn session_code(&self) -> Option<&str> {
        match self {
            SyncAction::CheckIn(action) => Some(&action.session_code),
            SyncAction::ManualEntry(action) => Some(&action.session_code),
            SyncAction::StatusUpdate(_) => None,
            SyncAction::CapacityOverride(action) => Some(&action.session_code),
        }
    }

    pub fn staff_member_id(&self) -> Uuid {
        match self {
            SyncAction::CheckIn(action) => action.staff_member_id,
            SyncAction::ManualEntry(action) => action.staff_member_id,
            SyncAction::StatusUpdate(action) => action.staff_member_id,
            SyncAction::CapacityOverride(action) => action.staff_member_id,
        }
    }

    /// Ingress validation: malformed actions are rejected synchronously and
    /// never reach `pending`.
    pub fn validate(&self) -> Result<()> {
        if let Some(code) = self.session_code() {
            if !helpers::is_valid_session_code(code) {
                return Err(DoorListError::Validation(format!(
                    "Invalid session code: {}",
                    code
                )));
            }
        }
        if self.attendee_id().is_nil() {
            return Err(DoorListError::Validation(
                "Action requires an attendee id".to_string(),
            ));
        }
        match self {
            SyncAction::ManualEntry(action) => action.manual_entry_data.validate(),
            SyncAction::StatusUpdate(action) => {
                if action.new_status == RegistrationStatus::CheckedIn {
                    return Err(DoorListError::Validation(
                        "checked-in is entered through admission, not a status update"
                            .to_string(),
                    ));
                }
                Ok(())
            }
            SyncAction::CapacityOverride(action) => {
                if action.approved_by.is_nil() {
                    return Err(DoorListError::Validation(
                        "Capacity override requires an approver".to_string(),
                    ));
                }
                Ok(())
            }
            SyncAction::CheckIn(_) => Ok(()),
        }
    }
}

/// Queue entry lifecycle. `synced_at` exists exactly for completed entries
/// and the error text exactly for failed/conflict ones; the nullable-column
/// representation lives only at the storage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Pending,
    Syncing,
    Completed { synced_at: DateTime<Utc> },
    Failed { error: String },
    Conflict { reason: String },
}

impl SyncStatus {
    pub fn kind_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed { .. } => "completed",
            SyncStatus::Failed { .. } => "failed",
            SyncStatus::Conflict { .. } => "conflict",
        }
    }

    /// Completed and conflict entries are never picked up again; failed
    /// entries stay eligible for re-drive below the retry ceiling.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed { .. } | SyncStatus::Conflict { .. })
    }

    /// Legal lifecycle moves. `syncing -> pending` is the crash-recovery
    /// reset for entries stranded mid-flight.
    pub fn can_transition_to(&self, next: &SyncStatus) -> bool {
        use SyncStatus::*;
        matches!(
            (self, next),
            (Pending, Syncing)
                | (Syncing, Completed { .. })
                | (Syncing, Failed { .. })
                | (Syncing, Conflict { .. })
                | (Syncing, Pending)
                | (Failed { .. }, Syncing)
                | (Failed { .. }, Conflict { .. })
        )
    }

    /// Split into the (kind, synced_at, error_message) column triple.
    pub fn to_columns(&self) -> (&'static str, Option<DateTime<Utc>>, Option<String>) {
        match self {
            SyncStatus::Pending => ("pending", None, None),
            SyncStatus::Syncing => ("syncing", None, None),
            SyncStatus::Completed { synced_at } => ("completed", Some(*synced_at), None),
            SyncStatus::Failed { error } => ("failed", None, Some(error.clone())),
            SyncStatus::Conflict { reason } => ("conflict", None, Some(reason.clone())),
        }
    }

    /// Rebuild from the column triple, rejecting combinations the check
    /// constraint forbids.
    pub fn from_columns(
        kind: &str,
        synced_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> Result<Self> {
        match (kind, synced_at) {
            ("pending", None) => Ok(SyncStatus::Pending),
            ("syncing", None) => Ok(SyncStatus::Syncing),
            ("completed", Some(at)) => Ok(SyncStatus::Completed { synced_at: at }),
            ("completed", None) => Err(DoorListError::InvalidInput(
                "Completed entry without synced_at".to_string(),
            )),
            ("failed", None) => Ok(SyncStatus::Failed {
                error: error_message.unwrap_or_else(|| "unknown failure".to_string()),
            }),
            ("conflict", None) => Ok(SyncStatus::Conflict {
                reason: error_message.unwrap_or_else(|| "unknown conflict".to_string()),
            }),
            (other, Some(_)) => Err(DoorListError::InvalidInput(format!(
                "synced_at present on a {} entry",
                other
            ))),
            (other, None) => Err(DoorListError::InvalidInput(format!(
                "Unknown sync status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_str())
    }
}

/// Durable record of one door-device action. Created by ingress, mutated
/// only by the queue processor, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub device_id: String,
    pub submitted_by: Uuid,
    pub action: SyncAction,
    pub local_timestamp: DateTime<Utc>,
    pub status: SyncStatus,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for SyncQueueEntry {
    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error> {
        let action_type: String = row.try_get("action_type")?;
        let action_data: serde_json::Value = row.try_get("action_data")?;
        let action = SyncAction::from_parts(&action_type, action_data).map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "action_data".into(),
                source: Box::new(e),
            }
        })?;

        let status_raw: String = row.try_get("sync_status")?;
        let synced_at: Option<DateTime<Utc>> = row.try_get("synced_at")?;
        let error_message: Option<String> = row.try_get("error_message")?;
        let status =
            SyncStatus::from_columns(&status_raw, synced_at, error_message).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: "sync_status".into(),
                    source: Box::new(e),
                }
            })?;

        Ok(SyncQueueEntry {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            device_id: row.try_get("device_id")?,
            submitted_by: row.try_get("submitted_by")?,
            action,
            local_timestamp: row.try_get("local_timestamp")?,
            status,
            retry_count: row.try_get("retry_count")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Insert shape for ingress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSyncEntry {
    pub event_id: Uuid,
    pub device_id: String,
    pub submitted_by: Uuid,
    pub action: SyncAction,
    pub local_timestamp: DateTime<Utc>,
}
