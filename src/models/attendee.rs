//! Attendee registration model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::utils::errors::DoorListError;

/// Registration lifecycle of an attendee. Stored as text with a matching
/// database check constraint; the enum is the compile-time authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationStatus {
    Confirmed,
    Waitlist,
    CheckedIn,
    NoShow,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Waitlist => "waitlist",
            RegistrationStatus::CheckedIn => "checked-in",
            RegistrationStatus::NoShow => "no-show",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the door may admit an attendee in this status. Waitlist
    /// attendees are admissible; the capacity rule decides whether an
    /// override is needed.
    pub fn is_admissible(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::Confirmed | RegistrationStatus::Waitlist
        )
    }

    /// Legal moves for operator status updates. `checked-in` is entered
    /// only through admission and never left through a status update; a
    /// recorded check-in is never reversed.
    pub fn can_transition_to(&self, next: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        match (self, next) {
            (Confirmed, Waitlist) | (Confirmed, Cancelled) | (Confirmed, NoShow) => true,
            (Waitlist, Confirmed) | (Waitlist, Cancelled) | (Waitlist, NoShow) => true,
            (NoShow, Confirmed) | (NoShow, Waitlist) => true,
            (Cancelled, Confirmed) | (Cancelled, Waitlist) => true,
            _ => false,
        }
    }
}

impl std::str::FromStr for RegistrationStatus {
    type Err = DoorListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(RegistrationStatus::Confirmed),
            "waitlist" => Ok(RegistrationStatus::Waitlist),
            "checked-in" => Ok(RegistrationStatus::CheckedIn),
            "no-show" => Ok(RegistrationStatus::NoShow),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            other => Err(DoorListError::InvalidInput(format!(
                "Unknown registration status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registration per (event, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAttendee {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub registration_status: RegistrationStatus,
    pub ticket_number: Option<String>,
    /// Present iff status is `waitlist`.
    pub waitlist_position: Option<i32>,
    pub is_first_time: bool,
    pub has_completed_waiver: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
}

impl FromRow<'_, PgRow> for EventAttendee {
    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error> {
        let status_raw: String = row.try_get("registration_status")?;
        let registration_status = status_raw
            .parse::<RegistrationStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "registration_status".into(),
                source: Box::new(e),
            })?;

        Ok(EventAttendee {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            user_id: row.try_get("user_id")?,
            registration_status,
            ticket_number: row.try_get("ticket_number")?,
            waitlist_position: row.try_get("waitlist_position")?,
            is_first_time: row.try_get("is_first_time")?,
            has_completed_waiver: row.try_get("has_completed_waiver")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            created_by: row.try_get("created_by")?,
            updated_by: row.try_get("updated_by")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAttendeeRequest {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub registration_status: RegistrationStatus,
    pub ticket_number: Option<String>,
    pub waitlist_position: Option<i32>,
    pub is_first_time: bool,
    pub has_completed_waiver: bool,
    pub metadata: serde_json::Value,
    pub created_by: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RegistrationStatus::Confirmed,
            RegistrationStatus::Waitlist,
            RegistrationStatus::CheckedIn,
            RegistrationStatus::NoShow,
            RegistrationStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RegistrationStatus>().unwrap(), status);
        }
        assert!("checked_in".parse::<RegistrationStatus>().is_err());
    }

    #[test]
    fn test_admissible_statuses() {
        assert!(RegistrationStatus::Confirmed.is_admissible());
        assert!(RegistrationStatus::Waitlist.is_admissible());
        assert!(!RegistrationStatus::CheckedIn.is_admissible());
        assert!(!RegistrationStatus::NoShow.is_admissible());
        assert!(!RegistrationStatus::Cancelled.is_admissible());
    }

    #[test]
    fn test_checked_in_is_terminal_for_status_updates() {
        use RegistrationStatus::*;
        for next in [Confirmed, Waitlist, NoShow, Cancelled] {
            assert!(!CheckedIn.can_transition_to(next));
        }
    }

    #[test]
    fn test_status_updates_never_enter_checked_in() {
        use RegistrationStatus::*;
        for from in [Confirmed, Waitlist, NoShow, Cancelled] {
            assert!(!from.can_transition_to(CheckedIn));
        }
    }

    #[test]
    fn test_reinstatement_paths() {
        use RegistrationStatus::*;
        assert!(NoShow.can_transition_to(Confirmed));
        assert!(Cancelled.can_transition_to(Waitlist));
        assert!(Confirmed.can_transition_to(NoShow));
        assert!(Waitlist.can_transition_to(Confirmed));
    }
}
