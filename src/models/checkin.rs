//! Check-in model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::utils::errors::{DoorListError, Result};
use crate::utils::helpers;

/// Walk-in identity captured at the door when no prior registration record
/// exists on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEntryData {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl ManualEntryData {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DoorListError::Validation(
                "Manual entry requires a name".to_string(),
            ));
        }
        if !helpers::is_valid_email(&self.email) {
            return Err(DoorListError::Validation(format!(
                "Manual entry has an invalid email: {}",
                self.email
            )));
        }
        if let Some(phone) = &self.phone {
            if !helpers::is_valid_phone(phone) {
                return Err(DoorListError::Validation(format!(
                    "Manual entry has an invalid phone number: {}",
                    phone
                )));
            }
        }
        Ok(())
    }
}

/// How the attendee reached the door. The manual payload exists exactly
/// when the entry is manual; the two-column representation lives only at
/// the storage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EntryMethod {
    Standard,
    Manual { data: ManualEntryData },
}

impl EntryMethod {
    pub fn is_manual(&self) -> bool {
        matches!(self, EntryMethod::Manual { .. })
    }

    /// Split into the (flag, payload) column pair.
    pub fn to_columns(&self) -> Result<(bool, Option<serde_json::Value>)> {
        match self {
            EntryMethod::Standard => Ok((false, None)),
            EntryMethod::Manual { data } => {
                Ok((true, Some(serde_json::to_value(data)?)))
            }
        }
    }

    /// Rebuild from the (flag, payload) column pair, rejecting the two
    /// combinations the check constraint forbids.
    pub fn from_columns(is_manual: bool, data: Option<serde_json::Value>) -> Result<Self> {
        match (is_manual, data) {
            (false, None) => Ok(EntryMethod::Standard),
            (true, Some(value)) => Ok(EntryMethod::Manual {
                data: serde_json::from_value(value)?,
            }),
            (true, None) => Err(DoorListError::InvalidInput(
                "Manual entry without manual entry data".to_string(),
            )),
            (false, Some(_)) => Err(DoorListError::InvalidInput(
                "Manual entry data present on a standard entry".to_string(),
            )),
        }
    }
}

/// One admission through the door. At most one per attendee; the
/// (attendee, session) pair is the idempotency key for queue replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: Uuid,
    pub event_attendee_id: Uuid,
    pub event_id: Uuid,
    pub session_code: String,
    pub check_in_time: DateTime<Utc>,
    pub staff_member_id: Uuid,
    pub notes: Option<String>,
    pub entry: EntryMethod,
    pub override_capacity: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl FromRow<'_, PgRow> for CheckIn {
    fn from_row(row: &PgRow) -> std::result::Result<Self, sqlx::Error> {
        let is_manual: bool = row.try_get("is_manual_entry")?;
        let manual_data: Option<serde_json::Value> = row.try_get("manual_entry_data")?;
        let entry = EntryMethod::from_columns(is_manual, manual_data).map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "manual_entry_data".into(),
                source: Box::new(e),
            }
        })?;

        Ok(CheckIn {
            id: row.try_get("id")?,
            event_attendee_id: row.try_get("event_attendee_id")?,
            event_id: row.try_get("event_id")?,
            session_code: row.try_get("session_code")?,
            check_in_time: row.try_get("check_in_time")?,
            staff_member_id: row.try_get("staff_member_id")?,
            notes: row.try_get("notes")?,
            entry,
            override_capacity: row.try_get("override_capacity")?,
            created_at: row.try_get("created_at")?,
            created_by: row.try_get("created_by")?,
        })
    }
}

/// Insert shape for a new admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCheckIn {
    pub event_attendee_id: Uuid,
    pub event_id: Uuid,
    pub session_code: String,
    pub check_in_time: DateTime<Utc>,
    pub staff_member_id: Uuid,
    pub notes: Option<String>,
    pub entry: EntryMethod,
    pub override_capacity: bool,
    pub created_by: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_data() -> ManualEntryData {
        ManualEntryData {
            name: "Jamie Doe".to_string(),
            email: "jamie@example.com".to_string(),
            phone: None,
        }
    }

    #[test]
    fn test_entry_method_columns_round_trip() {
        let standard = EntryMethod::Standard;
        let (flag, data) = standard.to_columns().unwrap();
        assert!(!flag);
        assert!(data.is_none());
        assert_eq!(EntryMethod::from_columns(flag, data).unwrap(), standard);

        let manual = EntryMethod::Manual { data: manual_data() };
        let (flag, data) = manual.to_columns().unwrap();
        assert!(flag);
        assert!(data.is_some());
        assert_eq!(EntryMethod::from_columns(flag, data).unwrap(), manual);
    }

    #[test]
    fn test_entry_method_rejects_invalid_column_pairs() {
        assert!(EntryMethod::from_columns(true, None).is_err());
        assert!(
            EntryMethod::from_columns(false, Some(serde_json::json!({"name": "x"}))).is_err()
        );
    }

    #[test]
    fn test_manual_entry_validation() {
        assert!(manual_data().validate().is_ok());

        let mut missing_name = manual_data();
        missing_name.name = "  ".to_string();
        assert!(missing_name.validate().is_err());

        let mut bad_email = manual_data();
        bad_email.email = "not-an-email".to_string();
        assert!(bad_email.validate().is_err());

        let mut bad_phone = manual_data();
        bad_phone.phone = Some("abc".to_string());
        assert!(bad_phone.validate().is_err());
    }
}
