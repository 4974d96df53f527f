//! Event session model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventSession {
    pub id: Uuid,
    pub event_id: Uuid,
    pub session_code: String,
    pub name: String,
    pub session_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: i32,
    pub registered_count: i32,
    pub checked_in_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub event_id: Uuid,
    pub session_code: String,
    pub name: String,
    pub session_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: i32,
}

/// Addressing key for a session: codes are short ("S1") and unique only
/// within their event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub event_id: Uuid,
    pub code: String,
}

impl SessionKey {
    pub fn new(event_id: Uuid, code: impl Into<String>) -> Self {
        Self {
            event_id,
            code: code.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.event_id, self.code)
    }
}

/// Point-in-time view of one session's counters, as owned by its actor task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub capacity: i32,
    pub registered_count: i32,
    pub checked_in_count: i32,
}

impl SessionSnapshot {
    /// Spots still sellable/claimable for this session. The override path
    /// can push checked-in past registered, so the tighter of the two counts
    /// governs. Never negative.
    pub fn remaining_spots(&self) -> i32 {
        (self.capacity - self.registered_count.max(self.checked_in_count)).max(0)
    }

    /// Whether the door can admit without an override.
    pub fn has_door_capacity(&self) -> bool {
        self.checked_in_count < self.capacity
    }
}
