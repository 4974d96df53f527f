//! Check-in ledger
//!
//! The ledger owns the authoritative CheckIn rows and the at-most-one-per-
//! attendee uniqueness guarantee. Cross-device races for the same attendee
//! are settled here, never by device timestamps.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::checkin::{CheckIn, NewCheckIn};
use crate::utils::errors::Result;

/// Outcome of recording an admission. A lost uniqueness race reports the
/// surviving row instead of failing.
#[derive(Debug, Clone)]
pub enum LedgerOutcome {
    Inserted(CheckIn),
    Duplicate(CheckIn),
}

#[async_trait]
pub trait CheckInLedger: Send + Sync {
    /// Look up the attendee's check-in, if any. At most one can exist.
    async fn find_for_attendee(&self, attendee_id: Uuid) -> Result<Option<CheckIn>>;

    /// Record an admission. Returns `Duplicate` with the existing row when
    /// the attendee already holds a check-in.
    async fn record(&self, new: NewCheckIn) -> Result<LedgerOutcome>;

    /// Count recorded admissions for one session, for seeding counters.
    async fn count_for_session(&self, event_id: Uuid, session_code: &str) -> Result<i64>;
}

/// PostgreSQL-backed ledger. The unique constraint on `event_attendee_id`
/// is the cross-session authority; the insert races through
/// `ON CONFLICT DO NOTHING` and reports the surviving row on conflict.
#[derive(Clone)]
pub struct PgCheckInLedger {
    pool: PgPool,
}

impl PgCheckInLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckInLedger for PgCheckInLedger {
    async fn find_for_attendee(&self, attendee_id: Uuid) -> Result<Option<CheckIn>> {
        let check_in = sqlx::query_as::<_, CheckIn>(
            r#"
            SELECT id, event_attendee_id, event_id, session_code, check_in_time,
                   staff_member_id, notes, is_manual_entry, override_capacity,
                   manual_entry_data, created_at, created_by
            FROM check_ins
            WHERE event_attendee_id = $1
            "#,
        )
        .bind(attendee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(check_in)
    }

    async fn record(&self, new: NewCheckIn) -> Result<LedgerOutcome> {
        let (is_manual, manual_data) = new.entry.to_columns()?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, CheckIn>(
            r#"
            INSERT INTO check_ins (
                id, event_attendee_id, event_id, session_code, check_in_time,
                staff_member_id, notes, is_manual_entry, override_capacity,
                manual_entry_data, created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), $11)
            ON CONFLICT (event_attendee_id) DO NOTHING
            RETURNING id, event_attendee_id, event_id, session_code, check_in_time,
                      staff_member_id, notes, is_manual_entry, override_capacity,
                      manual_entry_data, created_at, created_by
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.event_attendee_id)
        .bind(new.event_id)
        .bind(&new.session_code)
        .bind(new.check_in_time)
        .bind(new.staff_member_id)
        .bind(&new.notes)
        .bind(is_manual)
        .bind(new.override_capacity)
        .bind(&manual_data)
        .bind(new.created_by)
        .fetch_optional(&mut *tx)
        .await?;

        match inserted {
            Some(check_in) => {
                sqlx::query(
                    r#"
                    UPDATE event_sessions
                    SET checked_in_count = checked_in_count + 1, updated_at = NOW()
                    WHERE event_id = $1 AND session_code = $2
                    "#,
                )
                .bind(new.event_id)
                .bind(&new.session_code)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                debug!(
                    attendee_id = %check_in.event_attendee_id,
                    session = %check_in.session_code,
                    "Check-in recorded"
                );
                Ok(LedgerOutcome::Inserted(check_in))
            }
            None => {
                tx.rollback().await?;
                let existing = sqlx::query_as::<_, CheckIn>(
                    r#"
                    SELECT id, event_attendee_id, event_id, session_code, check_in_time,
                           staff_member_id, notes, is_manual_entry, override_capacity,
                           manual_entry_data, created_at, created_by
                    FROM check_ins
                    WHERE event_attendee_id = $1
                    "#,
                )
                .bind(new.event_attendee_id)
                .fetch_one(&self.pool)
                .await?;

                debug!(
                    attendee_id = %new.event_attendee_id,
                    "Duplicate check-in suppressed by ledger"
                );
                Ok(LedgerOutcome::Duplicate(existing))
            }
        }
    }

    async fn count_for_session(&self, event_id: Uuid, session_code: &str) -> Result<i64> {
        let count = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM check_ins WHERE event_id = $1 AND session_code = $2",
        )
        .bind(event_id)
        .bind(session_code)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}

/// In-memory ledger keyed by attendee id, used for local mode and tests.
#[derive(Clone, Default)]
pub struct MemoryCheckInLedger {
    inner: Arc<RwLock<HashMap<Uuid, CheckIn>>>,
}

impl MemoryCheckInLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows held, across all sessions.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl CheckInLedger for MemoryCheckInLedger {
    async fn find_for_attendee(&self, attendee_id: Uuid) -> Result<Option<CheckIn>> {
        Ok(self.inner.read().await.get(&attendee_id).cloned())
    }

    async fn record(&self, new: NewCheckIn) -> Result<LedgerOutcome> {
        let mut rows = self.inner.write().await;
        if let Some(existing) = rows.get(&new.event_attendee_id) {
            return Ok(LedgerOutcome::Duplicate(existing.clone()));
        }

        let check_in = CheckIn {
            id: Uuid::new_v4(),
            event_attendee_id: new.event_attendee_id,
            event_id: new.event_id,
            session_code: new.session_code,
            check_in_time: new.check_in_time,
            staff_member_id: new.staff_member_id,
            notes: new.notes,
            entry: new.entry,
            override_capacity: new.override_capacity,
            created_at: chrono::Utc::now(),
            created_by: new.created_by,
        };
        rows.insert(check_in.event_attendee_id, check_in.clone());
        Ok(LedgerOutcome::Inserted(check_in))
    }

    async fn count_for_session(&self, event_id: Uuid, session_code: &str) -> Result<i64> {
        let rows = self.inner.read().await;
        let count = rows
            .values()
            .filter(|c| c.event_id == event_id && c.session_code == session_code)
            .count();
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::checkin::EntryMethod;
    use chrono::Utc;

    fn new_check_in(attendee_id: Uuid, event_id: Uuid, session: &str) -> NewCheckIn {
        NewCheckIn {
            event_attendee_id: attendee_id,
            event_id,
            session_code: session.to_string(),
            check_in_time: Utc::now(),
            staff_member_id: Uuid::new_v4(),
            notes: None,
            entry: EntryMethod::Standard,
            override_capacity: false,
            created_by: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_memory_ledger_enforces_at_most_one() {
        let ledger = MemoryCheckInLedger::new();
        let event_id = Uuid::new_v4();
        let attendee_id = Uuid::new_v4();

        let first = ledger
            .record(new_check_in(attendee_id, event_id, "S1"))
            .await
            .unwrap();
        assert!(matches!(first, LedgerOutcome::Inserted(_)));

        let second = ledger
            .record(new_check_in(attendee_id, event_id, "S2"))
            .await
            .unwrap();
        match second {
            LedgerOutcome::Duplicate(existing) => assert_eq!(existing.session_code, "S1"),
            LedgerOutcome::Inserted(_) => panic!("second record must not insert"),
        }

        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_ledger_session_counts() {
        let ledger = MemoryCheckInLedger::new();
        let event_id = Uuid::new_v4();

        for _ in 0..3 {
            ledger
                .record(new_check_in(Uuid::new_v4(), event_id, "S1"))
                .await
                .unwrap();
        }
        ledger
            .record(new_check_in(Uuid::new_v4(), event_id, "S2"))
            .await
            .unwrap();

        assert_eq!(ledger.count_for_session(event_id, "S1").await.unwrap(), 3);
        assert_eq!(ledger.count_for_session(event_id, "S2").await.unwrap(), 1);
        assert_eq!(
            ledger
                .count_for_session(Uuid::new_v4(), "S1")
                .await
                .unwrap(),
            0
        );
    }
}
