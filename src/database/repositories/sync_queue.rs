//! Offline sync queue repository implementation
//!
//! Every status movement is a compare-and-swap on the current status, so a
//! lost claim race or a replayed transition comes back as `None` instead of
//! double-applying. Entries are never deleted here.

use sqlx::PgPool;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::sync::{NewSyncEntry, SyncQueueEntry, MAX_RETRY_COUNT};
use crate::utils::errors::DoorListError;

#[derive(Clone, Debug)]
pub struct SyncQueueRepository {
    pool: PgPool,
}

impl SyncQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a new entry in `pending` status
    pub async fn enqueue(&self, new: NewSyncEntry) -> Result<SyncQueueEntry, DoorListError> {
        let payload = new.action.payload()?;
        let entry = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            INSERT INTO offline_sync_queue (id, event_id, device_id, submitted_by, action_type, action_data, local_timestamp, sync_status, retry_count, error_message, synced_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', 0, NULL, NULL, $8)
            RETURNING id, event_id, device_id, submitted_by, action_type, action_data, local_timestamp, sync_status, retry_count, error_message, synced_at, created_at
            "#
        )
        .bind(Uuid::new_v4())
        .bind(new.event_id)
        .bind(&new.device_id)
        .bind(new.submitted_by)
        .bind(new.action.action_type())
        .bind(&payload)
        .bind(new.local_timestamp)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Find entry by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<SyncQueueEntry>, DoorListError> {
        let entry = sqlx::query_as::<_, SyncQueueEntry>(
            "SELECT id, event_id, device_id, submitted_by, action_type, action_data, local_timestamp, sync_status, retry_count, error_message, synced_at, created_at FROM offline_sync_queue WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Claim an entry for processing: `pending` or retryable `failed` moves
    /// to `syncing`. Returns `None` when another worker won the claim or the
    /// entry is not claimable.
    pub async fn claim(&self, id: Uuid) -> Result<Option<SyncQueueEntry>, DoorListError> {
        let entry = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            UPDATE offline_sync_queue
            SET sync_status = 'syncing'
            WHERE id = $1
              AND sync_status IN ('pending', 'failed')
              AND retry_count < $2
            RETURNING id, event_id, device_id, submitted_by, action_type, action_data, local_timestamp, sync_status, retry_count, error_message, synced_at, created_at
            "#
        )
        .bind(id)
        .bind(MAX_RETRY_COUNT)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Finish a `syncing` entry as `completed`
    pub async fn complete(
        &self,
        id: Uuid,
        synced_at: DateTime<Utc>,
    ) -> Result<Option<SyncQueueEntry>, DoorListError> {
        let entry = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            UPDATE offline_sync_queue
            SET sync_status = 'completed', synced_at = $2, error_message = NULL
            WHERE id = $1 AND sync_status = 'syncing'
            RETURNING id, event_id, device_id, submitted_by, action_type, action_data, local_timestamp, sync_status, retry_count, error_message, synced_at, created_at
            "#
        )
        .bind(id)
        .bind(synced_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Record a recoverable failure on a `syncing` entry. The retry count
    /// increments with the transition; hitting the ceiling lands the entry
    /// in `conflict` instead of `failed`.
    pub async fn fail(
        &self,
        id: Uuid,
        error: &str,
    ) -> Result<Option<SyncQueueEntry>, DoorListError> {
        let entry = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            UPDATE offline_sync_queue
            SET retry_count = retry_count + 1,
                sync_status = CASE WHEN retry_count + 1 >= $3 THEN 'conflict' ELSE 'failed' END,
                error_message = $2
            WHERE id = $1 AND sync_status = 'syncing'
            RETURNING id, event_id, device_id, submitted_by, action_type, action_data, local_timestamp, sync_status, retry_count, error_message, synced_at, created_at
            "#
        )
        .bind(id)
        .bind(error)
        .bind(MAX_RETRY_COUNT)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Park a `syncing` or `failed` entry in `conflict` for an operator
    pub async fn mark_conflict(
        &self,
        id: Uuid,
        reason: &str,
    ) -> Result<Option<SyncQueueEntry>, DoorListError> {
        let entry = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            UPDATE offline_sync_queue
            SET sync_status = 'conflict', error_message = $2
            WHERE id = $1 AND sync_status IN ('syncing', 'failed')
            RETURNING id, event_id, device_id, submitted_by, action_type, action_data, local_timestamp, sync_status, retry_count, error_message, synced_at, created_at
            "#
        )
        .bind(id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Devices that currently have claimable work
    pub async fn list_devices_with_work(
        &self,
        auto_retry_limit: i32,
    ) -> Result<Vec<String>, DoorListError> {
        let devices: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT device_id FROM offline_sync_queue
            WHERE sync_status = 'pending'
               OR (sync_status = 'failed' AND retry_count < $1)
            ORDER BY device_id
            "#,
        )
        .bind(auto_retry_limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(devices.into_iter().map(|(d,)| d).collect())
    }

    /// Claimable entries for one device in local-time order
    pub async fn list_claimable_for_device(
        &self,
        device_id: &str,
        auto_retry_limit: i32,
        limit: i64,
    ) -> Result<Vec<SyncQueueEntry>, DoorListError> {
        let entries = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            SELECT id, event_id, device_id, submitted_by, action_type, action_data, local_timestamp, sync_status, retry_count, error_message, synced_at, created_at
            FROM offline_sync_queue
            WHERE device_id = $1
              AND (sync_status = 'pending'
                   OR (sync_status = 'failed' AND retry_count < $2))
            ORDER BY local_timestamp, created_at
            LIMIT $3
            "#,
        )
        .bind(device_id)
        .bind(auto_retry_limit)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Reset entries stranded in `syncing` by an interrupted run back to
    /// `pending`, without touching their retry counts. Returns how many
    /// were recovered.
    pub async fn reset_interrupted(&self) -> Result<u64, DoorListError> {
        let result =
            sqlx::query("UPDATE offline_sync_queue SET sync_status = 'pending' WHERE sync_status = 'syncing'")
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    /// List entries for an event, newest first
    pub async fn list_for_event(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> Result<Vec<SyncQueueEntry>, DoorListError> {
        let entries = sqlx::query_as::<_, SyncQueueEntry>(
            "SELECT id, event_id, device_id, submitted_by, action_type, action_data, local_timestamp, sync_status, retry_count, error_message, synced_at, created_at FROM offline_sync_queue WHERE event_id = $1 ORDER BY created_at DESC LIMIT $2"
        )
        .bind(event_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// List `conflict` entries awaiting operator resolution
    pub async fn list_conflicts(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<SyncQueueEntry>, DoorListError> {
        let entries = sqlx::query_as::<_, SyncQueueEntry>(
            "SELECT id, event_id, device_id, submitted_by, action_type, action_data, local_timestamp, sync_status, retry_count, error_message, synced_at, created_at FROM offline_sync_queue WHERE event_id = $1 AND sync_status = 'conflict' ORDER BY local_timestamp"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Count entries per status for an event
    pub async fn counts_by_status(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<(String, i64)>, DoorListError> {
        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT sync_status, COUNT(*) FROM offline_sync_queue WHERE event_id = $1 GROUP BY sync_status ORDER BY sync_status"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }
}
