//! Sync queue store
//!
//! Storage seam for the offline queue. The Postgres implementation
//! delegates to the queue repository; the in-memory one mirrors its
//! compare-and-swap semantics, including the data-level retry ceiling.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::repositories::SyncQueueRepository;
use crate::models::sync::{NewSyncEntry, SyncQueueEntry, SyncStatus, MAX_RETRY_COUNT};
use crate::utils::errors::Result;

#[async_trait]
pub trait SyncQueueStore: Send + Sync {
    /// Append an entry in `pending` status.
    async fn enqueue(&self, new: NewSyncEntry) -> Result<SyncQueueEntry>;

    async fn find(&self, id: Uuid) -> Result<Option<SyncQueueEntry>>;

    /// Move a claimable entry to `syncing`. `None` means the claim was lost
    /// or the entry is not claimable.
    async fn claim(&self, id: Uuid) -> Result<Option<SyncQueueEntry>>;

    /// Move a `syncing` entry to `completed`.
    async fn complete(
        &self,
        id: Uuid,
        synced_at: DateTime<Utc>,
    ) -> Result<Option<SyncQueueEntry>>;

    /// Record a recoverable failure, incrementing the retry count. At the
    /// ceiling the entry lands in `conflict` instead of `failed`.
    async fn fail(&self, id: Uuid, error: &str) -> Result<Option<SyncQueueEntry>>;

    /// Park a `syncing` or `failed` entry in `conflict`.
    async fn mark_conflict(&self, id: Uuid, reason: &str) -> Result<Option<SyncQueueEntry>>;

    /// Devices that currently hold claimable entries.
    async fn devices_with_work(&self, auto_retry_limit: i32) -> Result<Vec<String>>;

    /// Claimable entries for one device, oldest local timestamp first.
    async fn claimable_for_device(
        &self,
        device_id: &str,
        auto_retry_limit: i32,
        limit: i64,
    ) -> Result<Vec<SyncQueueEntry>>;

    /// Reset entries stranded in `syncing` back to `pending` after an
    /// interrupted run, leaving retry counts untouched.
    async fn reset_interrupted(&self) -> Result<u64>;

    /// Conflict entries awaiting an operator, oldest first.
    async fn list_conflicts(&self, event_id: Uuid) -> Result<Vec<SyncQueueEntry>>;

    async fn counts_by_status(&self, event_id: Uuid) -> Result<Vec<(String, i64)>>;
}

/// PostgreSQL-backed queue store.
#[derive(Clone)]
pub struct PgSyncQueueStore {
    repository: SyncQueueRepository,
}

impl PgSyncQueueStore {
    pub fn new(repository: SyncQueueRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl SyncQueueStore for PgSyncQueueStore {
    async fn enqueue(&self, new: NewSyncEntry) -> Result<SyncQueueEntry> {
        self.repository.enqueue(new).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<SyncQueueEntry>> {
        self.repository.find_by_id(id).await
    }

    async fn claim(&self, id: Uuid) -> Result<Option<SyncQueueEntry>> {
        self.repository.claim(id).await
    }

    async fn complete(
        &self,
        id: Uuid,
        synced_at: DateTime<Utc>,
    ) -> Result<Option<SyncQueueEntry>> {
        self.repository.complete(id, synced_at).await
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<Option<SyncQueueEntry>> {
        self.repository.fail(id, error).await
    }

    async fn mark_conflict(&self, id: Uuid, reason: &str) -> Result<Option<SyncQueueEntry>> {
        self.repository.mark_conflict(id, reason).await
    }

    async fn devices_with_work(&self, auto_retry_limit: i32) -> Result<Vec<String>> {
        self.repository.list_devices_with_work(auto_retry_limit).await
    }

    async fn claimable_for_device(
        &self,
        device_id: &str,
        auto_retry_limit: i32,
        limit: i64,
    ) -> Result<Vec<SyncQueueEntry>> {
        self.repository
            .list_claimable_for_device(device_id, auto_retry_limit, limit)
            .await
    }

    async fn reset_interrupted(&self) -> Result<u64> {
        self.repository.reset_interrupted().await
    }

    async fn list_conflicts(&self, event_id: Uuid) -> Result<Vec<SyncQueueEntry>> {
        self.repository.list_conflicts(event_id).await
    }

    async fn counts_by_status(&self, event_id: Uuid) -> Result<Vec<(String, i64)>> {
        self.repository.counts_by_status(event_id).await
    }
}

fn claimable(entry: &SyncQueueEntry, auto_retry_limit: i32) -> bool {
    match entry.status {
        SyncStatus::Pending => true,
        SyncStatus::Failed { .. } => entry.retry_count < auto_retry_limit,
        _ => false,
    }
}

/// In-memory queue store for local mode and tests.
#[derive(Clone, Default)]
pub struct MemorySyncQueueStore {
    inner: Arc<RwLock<HashMap<Uuid, SyncQueueEntry>>>,
}

impl MemorySyncQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl SyncQueueStore for MemorySyncQueueStore {
    async fn enqueue(&self, new: NewSyncEntry) -> Result<SyncQueueEntry> {
        let entry = SyncQueueEntry {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            device_id: new.device_id,
            submitted_by: new.submitted_by,
            action: new.action,
            local_timestamp: new.local_timestamp,
            status: SyncStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
        };
        self.inner.write().await.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn find(&self, id: Uuid) -> Result<Option<SyncQueueEntry>> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn claim(&self, id: Uuid) -> Result<Option<SyncQueueEntry>> {
        let mut entries = self.inner.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            return Ok(None);
        };
        let eligible = matches!(
            entry.status,
            SyncStatus::Pending | SyncStatus::Failed { .. }
        ) && entry.retry_count < MAX_RETRY_COUNT;
        if !eligible {
            return Ok(None);
        }

        entry.status = SyncStatus::Syncing;
        Ok(Some(entry.clone()))
    }

    async fn complete(
        &self,
        id: Uuid,
        synced_at: DateTime<Utc>,
    ) -> Result<Option<SyncQueueEntry>> {
        let mut entries = self.inner.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            return Ok(None);
        };
        if !matches!(entry.status, SyncStatus::Syncing) {
            return Ok(None);
        }

        entry.status = SyncStatus::Completed { synced_at };
        Ok(Some(entry.clone()))
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<Option<SyncQueueEntry>> {
        let mut entries = self.inner.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            return Ok(None);
        };
        if !matches!(entry.status, SyncStatus::Syncing) {
            return Ok(None);
        }

        entry.retry_count += 1;
        entry.status = if entry.retry_count >= MAX_RETRY_COUNT {
            SyncStatus::Conflict {
                reason: error.to_string(),
            }
        } else {
            SyncStatus::Failed {
                error: error.to_string(),
            }
        };
        Ok(Some(entry.clone()))
    }

    async fn mark_conflict(&self, id: Uuid, reason: &str) -> Result<Option<SyncQueueEntry>> {
        let mut entries = self.inner.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            return Ok(None);
        };
        if !matches!(
            entry.status,
            SyncStatus::Syncing | SyncStatus::Failed { .. }
        ) {
            return Ok(None);
        }

        entry.status = SyncStatus::Conflict {
            reason: reason.to_string(),
        };
        Ok(Some(entry.clone()))
    }

    async fn devices_with_work(&self, auto_retry_limit: i32) -> Result<Vec<String>> {
        let entries = self.inner.read().await;
        let mut devices: Vec<String> = entries
            .values()
            .filter(|e| claimable(e, auto_retry_limit))
            .map(|e| e.device_id.clone())
            .collect();
        devices.sort();
        devices.dedup();
        Ok(devices)
    }

    async fn claimable_for_device(
        &self,
        device_id: &str,
        auto_retry_limit: i32,
        limit: i64,
    ) -> Result<Vec<SyncQueueEntry>> {
        let entries = self.inner.read().await;
        let mut claimables: Vec<SyncQueueEntry> = entries
            .values()
            .filter(|e| e.device_id == device_id && claimable(e, auto_retry_limit))
            .cloned()
            .collect();
        claimables.sort_by(|a, b| {
            a.local_timestamp
                .cmp(&b.local_timestamp)
                .then(a.created_at.cmp(&b.created_at))
        });
        claimables.truncate(limit as usize);
        Ok(claimables)
    }

    async fn reset_interrupted(&self) -> Result<u64> {
        let mut entries = self.inner.write().await;
        let mut reset = 0;
        for entry in entries.values_mut() {
            if matches!(entry.status, SyncStatus::Syncing) {
                entry.status = SyncStatus::Pending;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn list_conflicts(&self, event_id: Uuid) -> Result<Vec<SyncQueueEntry>> {
        let entries = self.inner.read().await;
        let mut conflicts: Vec<SyncQueueEntry> = entries
            .values()
            .filter(|e| e.event_id == event_id && matches!(e.status, SyncStatus::Conflict { .. }))
            .cloned()
            .collect();
        conflicts.sort_by_key(|e| e.local_timestamp);
        Ok(conflicts)
    }

    async fn counts_by_status(&self, event_id: Uuid) -> Result<Vec<(String, i64)>> {
        let entries = self.inner.read().await;
        let mut counts: HashMap<&'static str, i64> = HashMap::new();
        for entry in entries.values().filter(|e| e.event_id == event_id) {
            *counts.entry(entry.status.kind_str()).or_default() += 1;
        }
        let mut counts: Vec<(String, i64)> = counts
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        counts.sort();
        Ok(counts)
    }
}
