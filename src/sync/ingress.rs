//! Sync ingress
//!
//! Entry point for door-device submissions. Malformed actions, unknown
//! sessions and flooding devices are rejected synchronously so only
//! well-formed entries ever reach `pending`. Capacity and duplicate
//! decisions are deliberately NOT made here; those belong to the queue
//! processor where they run against authoritative state.

use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::warn;
use uuid::Uuid;

use crate::capacity::SessionStore;
use crate::config::settings::FeaturesConfig;
use crate::models::session::SessionKey;
use crate::models::sync::{NewSyncEntry, SyncAction, SyncQueueEntry};
use crate::utils::errors::{DoorListError, Result};
use crate::utils::helpers;
use crate::utils::logging::log_device_submission;

use super::store::SyncQueueStore;

type DeviceLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

fn nonzero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

pub struct SyncIngress {
    queue: Arc<dyn SyncQueueStore>,
    store: SessionStore,
    limiter: Option<DeviceLimiter>,
}

impl SyncIngress {
    pub fn new(
        queue: Arc<dyn SyncQueueStore>,
        store: SessionStore,
        features: &FeaturesConfig,
    ) -> Self {
        let limiter = features.device_rate_limiting.then(|| {
            let quota = Quota::per_second(nonzero(features.device_rate_per_second))
                .allow_burst(nonzero(features.device_rate_burst));
            RateLimiter::keyed(quota)
        });

        Self {
            queue,
            store,
            limiter,
        }
    }

    /// Accept one device action into the queue. Returns the pending entry
    /// on success; every rejection happens before anything is stored.
    pub async fn submit(
        &self,
        device_id: &str,
        event_id: Uuid,
        submitted_by: Uuid,
        action: SyncAction,
        local_timestamp: DateTime<Utc>,
    ) -> Result<SyncQueueEntry> {
        if !helpers::is_valid_device_id(device_id) {
            return Err(DoorListError::Validation(format!(
                "Invalid device id: {:?}",
                device_id
            )));
        }
        if submitted_by.is_nil() {
            return Err(DoorListError::Validation(
                "Submission requires a staff member id".to_string(),
            ));
        }
        action.validate()?;

        // Session-addressed actions must target a live session. Attendee
        // existence is not checked here: manual entries mint attendees and
        // the processor resolves the rest against current state.
        if let Some(code) = action.session_code() {
            let key = SessionKey::new(event_id, code);
            if !self.store.contains(&key).await {
                return Err(DoorListError::SessionNotFound {
                    session: key.to_string(),
                });
            }
        }

        if let Some(limiter) = &self.limiter {
            if limiter.check_key(&device_id.to_string()).is_err() {
                warn!(device_id = device_id, "Device submission rate limited");
                return Err(DoorListError::RateLimitExceeded);
            }
        }

        let entry = self
            .queue
            .enqueue(NewSyncEntry {
                event_id,
                device_id: device_id.to_string(),
                submitted_by,
                action,
                local_timestamp,
            })
            .await?;

        log_device_submission(device_id, event_id, entry.action.action_type());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::{CheckInLedger, MemoryCheckInLedger};
    use crate::models::sync::{CheckInAction, SyncStatus};
    use crate::sync::store::MemorySyncQueueStore;

    fn features(limiting: bool, per_second: u32, burst: u32) -> FeaturesConfig {
        FeaturesConfig {
            device_rate_limiting: limiting,
            device_rate_per_second: per_second,
            device_rate_burst: burst,
        }
    }

    async fn ingress(features: FeaturesConfig) -> (SyncIngress, Arc<MemorySyncQueueStore>, Uuid) {
        let ledger: Arc<dyn CheckInLedger> = Arc::new(MemoryCheckInLedger::new());
        let store = SessionStore::new(ledger, 16);
        let event_id = Uuid::new_v4();
        store
            .register_counts(SessionKey::new(event_id, "S1"), 10, 0, 0)
            .await;

        let queue = Arc::new(MemorySyncQueueStore::new());
        let ingress = SyncIngress::new(
            Arc::clone(&queue) as Arc<dyn SyncQueueStore>,
            store,
            &features,
        );
        (ingress, queue, event_id)
    }

    fn check_in(session_code: &str) -> SyncAction {
        SyncAction::CheckIn(CheckInAction {
            attendee_id: Uuid::new_v4(),
            session_code: session_code.to_string(),
            staff_member_id: Uuid::new_v4(),
            check_in_time: Utc::now(),
            notes: None,
            override_capacity: false,
        })
    }

    #[tokio::test]
    async fn test_submit_enqueues_pending_entry() {
        let (ingress, queue, event_id) = ingress(features(false, 0, 0)).await;

        let entry = ingress
            .submit("door-1", event_id, Uuid::new_v4(), check_in("S1"), Utc::now())
            .await
            .unwrap();

        assert!(matches!(entry.status, SyncStatus::Pending));
        assert_eq!(entry.device_id, "door-1");
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_device_id() {
        let (ingress, queue, event_id) = ingress(features(false, 0, 0)).await;

        let err = ingress
            .submit("ab", event_id, Uuid::new_v4(), check_in("S1"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DoorListError::Validation(_)));
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_session() {
        let (ingress, queue, event_id) = ingress(features(false, 0, 0)).await;

        let err = ingress
            .submit("door-1", event_id, Uuid::new_v4(), check_in("S9"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DoorListError::SessionNotFound { .. }));
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn test_submit_rejects_malformed_action() {
        let (ingress, queue, event_id) = ingress(features(false, 0, 0)).await;

        let mut action = check_in("S1");
        if let SyncAction::CheckIn(inner) = &mut action {
            inner.attendee_id = Uuid::nil();
        }
        let err = ingress
            .submit("door-1", event_id, Uuid::new_v4(), action, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DoorListError::Validation(_)));
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn test_rate_limit_applies_per_device() {
        let (ingress, queue, event_id) = ingress(features(true, 1, 2)).await;
        let staff = Uuid::new_v4();

        // Burst of two passes, the third submission from the same device is
        // refused while another device is unaffected.
        for _ in 0..2 {
            ingress
                .submit("door-1", event_id, staff, check_in("S1"), Utc::now())
                .await
                .unwrap();
        }
        let err = ingress
            .submit("door-1", event_id, staff, check_in("S1"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DoorListError::RateLimitExceeded));

        ingress
            .submit("door-2", event_id, staff, check_in("S1"), Utc::now())
            .await
            .unwrap();
        assert_eq!(queue.len().await, 3);
    }

    #[tokio::test]
    async fn test_rate_limiting_disabled_by_feature_flag() {
        let (ingress, queue, event_id) = ingress(features(false, 1, 1)).await;
        let staff = Uuid::new_v4();

        for _ in 0..10 {
            ingress
                .submit("door-1", event_id, staff, check_in("S1"), Utc::now())
                .await
                .unwrap();
        }
        assert_eq!(queue.len().await, 10);
    }
}
