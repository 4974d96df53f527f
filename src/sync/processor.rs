//! Offline sync queue processor
//!
//! Drains the durable queue of door-device actions. Entries are grouped
//! into per-device lanes and applied in local-timestamp order within each
//! lane, so the door-side causal order survives network reordering; lanes
//! for different devices drain concurrently under a bounded worker count.
//! Global order across devices is deliberately unspecified.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capacity::{AdmitCommand, AdmitResult, CapacityGuard, RejectReason};
use crate::config::SyncConfig;
use crate::models::audit::{AuditAction, AuditEvent};
use crate::models::checkin::{CheckIn, EntryMethod};
use crate::models::sync::{SyncAction, SyncQueueEntry, SyncStatus, AUTO_RETRY_LIMIT};
use crate::services::audit::AuditRecorder;
use crate::services::notification::{ConflictNotice, ConflictNotifier};
use crate::services::registration::RegistrationDirectory;
use crate::utils::errors::Result;
use crate::utils::logging::{log_conflict, log_sync_transition};

use super::store::SyncQueueStore;

/// Entries pulled per lane per drain pass.
const LANE_BATCH: i64 = 256;

/// Counters for one drain pass, summed across lanes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub lanes: usize,
    pub completed: usize,
    pub conflicts: usize,
    pub failed: usize,
    /// Entries skipped because their lane is waiting out a backoff window.
    pub deferred: usize,
}

impl DrainStats {
    fn absorb(&mut self, other: DrainStats) {
        self.lanes += other.lanes;
        self.completed += other.completed;
        self.conflicts += other.conflicts;
        self.failed += other.failed;
        self.deferred += other.deferred;
    }
}

/// Terminal disposition of one processed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Completed,
    Conflict,
    Failed,
    /// Another worker claimed the entry first, or it was no longer claimable.
    Lost,
}

/// How an applied action resolved, before the queue transition is recorded.
enum Applied {
    Done,
    /// The action's effect is already present; replay must not mutate again.
    AlreadyApplied,
    Conflict(String),
}

/// Exponential backoff delay for the given observed-failure count, with
/// jitter so stalled lanes do not re-drive in lockstep.
pub fn backoff_delay(retry_count: i32, base_seconds: u64, cap_seconds: u64) -> Duration {
    let exponent = retry_count.saturating_sub(1).clamp(0, 30) as u32;
    let raw = base_seconds.saturating_mul(2u64.saturating_pow(exponent));
    let capped = raw.min(cap_seconds).max(1);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4);
    Duration::from_secs(capped + jitter)
}

/// Handle to a spawned processor loop.
pub struct ProcessorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProcessorHandle {
    /// Stop the drain loop. In-flight entries finish their transitions
    /// before the task exits.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Sync processor task panicked");
        }
    }
}

pub struct SyncProcessor {
    queue: Arc<dyn SyncQueueStore>,
    guard: CapacityGuard,
    directory: Arc<dyn RegistrationDirectory>,
    auditor: Arc<dyn AuditRecorder>,
    notifier: Arc<dyn ConflictNotifier>,
    config: SyncConfig,
    /// Earliest next attempt per failed entry. Entries absent from the map
    /// are due immediately.
    backoff: Mutex<HashMap<Uuid, Instant>>,
    stopping: AtomicBool,
}

impl SyncProcessor {
    pub fn new(
        queue: Arc<dyn SyncQueueStore>,
        guard: CapacityGuard,
        directory: Arc<dyn RegistrationDirectory>,
        auditor: Arc<dyn AuditRecorder>,
        notifier: Arc<dyn ConflictNotifier>,
        config: SyncConfig,
    ) -> Self {
        Self {
            queue,
            guard,
            directory,
            auditor,
            notifier,
            config,
            backoff: Mutex::new(HashMap::new()),
            stopping: AtomicBool::new(false),
        }
    }

    /// Crash recovery: return entries stranded in `syncing` by an
    /// interrupted run to `pending`. Retry counts are untouched, since the
    /// interrupted attempt never completed as an observed failure.
    pub async fn recover(&self) -> Result<u64> {
        let recovered = self.queue.reset_interrupted().await?;
        if recovered > 0 {
            info!(recovered, "Recovered sync entries stranded mid-flight");
        }
        Ok(recovered)
    }

    /// Spawn the periodic drain loop.
    pub fn spawn(self: &Arc<Self>) -> ProcessorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let processor = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(processor.config.drain_interval_seconds));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(
                interval_seconds = processor.config.drain_interval_seconds,
                worker_count = processor.config.worker_count,
                "Sync processor started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let stats = processor.drain_once().await;
                        if stats.completed + stats.conflicts + stats.failed > 0 {
                            info!(
                                lanes = stats.lanes,
                                completed = stats.completed,
                                conflicts = stats.conflicts,
                                failed = stats.failed,
                                deferred = stats.deferred,
                                "Drain pass finished"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        processor.stopping.store(true, Ordering::SeqCst);
                        info!("Sync processor stopping");
                        break;
                    }
                }
            }
        });

        ProcessorHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// One drain pass: lanes for every device with claimable work, drained
    /// with bounded concurrency. Lane-level store errors are logged and
    /// charged as failures, never abort the pass.
    pub async fn drain_once(&self) -> DrainStats {
        let devices = match self.queue.devices_with_work(AUTO_RETRY_LIMIT).await {
            Ok(devices) => devices,
            Err(e) => {
                error!(error = %e, "Could not list devices with sync work");
                return DrainStats::default();
            }
        };

        let mut stats = DrainStats::default();
        let lane_stats: Vec<DrainStats> = futures::stream::iter(devices)
            .map(|device| async move {
                match self.drain_lane(&device).await {
                    Ok(stats) => stats,
                    Err(e) => {
                        error!(device_id = %device, error = %e, "Lane drain failed");
                        DrainStats {
                            lanes: 1,
                            failed: 1,
                            ..DrainStats::default()
                        }
                    }
                }
            })
            .buffer_unordered(self.config.worker_count.max(1))
            .collect()
            .await;

        for lane in lane_stats {
            stats.absorb(lane);
        }
        stats
    }

    /// Drain one device's lane in local-timestamp order. The lane stops at
    /// the first entry that fails transiently or is still backing off, so a
    /// later action never applies before an earlier one from the same door.
    async fn drain_lane(&self, device_id: &str) -> Result<DrainStats> {
        let entries = self
            .queue
            .claimable_for_device(device_id, AUTO_RETRY_LIMIT, LANE_BATCH)
            .await?;

        let mut stats = DrainStats {
            lanes: 1,
            ..DrainStats::default()
        };

        for entry in entries {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            if !self.is_due(entry.id) {
                stats.deferred += 1;
                break;
            }

            match self.process_entry(entry).await? {
                EntryOutcome::Completed => stats.completed += 1,
                EntryOutcome::Conflict => stats.conflicts += 1,
                EntryOutcome::Failed => {
                    stats.failed += 1;
                    break;
                }
                EntryOutcome::Lost => {}
            }
        }

        Ok(stats)
    }

    /// Run one entry through the state machine: claim, apply, record the
    /// resulting transition. Only store trouble around the transitions
    /// themselves surfaces as `Err`.
    pub async fn process_entry(&self, entry: SyncQueueEntry) -> Result<EntryOutcome> {
        let Some(claimed) = self.queue.claim(entry.id).await? else {
            debug!(entry_id = %entry.id, "Claim lost, skipping entry");
            return Ok(EntryOutcome::Lost);
        };
        log_sync_transition(
            claimed.id,
            &claimed.device_id,
            entry.status.kind_str(),
            "syncing",
            claimed.retry_count,
        );

        match self.apply(&claimed).await {
            Ok(Applied::Done) | Ok(Applied::AlreadyApplied) => {
                let synced_at = Utc::now();
                self.queue.complete(claimed.id, synced_at).await?;
                self.clear_backoff(claimed.id);
                log_sync_transition(
                    claimed.id,
                    &claimed.device_id,
                    "syncing",
                    "completed",
                    claimed.retry_count,
                );
                Ok(EntryOutcome::Completed)
            }
            Ok(Applied::Conflict(reason)) => {
                self.queue.mark_conflict(claimed.id, &reason).await?;
                self.clear_backoff(claimed.id);
                log_conflict(claimed.id, &claimed.device_id, &reason);
                self.notify_conflict(&claimed, reason);
                Ok(EntryOutcome::Conflict)
            }
            Err(e) if e.is_transient() => {
                let message = e.to_string();
                warn!(
                    entry_id = %claimed.id,
                    device_id = %claimed.device_id,
                    error = %message,
                    "Transient failure while applying sync entry"
                );
                match self.queue.fail(claimed.id, &message).await? {
                    Some(failed) if matches!(failed.status, SyncStatus::Conflict { .. }) => {
                        // Retry ceiling reached: the store parked it.
                        self.clear_backoff(failed.id);
                        log_conflict(failed.id, &failed.device_id, &message);
                        self.notify_conflict(&failed, message);
                        Ok(EntryOutcome::Conflict)
                    }
                    Some(failed) => {
                        self.schedule_backoff(failed.id, failed.retry_count);
                        Ok(EntryOutcome::Failed)
                    }
                    None => Ok(EntryOutcome::Lost),
                }
            }
            Err(e) => {
                // Non-transient application errors are operator work, not
                // retry fodder.
                let reason = e.to_string();
                self.queue.mark_conflict(claimed.id, &reason).await?;
                self.clear_backoff(claimed.id);
                log_conflict(claimed.id, &claimed.device_id, &reason);
                self.notify_conflict(&claimed, reason);
                Ok(EntryOutcome::Conflict)
            }
        }
    }

    /// Apply the entry's domain command against the engine.
    async fn apply(&self, entry: &SyncQueueEntry) -> Result<Applied> {
        match &entry.action {
            SyncAction::CheckIn(action) => {
                let command = AdmitCommand {
                    event_id: entry.event_id,
                    session_code: action.session_code.clone(),
                    attendee_id: action.attendee_id,
                    staff_member_id: action.staff_member_id,
                    check_in_time: action.check_in_time,
                    notes: action.notes.clone(),
                    entry: EntryMethod::Standard,
                    override_capacity: action.override_capacity,
                };
                self.apply_admission(entry, command, AuditAction::CheckIn, None)
                    .await
            }
            SyncAction::ManualEntry(action) => {
                let command = AdmitCommand {
                    event_id: entry.event_id,
                    session_code: action.session_code.clone(),
                    attendee_id: action.attendee_id,
                    staff_member_id: action.staff_member_id,
                    check_in_time: action.check_in_time,
                    notes: action.notes.clone(),
                    entry: EntryMethod::Manual {
                        data: action.manual_entry_data.clone(),
                    },
                    override_capacity: action.override_capacity,
                };
                self.apply_admission(entry, command, AuditAction::ManualEntry, None)
                    .await
            }
            SyncAction::CapacityOverride(action) => {
                let command = AdmitCommand {
                    event_id: entry.event_id,
                    session_code: action.session_code.clone(),
                    attendee_id: action.attendee_id,
                    staff_member_id: action.staff_member_id,
                    check_in_time: action.check_in_time,
                    notes: action.notes.clone(),
                    entry: EntryMethod::Standard,
                    override_capacity: true,
                };
                self.apply_admission(
                    entry,
                    command,
                    AuditAction::CheckIn,
                    Some(action.approved_by),
                )
                .await
            }
            SyncAction::StatusUpdate(action) => {
                let change = match self
                    .directory
                    .update_status(action.attendee_id, action.new_status, action.staff_member_id)
                    .await
                {
                    Ok(change) => change,
                    Err(e) if e.is_transient() => return Err(e),
                    Err(e) => return Ok(Applied::Conflict(e.to_string())),
                };

                if !change.changed {
                    return Ok(Applied::AlreadyApplied);
                }

                self.auditor
                    .record(
                        AuditEvent::new(
                            entry.event_id,
                            AuditAction::StatusChange,
                            format!(
                                "Registration status changed from {} to {}{}",
                                change.old_status,
                                change.new_status,
                                action
                                    .reason
                                    .as_deref()
                                    .map(|r| format!(": {}", r))
                                    .unwrap_or_default()
                            ),
                        )
                        .attendee(action.attendee_id)
                        .old_values(serde_json::json!({
                            "registrationStatus": change.old_status,
                        }))
                        .new_values(serde_json::json!({
                            "registrationStatus": change.new_status,
                        }))
                        .actor(action.staff_member_id),
                    )
                    .await?;
                Ok(Applied::Done)
            }
        }
    }

    /// Admission path shared by check-in, manual-entry and capacity-override
    /// actions. Duplicates against the same session are idempotent replays;
    /// everything else rejected becomes a conflict for the resolver.
    async fn apply_admission(
        &self,
        entry: &SyncQueueEntry,
        command: AdmitCommand,
        audit_action: AuditAction,
        approved_by: Option<Uuid>,
    ) -> Result<Applied> {
        let attendee_id = command.attendee_id;
        let staff_member_id = command.staff_member_id;
        let session_code = command.session_code.clone();

        match self.guard.admit(command).await? {
            AdmitResult::Admitted {
                check_in,
                override_used,
                checked_in_count,
            } => {
                self.record_admission_audit(
                    entry,
                    &check_in,
                    audit_action,
                    override_used,
                    checked_in_count,
                    approved_by,
                )
                .await?;
                Ok(Applied::Done)
            }
            AdmitResult::Rejected {
                reason: RejectReason::AlreadyCheckedIn { same_session, .. },
            } if same_session => {
                debug!(
                    entry_id = %entry.id,
                    %attendee_id,
                    session = %session_code,
                    "Admission already applied, replay is idempotent"
                );
                Ok(Applied::AlreadyApplied)
            }
            AdmitResult::Rejected { reason } => {
                debug!(
                    entry_id = %entry.id,
                    %attendee_id,
                    staff_member_id = %staff_member_id,
                    "Admission rejected, surfacing as conflict"
                );
                Ok(Applied::Conflict(reason.summary()))
            }
        }
    }

    async fn record_admission_audit(
        &self,
        entry: &SyncQueueEntry,
        check_in: &CheckIn,
        audit_action: AuditAction,
        override_used: bool,
        checked_in_count: i32,
        approved_by: Option<Uuid>,
    ) -> Result<()> {
        let snapshot = serde_json::json!({
            "sessionCode": check_in.session_code,
            "checkInTime": check_in.check_in_time,
            "isManualEntry": check_in.entry.is_manual(),
            "overrideCapacity": check_in.override_capacity,
            "checkedInCount": checked_in_count,
        });

        self.auditor
            .record(
                AuditEvent::new(
                    entry.event_id,
                    audit_action,
                    format!(
                        "Attendee {} checked in to session {}",
                        check_in.event_attendee_id, check_in.session_code
                    ),
                )
                .attendee(check_in.event_attendee_id)
                .new_values(snapshot.clone())
                .actor(check_in.staff_member_id),
            )
            .await?;

        if override_used {
            // Every excess admission leaves a capacity-override trace naming
            // the human who approved it.
            self.auditor
                .record(
                    AuditEvent::new(
                        entry.event_id,
                        AuditAction::CapacityOverride,
                        format!(
                            "Admission to session {} exceeded capacity ({} checked in)",
                            check_in.session_code, checked_in_count
                        ),
                    )
                    .attendee(check_in.event_attendee_id)
                    .new_values(snapshot)
                    .actor(approved_by.unwrap_or(check_in.staff_member_id)),
                )
                .await?;
        }
        Ok(())
    }

    fn notify_conflict(&self, entry: &SyncQueueEntry, reason: String) {
        let notifier = Arc::clone(&self.notifier);
        let notice = ConflictNotice {
            entry_id: entry.id,
            event_id: entry.event_id,
            device_id: entry.device_id.clone(),
            action_type: entry.action.action_type().to_string(),
            reason,
            occurred_at: Utc::now(),
        };
        // Fire-and-forget: conflict transitions never block on delivery.
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_conflict(notice).await {
                warn!(error = %e, "Conflict notice delivery failed");
            }
        });
    }

    fn is_due(&self, entry_id: Uuid) -> bool {
        let backoff = self.backoff.lock().expect("backoff lock poisoned");
        backoff
            .get(&entry_id)
            .map_or(true, |next| Instant::now() >= *next)
    }

    fn schedule_backoff(&self, entry_id: Uuid, retry_count: i32) {
        let delay = backoff_delay(
            retry_count,
            self.config.backoff_base_seconds,
            self.config.backoff_cap_seconds,
        );
        debug!(%entry_id, retry_count, delay_seconds = delay.as_secs(), "Scheduled re-drive");
        self.backoff
            .lock()
            .expect("backoff lock poisoned")
            .insert(entry_id, Instant::now() + delay);
    }

    fn clear_backoff(&self, entry_id: Uuid) {
        self.backoff
            .lock()
            .expect("backoff lock poisoned")
            .remove(&entry_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        // Jitter adds at most a quarter of the capped delay on top.
        for retry in 1..=12 {
            let delay = backoff_delay(retry, 2, 300).as_secs();
            let expected = (2u64 << (retry as u64 - 1)).min(300);
            assert!(delay >= expected, "retry {}: {} < {}", retry, delay, expected);
            assert!(delay <= expected + expected / 4 + 1);
        }
    }

    #[test]
    fn test_backoff_never_zero() {
        assert!(backoff_delay(0, 0, 0) >= Duration::from_secs(1));
        assert!(backoff_delay(1, 1, 1) >= Duration::from_secs(1));
    }

    #[test]
    fn test_drain_stats_absorb() {
        let mut total = DrainStats::default();
        total.absorb(DrainStats {
            lanes: 1,
            completed: 3,
            conflicts: 1,
            failed: 0,
            deferred: 2,
        });
        total.absorb(DrainStats {
            lanes: 1,
            completed: 1,
            conflicts: 0,
            failed: 1,
            deferred: 0,
        });
        assert_eq!(total.lanes, 2);
        assert_eq!(total.completed, 4);
        assert_eq!(total.conflicts, 1);
        assert_eq!(total.failed, 1);
        assert_eq!(total.deferred, 2);
    }
}
