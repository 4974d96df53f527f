//! Capacity guard
//!
//! Front door for admissions. Validates the registration side of a check-in
//! (known attendee, admissible status, waiver on file), then hands the
//! request to the session's actor, which owns the capacity decision and the
//! ledger insert. On admission the attendee's registration is moved to
//! checked-in. Callers are responsible for recording audit entries,
//! including the capacity-override entry for any excess admission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::checkin::EntryMethod;
use crate::models::session::SessionKey;
use crate::services::registration::RegistrationDirectory;
use crate::utils::errors::Result;
use crate::utils::logging::log_admission;

use super::ledger::CheckInLedger;
use super::store::{AdmitRequest, AdmitResult, RejectReason, SessionStore};

/// One admission attempt, as assembled from a queue entry or a direct call.
#[derive(Debug, Clone)]
pub struct AdmitCommand {
    pub event_id: Uuid,
    pub session_code: String,
    pub attendee_id: Uuid,
    pub staff_member_id: Uuid,
    pub check_in_time: DateTime<Utc>,
    pub notes: Option<String>,
    pub entry: EntryMethod,
    pub override_capacity: bool,
}

#[derive(Clone)]
pub struct CapacityGuard {
    store: SessionStore,
    directory: Arc<dyn RegistrationDirectory>,
    ledger: Arc<dyn CheckInLedger>,
}

impl CapacityGuard {
    pub fn new(
        store: SessionStore,
        directory: Arc<dyn RegistrationDirectory>,
        ledger: Arc<dyn CheckInLedger>,
    ) -> Self {
        Self {
            store,
            directory,
            ledger,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Attempt to admit an attendee. Precondition failures come back as
    /// `Rejected`; only infrastructure trouble surfaces as `Err`.
    pub async fn admit(&self, command: AdmitCommand) -> Result<AdmitResult> {
        let key = SessionKey::new(command.event_id, command.session_code.clone());

        let Some(handle) = self.store.handle(&key).await else {
            return Ok(self.rejected(
                &key,
                command.attendee_id,
                RejectReason::UnknownSession {
                    session: key.to_string(),
                },
            ));
        };

        // The ledger re-checks on insert; this pre-check just resolves the
        // common duplicate case before touching the registration.
        if let Some(existing) = self.ledger.find_for_attendee(command.attendee_id).await? {
            let same_session = existing.event_id == command.event_id
                && existing.session_code == command.session_code;
            return Ok(self.rejected(
                &key,
                command.attendee_id,
                RejectReason::AlreadyCheckedIn {
                    existing,
                    same_session,
                },
            ));
        }

        let attendee = match &command.entry {
            EntryMethod::Manual { data } => {
                self.directory
                    .ensure_walk_in(
                        command.event_id,
                        command.attendee_id,
                        data,
                        command.staff_member_id,
                    )
                    .await?
            }
            EntryMethod::Standard => {
                match self.directory.find(command.attendee_id).await? {
                    Some(attendee) => attendee,
                    None => {
                        return Ok(self.rejected(
                            &key,
                            command.attendee_id,
                            RejectReason::UnknownAttendee {
                                attendee_id: command.attendee_id,
                            },
                        ));
                    }
                }
            }
        };

        if attendee.event_id != command.event_id {
            return Ok(self.rejected(
                &key,
                command.attendee_id,
                RejectReason::UnknownAttendee {
                    attendee_id: command.attendee_id,
                },
            ));
        }

        if !attendee.registration_status.is_admissible() {
            return Ok(self.rejected(
                &key,
                attendee.id,
                RejectReason::NotAdmissible {
                    status: attendee.registration_status,
                },
            ));
        }

        if !attendee.has_completed_waiver {
            return Ok(self.rejected(
                &key,
                attendee.id,
                RejectReason::WaiverIncomplete {
                    attendee_id: attendee.id,
                },
            ));
        }

        let result = handle
            .admit(AdmitRequest {
                attendee_id: attendee.id,
                staff_member_id: command.staff_member_id,
                check_in_time: command.check_in_time,
                notes: command.notes.clone(),
                entry: command.entry.clone(),
                override_capacity: command.override_capacity,
                created_by: command.staff_member_id,
            })
            .await?;

        match &result {
            AdmitResult::Admitted { override_used, .. } => {
                self.directory
                    .mark_checked_in(attendee.id, command.staff_member_id)
                    .await?;
                log_admission(&key.to_string(), attendee.id, true, *override_used);
            }
            AdmitResult::Rejected { reason } => {
                log_admission(&key.to_string(), attendee.id, false, false);
                debug!(
                    session = %key,
                    attendee_id = %attendee.id,
                    reason = %reason.summary(),
                    "Admission rejected by session actor"
                );
            }
        }

        Ok(result)
    }

    fn rejected(
        &self,
        key: &SessionKey,
        attendee_id: Uuid,
        reason: RejectReason,
    ) -> AdmitResult {
        log_admission(&key.to_string(), attendee_id, false, false);
        debug!(
            session = %key,
            %attendee_id,
            reason = %reason.summary(),
            "Admission rejected"
        );
        AdmitResult::Rejected { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::ledger::MemoryCheckInLedger;
    use crate::models::attendee::RegistrationStatus;
    use crate::models::checkin::ManualEntryData;
    use crate::services::registration::MemoryRegistrationDirectory;

    struct Fixture {
        guard: CapacityGuard,
        directory: Arc<MemoryRegistrationDirectory>,
        event_id: Uuid,
    }

    async fn fixture(capacity: i32) -> Fixture {
        let ledger: Arc<dyn CheckInLedger> = Arc::new(MemoryCheckInLedger::new());
        let store = SessionStore::new(Arc::clone(&ledger), 16);
        let event_id = Uuid::new_v4();
        store
            .register_counts(SessionKey::new(event_id, "S1"), capacity, 0, 0)
            .await;

        let directory = Arc::new(MemoryRegistrationDirectory::new());
        let guard = CapacityGuard::new(
            store,
            Arc::clone(&directory) as Arc<dyn RegistrationDirectory>,
            ledger,
        );
        Fixture {
            guard,
            directory,
            event_id,
        }
    }

    fn command(event_id: Uuid, attendee_id: Uuid, override_capacity: bool) -> AdmitCommand {
        AdmitCommand {
            event_id,
            session_code: "S1".to_string(),
            attendee_id,
            staff_member_id: Uuid::new_v4(),
            check_in_time: Utc::now(),
            notes: None,
            entry: EntryMethod::Standard,
            override_capacity,
        }
    }

    #[tokio::test]
    async fn test_admit_confirmed_attendee() {
        let fx = fixture(5).await;
        let attendee = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Confirmed, true)
            .await;

        let result = fx
            .guard
            .admit(command(fx.event_id, attendee.id, false))
            .await
            .unwrap();

        assert!(result.is_admitted());
        let stored = fx.directory.find(attendee.id).await.unwrap().unwrap();
        assert_eq!(stored.registration_status, RegistrationStatus::CheckedIn);
    }

    #[tokio::test]
    async fn test_waitlist_attendee_is_admissible() {
        let fx = fixture(5).await;
        let attendee = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Waitlist, true)
            .await;

        let result = fx
            .guard
            .admit(command(fx.event_id, attendee.id, false))
            .await
            .unwrap();
        assert!(result.is_admitted());

        let stored = fx.directory.find(attendee.id).await.unwrap().unwrap();
        assert_eq!(stored.registration_status, RegistrationStatus::CheckedIn);
        assert_eq!(stored.waitlist_position, None);
    }

    #[tokio::test]
    async fn test_cancelled_attendee_rejected() {
        let fx = fixture(5).await;
        let attendee = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Cancelled, true)
            .await;

        let result = fx
            .guard
            .admit(command(fx.event_id, attendee.id, false))
            .await
            .unwrap();
        match result {
            AdmitResult::Rejected {
                reason: RejectReason::NotAdmissible { status },
            } => assert_eq!(status, RegistrationStatus::Cancelled),
            other => panic!("expected status rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_waiver_rejected() {
        let fx = fixture(5).await;
        let attendee = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Confirmed, false)
            .await;

        let result = fx
            .guard
            .admit(command(fx.event_id, attendee.id, false))
            .await
            .unwrap();
        assert!(matches!(
            result,
            AdmitResult::Rejected {
                reason: RejectReason::WaiverIncomplete { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_attendee_rejected() {
        let fx = fixture(5).await;
        let result = fx
            .guard
            .admit(command(fx.event_id, Uuid::new_v4(), false))
            .await
            .unwrap();
        assert!(matches!(
            result,
            AdmitResult::Rejected {
                reason: RejectReason::UnknownAttendee { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let fx = fixture(5).await;
        let attendee = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Confirmed, true)
            .await;

        let mut cmd = command(fx.event_id, attendee.id, false);
        cmd.session_code = "GHOST".to_string();

        let result = fx.guard.admit(cmd).await.unwrap();
        assert!(matches!(
            result,
            AdmitResult::Rejected {
                reason: RejectReason::UnknownSession { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_full_session_requires_override() {
        let fx = fixture(1).await;
        let first = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Confirmed, true)
            .await;
        let second = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Confirmed, true)
            .await;

        assert!(fx
            .guard
            .admit(command(fx.event_id, first.id, false))
            .await
            .unwrap()
            .is_admitted());

        let refused = fx
            .guard
            .admit(command(fx.event_id, second.id, false))
            .await
            .unwrap();
        assert!(matches!(
            refused,
            AdmitResult::Rejected {
                reason: RejectReason::CapacityExceeded { .. }
            }
        ));

        let overridden = fx
            .guard
            .admit(command(fx.event_id, second.id, true))
            .await
            .unwrap();
        match overridden {
            AdmitResult::Admitted {
                override_used,
                checked_in_count,
                ..
            } => {
                assert!(override_used);
                assert_eq!(checked_in_count, 2);
            }
            other => panic!("expected override admission, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_resolved_before_status_check() {
        let fx = fixture(5).await;
        let attendee = fx
            .directory
            .seed(fx.event_id, RegistrationStatus::Confirmed, true)
            .await;

        assert!(fx
            .guard
            .admit(command(fx.event_id, attendee.id, false))
            .await
            .unwrap()
            .is_admitted());

        // Status is now checked-in, but the replay must classify as a
        // duplicate, not as an inadmissible status.
        let replay = fx
            .guard
            .admit(command(fx.event_id, attendee.id, false))
            .await
            .unwrap();
        match replay {
            AdmitResult::Rejected {
                reason: RejectReason::AlreadyCheckedIn { same_session, .. },
            } => assert!(same_session),
            other => panic!("expected duplicate rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manual_entry_creates_walk_in() {
        let fx = fixture(5).await;
        let walk_in_id = Uuid::new_v4();

        let mut cmd = command(fx.event_id, walk_in_id, false);
        cmd.entry = EntryMethod::Manual {
            data: ManualEntryData {
                name: "Door Guest".to_string(),
                email: "guest@example.com".to_string(),
                phone: None,
            },
        };

        let result = fx.guard.admit(cmd).await.unwrap();
        assert!(result.is_admitted());

        let created = fx.directory.find(walk_in_id).await.unwrap().unwrap();
        assert_eq!(created.registration_status, RegistrationStatus::CheckedIn);
        assert!(created.has_completed_waiver);
    }
}
