//! Session capacity store
//!
//! Holds one lightweight actor task per live session. Each actor owns its
//! session's counters and serializes admissions against them, so capacity
//! decisions for a session never race while independent sessions proceed
//! in parallel. The ledger insert happens inside the actor turn, keeping
//! the decision and the durable record atomic from the caller's view.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::attendee::RegistrationStatus;
use crate::models::checkin::{CheckIn, EntryMethod, NewCheckIn};
use crate::models::session::{EventSession, SessionKey, SessionSnapshot};
use crate::utils::errors::{DoorListError, Result};

use super::ledger::{CheckInLedger, LedgerOutcome};

/// Admission parameters handed to a session actor. The session itself is
/// implied by which actor receives the request.
#[derive(Debug, Clone)]
pub struct AdmitRequest {
    pub attendee_id: Uuid,
    pub staff_member_id: Uuid,
    pub check_in_time: DateTime<Utc>,
    pub notes: Option<String>,
    pub entry: EntryMethod,
    pub override_capacity: bool,
    pub created_by: Uuid,
}

/// Why an admission was refused.
#[derive(Debug, Clone)]
pub enum RejectReason {
    CapacityExceeded {
        session: String,
        capacity: i32,
        checked_in: i32,
    },
    AlreadyCheckedIn {
        existing: CheckIn,
        same_session: bool,
    },
    NotAdmissible {
        status: RegistrationStatus,
    },
    WaiverIncomplete {
        attendee_id: Uuid,
    },
    UnknownSession {
        session: String,
    },
    UnknownAttendee {
        attendee_id: Uuid,
    },
}

impl RejectReason {
    /// Short label used in sync conflict reasons and audit descriptions.
    pub fn summary(&self) -> String {
        match self {
            RejectReason::CapacityExceeded {
                session,
                capacity,
                checked_in,
            } => format!(
                "session {} at capacity ({}/{})",
                session, checked_in, capacity
            ),
            RejectReason::AlreadyCheckedIn {
                existing,
                same_session,
            } => {
                if *same_session {
                    format!("already checked in to {}", existing.session_code)
                } else {
                    format!("already checked in to other session {}", existing.session_code)
                }
            }
            RejectReason::NotAdmissible { status } => {
                format!("registration status {} is not admissible", status)
            }
            RejectReason::WaiverIncomplete { attendee_id } => {
                format!("attendee {} has not completed the waiver", attendee_id)
            }
            RejectReason::UnknownSession { session } => {
                format!("unknown session {}", session)
            }
            RejectReason::UnknownAttendee { attendee_id } => {
                format!("unknown attendee {}", attendee_id)
            }
        }
    }
}

/// Result of an admission attempt.
#[derive(Debug, Clone)]
pub enum AdmitResult {
    Admitted {
        check_in: CheckIn,
        /// True when this admission pushed the session past nominal capacity.
        override_used: bool,
        checked_in_count: i32,
    },
    Rejected {
        reason: RejectReason,
    },
}

impl AdmitResult {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmitResult::Admitted { .. })
    }
}

enum SessionCommand {
    Admit {
        request: AdmitRequest,
        reply: oneshot::Sender<Result<AdmitResult>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    SetRegisteredCount {
        count: i32,
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Handle to one session's actor. Cheap to clone; all clones feed the same
/// mailbox.
#[derive(Clone)]
pub struct SessionHandle {
    key: SessionKey,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub async fn admit(&self, request: AdmitRequest) -> Result<AdmitResult> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Admit { request, reply })
            .await
            .map_err(|_| actor_gone(&self.key))?;
        rx.await.map_err(|_| actor_gone(&self.key))?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| actor_gone(&self.key))?;
        rx.await.map_err(|_| actor_gone(&self.key))
    }

    pub async fn set_registered_count(&self, count: i32) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::SetRegisteredCount { count, reply })
            .await
            .map_err(|_| actor_gone(&self.key))?;
        rx.await.map_err(|_| actor_gone(&self.key))
    }
}

fn actor_gone(key: &SessionKey) -> DoorListError {
    DoorListError::ServiceUnavailable(format!("session actor {} is not running", key))
}

struct SessionActor {
    key: SessionKey,
    capacity: i32,
    registered_count: i32,
    checked_in_count: i32,
    ledger: Arc<dyn CheckInLedger>,
}

impl SessionActor {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            key: self.key.clone(),
            capacity: self.capacity,
            registered_count: self.registered_count,
            checked_in_count: self.checked_in_count,
        }
    }

    async fn handle_admit(&mut self, request: AdmitRequest) -> Result<AdmitResult> {
        let at_capacity = self.checked_in_count >= self.capacity;
        if at_capacity && !request.override_capacity {
            return Ok(AdmitResult::Rejected {
                reason: RejectReason::CapacityExceeded {
                    session: self.key.code.clone(),
                    capacity: self.capacity,
                    checked_in: self.checked_in_count,
                },
            });
        }

        let override_used = at_capacity;
        let new = NewCheckIn {
            event_attendee_id: request.attendee_id,
            event_id: self.key.event_id,
            session_code: self.key.code.clone(),
            check_in_time: request.check_in_time,
            staff_member_id: request.staff_member_id,
            notes: request.notes,
            entry: request.entry,
            override_capacity: override_used,
            created_by: request.created_by,
        };

        match self.ledger.record(new).await? {
            LedgerOutcome::Inserted(check_in) => {
                self.checked_in_count += 1;
                if override_used {
                    warn!(
                        session = %self.key,
                        attendee_id = %check_in.event_attendee_id,
                        checked_in = self.checked_in_count,
                        capacity = self.capacity,
                        "Admission exceeded nominal capacity"
                    );
                }
                Ok(AdmitResult::Admitted {
                    check_in,
                    override_used,
                    checked_in_count: self.checked_in_count,
                })
            }
            LedgerOutcome::Duplicate(existing) => {
                let same_session = existing.event_id == self.key.event_id
                    && existing.session_code == self.key.code;
                Ok(AdmitResult::Rejected {
                    reason: RejectReason::AlreadyCheckedIn {
                        existing,
                        same_session,
                    },
                })
            }
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        debug!(session = %self.key, capacity = self.capacity, "Session actor started");
        while let Some(command) = rx.recv().await {
            match command {
                SessionCommand::Admit { request, reply } => {
                    let result = self.handle_admit(request).await;
                    let _ = reply.send(result);
                }
                SessionCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                SessionCommand::SetRegisteredCount { count, reply } => {
                    self.registered_count = count;
                    let _ = reply.send(self.snapshot());
                }
            }
        }
        debug!(session = %self.key, "Session actor stopped");
    }
}

/// Arena of session actors for every session currently being served.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionKey, SessionHandle>>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    ledger: Arc<dyn CheckInLedger>,
    mailbox_size: usize,
}

impl SessionStore {
    pub fn new(ledger: Arc<dyn CheckInLedger>, mailbox_size: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(Vec::new())),
            ledger,
            mailbox_size,
        }
    }

    /// Register a session and spawn its actor, seeded from the given counts.
    /// Registering an already-live session returns the existing handle.
    pub async fn register(&self, session: &EventSession) -> SessionHandle {
        self.register_counts(
            SessionKey::new(session.event_id, session.session_code.clone()),
            session.capacity,
            session.registered_count,
            session.checked_in_count,
        )
        .await
    }

    pub async fn register_counts(
        &self,
        key: SessionKey,
        capacity: i32,
        registered_count: i32,
        checked_in_count: i32,
    ) -> SessionHandle {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&key) {
            debug!(session = %key, "Session already registered");
            return existing.clone();
        }

        let (tx, rx) = mpsc::channel(self.mailbox_size);
        let actor = SessionActor {
            key: key.clone(),
            capacity,
            registered_count,
            checked_in_count,
            ledger: Arc::clone(&self.ledger),
        };
        let task = tokio::spawn(actor.run(rx));
        self.tasks.lock().await.push(task);

        let handle = SessionHandle {
            key: key.clone(),
            tx,
        };
        sessions.insert(key.clone(), handle.clone());
        info!(
            session = %key,
            capacity,
            registered_count,
            checked_in_count,
            "Session registered"
        );
        handle
    }

    pub async fn handle(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.read().await.contains_key(key)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn snapshot(&self, key: &SessionKey) -> Result<Option<SessionSnapshot>> {
        match self.handle(key).await {
            Some(handle) => Ok(Some(handle.snapshot().await?)),
            None => Ok(None),
        }
    }

    /// Snapshots for every live session of one event.
    pub async fn event_snapshots(&self, event_id: Uuid) -> Result<Vec<SessionSnapshot>> {
        let handles: Vec<SessionHandle> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|h| h.key().event_id == event_id)
                .cloned()
                .collect()
        };

        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            snapshots.push(handle.snapshot().await?);
        }
        snapshots.sort_by(|a, b| a.key.code.cmp(&b.key.code));
        Ok(snapshots)
    }

    /// Push a fresh registration count into a session's counters. Returns
    /// the updated snapshot, or None when the session is not live.
    pub async fn set_registered_count(
        &self,
        key: &SessionKey,
        count: i32,
    ) -> Result<Option<SessionSnapshot>> {
        match self.handle(key).await {
            Some(handle) => Ok(Some(handle.set_registered_count(count).await?)),
            None => Ok(None),
        }
    }

    /// Drop every session of one event. Their actors finish queued work and
    /// exit once all handles are gone.
    pub async fn deregister_event(&self, event_id: Uuid) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|key, _| key.event_id != event_id);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(%event_id, removed, "Deregistered event sessions");
        }
        removed
    }

    /// Drop every session and wait for all actors to finish their mailboxes.
    pub async fn shutdown(&self) {
        let count = {
            let mut sessions = self.sessions.write().await;
            let count = sessions.len();
            sessions.clear();
            count
        };

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        info!(sessions = count, "Session store shut down");
    }
}
