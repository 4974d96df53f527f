//! Data models module
//!
//! This module contains all data structures used throughout the application

pub mod session;
pub mod ticket;
pub mod attendee;
pub mod checkin;
pub mod sync;
pub mod audit;

// Re-export commonly used models
pub use session::{EventSession, CreateSessionRequest, SessionKey, SessionSnapshot};
pub use ticket::{TicketType, CreateTicketTypeRequest, PricingMode};
pub use attendee::{EventAttendee, CreateAttendeeRequest, RegistrationStatus};
pub use checkin::{CheckIn, NewCheckIn, EntryMethod, ManualEntryData};
pub use sync::{
    SyncQueueEntry, NewSyncEntry, SyncAction, SyncStatus, CheckInAction, ManualEntryAction,
    StatusUpdateAction, CapacityOverrideAction, AUTO_RETRY_LIMIT, MAX_RETRY_COUNT,
};
pub use audit::{AuditEntry, AuditEvent, AuditAction};
