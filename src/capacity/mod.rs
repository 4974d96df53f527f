//! Capacity accounting
//!
//! Per-session counters and the admission path. Sessions live as actor
//! tasks inside [`store::SessionStore`]; [`guard::CapacityGuard`] fronts
//! them with registration preconditions, and
//! [`availability::TicketTypeAvailabilityCalculator`] derives ticket
//! availability from their snapshots.

pub mod availability;
pub mod guard;
pub mod ledger;
pub mod store;

pub use availability::{TicketAvailability, TicketTypeAvailabilityCalculator};
pub use guard::{AdmitCommand, CapacityGuard};
pub use ledger::{CheckInLedger, LedgerOutcome, MemoryCheckInLedger, PgCheckInLedger};
pub use store::{AdmitRequest, AdmitResult, RejectReason, SessionHandle, SessionStore};
