//! Database repositories module
//!
//! This module contains all repository implementations for data access

pub mod attendee;
pub mod audit;
pub mod checkin;
pub mod session;
pub mod sync_queue;
pub mod ticket;

// Re-export repositories
pub use attendee::AttendeeRepository;
pub use audit::AuditRepository;
pub use checkin::CheckInRepository;
pub use session::SessionRepository;
pub use sync_queue::SyncQueueRepository;
pub use ticket::TicketTypeRepository;
