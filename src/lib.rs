//! DoorList
//!
//! Event capacity accounting and offline-tolerant check-in synchronization.
//! Session counters live in single-writer actor tasks, ticket availability
//! derives from the bundled sessions, and door-device actions flow through
//! a durable sync queue with bounded retries and operator-facing conflict
//! resolution.

#![allow(non_snake_case)]

pub mod capacity;
pub mod config;
pub mod database;
pub mod models;
pub mod services;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{DoorListError, Result};

// Re-export main components for easy access
pub use capacity::{CapacityGuard, SessionStore, TicketTypeAvailabilityCalculator};
pub use database::DatabaseService;
pub use services::ServiceFactory;
pub use sync::{CheckInConflictResolver, SyncIngress, SyncProcessor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
