//! Error handling for DoorList
//!
//! This module defines the main error types used throughout the application
//! and provides a unified error handling strategy.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for the DoorList engine
#[derive(Error, Debug)]
pub enum DoorListError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Capacity exceeded for session {session}")]
    CapacityExceeded { session: String },

    #[error("Event not found: {event_id}")]
    EventNotFound { event_id: Uuid },

    #[error("Session not found: {session}")]
    SessionNotFound { session: String },

    #[error("Attendee not found: {attendee_id}")]
    AttendeeNotFound { attendee_id: Uuid },

    #[error("Ticket type not found: {ticket_type_id}")]
    TicketTypeNotFound { ticket_type_id: Uuid },

    #[error("Queue entry not found: {entry_id}")]
    QueueEntryNotFound { entry_id: Uuid },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Retry ceiling reached for queue entry {entry_id}")]
    RetryCeilingExceeded { entry_id: Uuid },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Conflict notification specific errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Webhook request failed: {0}")]
    RequestFailed(String),

    #[error("Webhook timeout")]
    Timeout,

    #[error("Invalid webhook response: {0}")]
    InvalidResponse(String),

    #[error("Notifications disabled")]
    Disabled,
}

/// Result type alias for DoorList operations
pub type Result<T> = std::result::Result<T, DoorListError>;

/// Result type alias for notification operations
pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

impl DoorListError {
    /// Check if the error is transient and worth re-driving through the
    /// sync queue's bounded retry path
    pub fn is_transient(&self) -> bool {
        match self {
            DoorListError::Database(_) => true,
            DoorListError::Migration(_) => false,
            DoorListError::Notify(_) => true,
            DoorListError::Config(_) => false,
            DoorListError::Validation(_) => false,
            DoorListError::CapacityExceeded { .. } => false,
            DoorListError::EventNotFound { .. } => false,
            DoorListError::SessionNotFound { .. } => false,
            DoorListError::AttendeeNotFound { .. } => false,
            DoorListError::TicketTypeNotFound { .. } => false,
            DoorListError::QueueEntryNotFound { .. } => false,
            DoorListError::InvalidStateTransition { .. } => false,
            DoorListError::RetryCeilingExceeded { .. } => false,
            DoorListError::Http(_) => true,
            DoorListError::Serialization(_) => false,
            DoorListError::Io(_) => true,
            DoorListError::UrlParse(_) => false,
            DoorListError::RateLimitExceeded => true,
            DoorListError::InvalidInput(_) => false,
            DoorListError::ServiceUnavailable(_) => true,
        }
    }

    /// Check if the error marks a reference that no longer resolves
    /// (session/attendee/ticket gone) and needs operator attention
    pub fn is_stale_reference(&self) -> bool {
        matches!(
            self,
            DoorListError::EventNotFound { .. }
                | DoorListError::SessionNotFound { .. }
                | DoorListError::AttendeeNotFound { .. }
                | DoorListError::TicketTypeNotFound { .. }
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DoorListError::Database(_) => ErrorSeverity::Critical,
            DoorListError::Migration(_) => ErrorSeverity::Critical,
            DoorListError::Config(_) => ErrorSeverity::Critical,
            DoorListError::Validation(_) => ErrorSeverity::Warning,
            DoorListError::CapacityExceeded { .. } => ErrorSeverity::Warning,
            DoorListError::RateLimitExceeded => ErrorSeverity::Warning,
            DoorListError::InvalidInput(_) => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
