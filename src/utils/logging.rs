//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the DoorList engine.

use tracing::{info, warn, error, debug};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use crate::config::LoggingConfig;
use crate::utils::errors::Result;

/// Initialize logging based on configuration.
///
/// The returned guard flushes the rolling file writer; hold it for the
/// lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.file_path, "doorlist.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
        .init();

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log an admission decision with structured data
pub fn log_admission(session: &str, attendee_id: Uuid, admitted: bool, override_used: bool) {
    if admitted {
        info!(
            session = session,
            attendee_id = %attendee_id,
            override_used = override_used,
            "Attendee admitted"
        );
    } else {
        warn!(
            session = session,
            attendee_id = %attendee_id,
            "Admission rejected"
        );
    }
}

/// Log a sync queue entry status transition
pub fn log_sync_transition(entry_id: Uuid, device_id: &str, from: &str, to: &str, retry_count: i32) {
    debug!(
        entry_id = %entry_id,
        device_id = device_id,
        from = from,
        to = to,
        retry_count = retry_count,
        "Sync entry transitioned"
    );
}

/// Log a conflict surfaced for operator attention
pub fn log_conflict(entry_id: Uuid, device_id: &str, reason: &str) {
    warn!(
        entry_id = %entry_id,
        device_id = device_id,
        reason = reason,
        "Sync entry marked as conflict"
    );
}

/// Log a device submission accepted at ingress
pub fn log_device_submission(device_id: &str, event_id: Uuid, action: &str) {
    info!(
        device_id = device_id,
        event_id = %event_id,
        action = action,
        "Device action queued"
    );
}

/// Log operator resolutions and other privileged actions
pub fn log_operator_action(operator_id: Uuid, action: &str, target: Option<&str>, details: Option<&str>) {
    warn!(
        operator_id = %operator_id,
        action = action,
        target = target,
        details = details,
        "Operator action performed"
    );
}

/// Log webhook delivery errors with context
pub fn log_webhook_error(url: &str, error: &str, context: Option<&str>) {
    error!(
        url = url,
        error = error,
        context = context,
        "Webhook delivery failed"
    );
}

/// Log database operations
pub fn log_database_operation(operation: &str, table: &str, duration_ms: u64, success: bool) {
    if success {
        debug!(
            operation = operation,
            table = table,
            duration_ms = duration_ms,
            "Database operation completed"
        );
    } else {
        error!(
            operation = operation,
            table = table,
            duration_ms = duration_ms,
            "Database operation failed"
        );
    }
}
