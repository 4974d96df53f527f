//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{DoorListError, Result};
use super::Settings;

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_database_config(&settings.database)?;
    validate_sync_config(&settings.sync)?;
    validate_capacity_config(&settings.capacity)?;
    validate_notification_config(&settings.notifications)?;
    validate_logging_config(&settings.logging)?;
    validate_features_config(&settings.features)?;

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(DoorListError::Config(
            "Database URL is required".to_string()
        ));
    }

    if config.max_connections == 0 {
        return Err(DoorListError::Config(
            "Max connections must be greater than 0".to_string()
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(DoorListError::Config(
            "Min connections cannot be greater than max connections".to_string()
        ));
    }

    Ok(())
}

/// Validate sync processor configuration
fn validate_sync_config(config: &super::SyncConfig) -> Result<()> {
    if config.worker_count == 0 {
        return Err(DoorListError::Config(
            "Sync worker count must be greater than 0".to_string()
        ));
    }

    if config.drain_interval_seconds == 0 {
        return Err(DoorListError::Config(
            "Sync drain interval must be greater than 0".to_string()
        ));
    }

    if config.backoff_base_seconds == 0 {
        return Err(DoorListError::Config(
            "Backoff base must be greater than 0".to_string()
        ));
    }

    if config.backoff_cap_seconds < config.backoff_base_seconds {
        return Err(DoorListError::Config(
            "Backoff cap cannot be less than the backoff base".to_string()
        ));
    }

    Ok(())
}

/// Validate capacity engine configuration
fn validate_capacity_config(config: &super::CapacityConfig) -> Result<()> {
    if config.actor_mailbox_size == 0 {
        return Err(DoorListError::Config(
            "Session actor mailbox size must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate notification configuration
fn validate_notification_config(config: &super::NotificationConfig) -> Result<()> {
    if config.enabled {
        let webhook = config.webhook_url.as_deref().ok_or_else(|| {
            DoorListError::Config(
                "Webhook URL is required when notifications are enabled".to_string()
            )
        })?;

        let parsed = url::Url::parse(webhook).map_err(|e| {
            DoorListError::Config(format!("Invalid webhook URL: {}", e))
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DoorListError::Config(
                "Webhook URL must use http or https".to_string()
            ));
        }
    }

    if config.timeout_seconds == 0 {
        return Err(DoorListError::Config(
            "Notification timeout must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(DoorListError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(DoorListError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}

/// Validate feature flags configuration
fn validate_features_config(config: &super::FeaturesConfig) -> Result<()> {
    if config.device_rate_limiting {
        if config.device_rate_per_second == 0 {
            return Err(DoorListError::Config(
                "Device rate limit must be greater than 0".to_string()
            ));
        }

        if config.device_rate_burst < config.device_rate_per_second {
            return Err(DoorListError::Config(
                "Device rate burst cannot be less than the sustained rate".to_string()
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        let settings = Settings::default();
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_enabled_notifications_require_webhook() {
        let mut settings = Settings::default();
        settings.notifications.enabled = true;
        settings.notifications.webhook_url = None;
        assert!(validate_settings(&settings).is_err());

        settings.notifications.webhook_url = Some("not a url".to_string());
        assert!(validate_settings(&settings).is_err());

        settings.notifications.webhook_url = Some("ftp://ops.example.com".to_string());
        assert!(validate_settings(&settings).is_err());

        settings.notifications.webhook_url =
            Some("https://ops.example.com/hooks/doorlist".to_string());
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_backoff_cap_bounds_base() {
        let mut settings = Settings::default();
        settings.sync.backoff_cap_seconds = 1;
        settings.sync.backoff_base_seconds = 2;
        assert!(validate_settings(&settings).is_err());
    }
}
