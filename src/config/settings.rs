//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use serde::{Deserialize, Serialize};

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub capacity: CapacityConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
    pub features: FeaturesConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Sync queue processor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Upper bound on device lanes drained concurrently.
    pub worker_count: usize,
    /// Seconds between drain passes.
    pub drain_interval_seconds: u64,
    /// Base of the exponential backoff schedule, in seconds.
    pub backoff_base_seconds: u64,
    /// Ceiling on a single backoff delay, in seconds.
    pub backoff_cap_seconds: u64,
}

/// Session capacity engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CapacityConfig {
    /// Command mailbox depth for each session actor.
    pub actor_mailbox_size: usize,
}

/// Operator conflict notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub timeout_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: String,
    pub max_file_size: String,
    pub max_files: u32,
}

/// Feature flags configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeaturesConfig {
    /// Refuse door submissions from devices flooding the ingress.
    pub device_rate_limiting: bool,
    /// Per-device sustained submissions per second when limiting is on.
    pub device_rate_per_second: u32,
    /// Burst allowance on top of the sustained rate.
    pub device_rate_burst: u32,
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("DOORLIST"))
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::DoorListError> {
        super::validation::validate_settings(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/doorlist".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            sync: SyncConfig {
                worker_count: 4,
                drain_interval_seconds: 5,
                backoff_base_seconds: 2,
                backoff_cap_seconds: 300,
            },
            capacity: CapacityConfig {
                actor_mailbox_size: 64,
            },
            notifications: NotificationConfig {
                enabled: false,
                webhook_url: None,
                timeout_seconds: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: "/var/log/doorlist".to_string(),
                max_file_size: "10MB".to_string(),
                max_files: 5,
            },
            features: FeaturesConfig {
                device_rate_limiting: true,
                device_rate_per_second: 5,
                device_rate_burst: 20,
            },
        }
    }
}
