use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::DEFAULT_EVENT_CAPACITY;

/// canonical status names the engine looks up by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNames {
    /// initial status of every new application
    pub pending_review: String,
    pub pending_review_description: String,
    /// status whose applications count as active debt
    pub approved: String,
}

impl Default for StatusNames {
    fn default() -> Self {
        Self {
            pending_review: "PENDIENTE_REVISION".to_string(),
            pending_review_description: "Pendiente de revisión por un analista".to_string(),
            approved: "APROBADO".to_string(),
        }
    }
}

/// logical topics of the two outbound channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTopics {
    pub notifications: String,
    pub validation_requests: String,
}

impl Default for ChannelTopics {
    fn default() -> Self {
        Self {
            notifications: "loan-notifications".to_string(),
            validation_requests: "loan-validation-requests".to_string(),
        }
    }
}

/// tracing controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub statuses: StatusNames,
    pub channels: ChannelTopics,
    /// find-or-create rounds for the pending status before giving up
    pub status_creation_attempts: u32,
    /// lifecycle events retained in memory before the oldest are evicted
    pub event_log_capacity: usize,
    pub telemetry: TelemetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            statuses: StatusNames::default(),
            channels: ChannelTopics::default(),
            status_creation_attempts: 3,
            event_log_capacity: DEFAULT_EVENT_CAPACITY,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// load from `.env` and the process environment, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let attempts = env_number("LOAN_STATUS_CREATE_ATTEMPTS", defaults.status_creation_attempts)?;
        let event_log_capacity = env_number("LOAN_EVENT_LOG_CAPACITY", defaults.event_log_capacity)?;

        let config = Self {
            statuses: StatusNames {
                pending_review: env_or("LOAN_PENDING_STATUS", defaults.statuses.pending_review),
                pending_review_description: env_or(
                    "LOAN_PENDING_DESCRIPTION",
                    defaults.statuses.pending_review_description,
                ),
                approved: env_or("LOAN_APPROVED_STATUS", defaults.statuses.approved),
            },
            channels: ChannelTopics {
                notifications: env_or("LOAN_NOTIFICATION_TOPIC", defaults.channels.notifications),
                validation_requests: env_or(
                    "LOAN_VALIDATION_TOPIC",
                    defaults.channels.validation_requests,
                ),
            },
            status_creation_attempts: attempts,
            event_log_capacity,
            telemetry: TelemetryConfig {
                log_level: env_or("LOAN_LOG_LEVEL", defaults.telemetry.log_level),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("statuses.pending_review", &self.statuses.pending_review),
            ("statuses.approved", &self.statuses.approved),
            ("channels.notifications", &self.channels.notifications),
            ("channels.validation_requests", &self.channels.validation_requests),
        ];
        for (key, value) in named {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty { key });
            }
        }

        if self.status_creation_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.event_log_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }

        Ok(())
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        Err(_) => Ok(default),
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must not be empty")]
    Empty { key: &'static str },

    #[error("status_creation_attempts must be at least 1")]
    ZeroAttempts,

    #[error("event_log_capacity must be at least 1")]
    ZeroEventCapacity,
}
