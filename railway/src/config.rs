//! Configuration management for the booking core.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::policy::BookingPolicy;
use railway_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Database URL that selects the in-memory stores.
pub const IN_MEMORY_URL: &str = "memory";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Document store configuration
    pub database: DatabaseConfig,
    /// Seat limits and booking windows
    pub booking: BookingConfig,
    /// Optimistic concurrency retry configuration
    pub retry: RetryConfig,
    /// Prometheus metrics configuration
    pub metrics: MetricsConfig,
    /// Log filter (trace, debug, info, warn, error or an `EnvFilter` directive)
    pub log_level: String,
}

/// Document store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL, or `memory` for the in-memory stores
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Seat limits and booking windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Most seats a single reservation may hold
    pub max_seats: u32,
    /// How many days ahead a reservation may be made
    pub horizon_days: u32,
    /// Reservations can no longer be changed this many days before travel
    pub modification_window_days: u32,
}

/// Optimistic concurrency retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt on a version conflict
    pub max_attempts: usize,
    /// First backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
}

/// Prometheus metrics configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder
    pub enabled: bool,
    /// Metrics server host (for Prometheus scraping)
    pub host: String,
    /// Metrics server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.database.max_connections),
            },
            booking: BookingConfig {
                max_seats: env::var("BOOKING_MAX_SEATS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.booking.max_seats),
                horizon_days: env::var("BOOKING_HORIZON_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.booking.horizon_days),
                modification_window_days: env::var("BOOKING_MODIFICATION_WINDOW_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.booking.modification_window_days),
            },
            retry: RetryConfig {
                max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_attempts),
                initial_delay_ms: env::var("RETRY_INITIAL_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.initial_delay_ms),
                max_delay_ms: env::var("RETRY_MAX_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_delay_ms),
            },
            metrics: MetricsConfig {
                enabled: env::var("METRICS_ENABLED")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.metrics.enabled),
                host: env::var("METRICS_HOST").unwrap_or(defaults.metrics.host),
                port: env::var("METRICS_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.metrics.port),
            },
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Whether the in-memory stores are selected.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database.url == IN_MEMORY_URL
    }

    /// Seat limits and windows as a policy.
    #[must_use]
    pub const fn booking_policy(&self) -> BookingPolicy {
        BookingPolicy {
            max_seats: self.booking.max_seats,
            horizon_days: self.booking.horizon_days,
            modification_window_days: self.booking.modification_window_days,
        }
    }

    /// Backoff for optimistic concurrency retries.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.retry.max_attempts)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .build()
    }
}

impl Default for Config {
    fn default() -> Self {
        let policy = BookingPolicy::default();
        Self {
            database: DatabaseConfig {
                url: IN_MEMORY_URL.to_string(),
                max_connections: 10,
            },
            booking: BookingConfig {
                max_seats: policy.max_seats,
                horizon_days: policy.horizon_days,
                modification_window_days: policy.modification_window_days,
            },
            retry: RetryConfig {
                max_attempts: 5,
                initial_delay_ms: 5,
                max_delay_ms: 200,
            },
            metrics: MetricsConfig {
                enabled: false,
                host: "0.0.0.0".to_string(),
                port: 9090,
            },
            log_level: "info".to_string(),
        }
    }
}
