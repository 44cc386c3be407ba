//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the booking services:
//! - Reservation lifecycle (created, updated, cancelled, rejected)
//! - Catalog lifecycle (schedules added and removed)
//! - Consistency (optimistic retries, reconciliation repairs)
//!
//! Without an installed recorder every call is a no-op, so services record
//! unconditionally and the binary decides whether to export.
//!
//! # Example
//!
//! ```rust,no_run
//! use railway_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! println!("{}", server.render().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs the global recorder and renders the scrape payload on demand.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the scrape endpoint is advertised on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. by another test), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "railway_reservations_created_total",
        "Total number of reservations created"
    );
    describe_counter!(
        "railway_reservations_updated_total",
        "Total number of reservation seat-count changes"
    );
    describe_counter!(
        "railway_reservations_cancelled_total",
        "Total number of reservations cancelled"
    );
    describe_counter!(
        "railway_booking_rejections_total",
        "Total number of booking commands rejected by a business rule"
    );
    describe_counter!(
        "railway_schedules_added_total",
        "Total number of schedules added"
    );
    describe_counter!(
        "railway_schedules_deleted_total",
        "Total number of schedules deleted, individually or by cascade"
    );
    describe_counter!(
        "railway_optimistic_retries_total",
        "Total number of writes refused by a version conflict"
    );
    describe_counter!(
        "railway_reconcile_repairs_total",
        "Total number of repairs applied by the reconciliation pass"
    );
    describe_histogram!(
        "railway_reconcile_duration_seconds",
        "Time taken by a full reconciliation pass"
    );
}

/// Booking engine metrics recorder.
pub struct BookingMetrics;

impl BookingMetrics {
    /// Record a created reservation.
    pub fn record_created(seats: u32) {
        counter!("railway_reservations_created_total").increment(1);
        histogram!("railway_reservation_seats").record(f64::from(seats));
    }

    /// Record a seat-count change.
    pub fn record_updated() {
        counter!("railway_reservations_updated_total").increment(1);
    }

    /// Record a cancellation.
    pub fn record_cancelled() {
        counter!("railway_reservations_cancelled_total").increment(1);
    }

    /// Record a command rejected by a business rule.
    pub fn record_rejection(reason: &'static str) {
        counter!("railway_booking_rejections_total", "reason" => reason).increment(1);
    }
}

/// Catalog metrics recorder.
pub struct CatalogMetrics;

impl CatalogMetrics {
    /// Record an added schedule.
    pub fn record_schedule_added() {
        counter!("railway_schedules_added_total").increment(1);
    }

    /// Record deleted schedules.
    pub fn record_schedules_deleted(count: usize) {
        counter!("railway_schedules_deleted_total").increment(count as u64);
    }
}

/// Consistency metrics recorder.
pub struct ConsistencyMetrics;

impl ConsistencyMetrics {
    /// Record a write refused by a version conflict.
    pub fn record_optimistic_retry(entity: &'static str) {
        counter!("railway_optimistic_retries_total", "entity" => entity).increment(1);
    }

    /// Record a reconciliation repair.
    pub fn record_repair(kind: &'static str) {
        counter!("railway_reconcile_repairs_total", "kind" => kind).increment(1);
    }

    /// Record a full reconciliation pass.
    pub fn record_pass(duration: Duration) {
        histogram!("railway_reconcile_duration_seconds").record(duration.as_secs_f64());
    }
}
