//! Application wiring.
//!
//! [`RailwayApp`] builds one [`BookingEnvironment`] (stores, clock, policy,
//! retry) and hands it to every service:
//! - [`CatalogService`]: trains and schedules
//! - [`BookingService`]: reservations
//! - [`TravelerService`]: the traveler registry
//! - [`Coordinator`]: reconciliation

mod booking;
mod catalog;
mod coordinator;
mod travelers;

pub use booking::{BookingService, TravelerReservations};
pub use catalog::{CatalogService, TrainDetails, TrainSearch};
pub use coordinator::Coordinator;
pub use travelers::{TravelerProfile, TravelerService};

use crate::aggregates::{Reservation, Schedule, Train, Traveler};
use crate::config::Config;
use crate::environment::BookingEnvironment;
use railway_core::StoreError;
use railway_core::environment::Clock;
use railway_postgres::PostgresDocumentStore;
use railway_testing::InMemoryDocumentStore;
use std::sync::Arc;
use thiserror::Error;

/// Application errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Store connection or migration failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Handles to the four in-memory collections.
///
/// Clones share their contents, so a test can keep one copy to inject faults
/// and inspect documents while the app writes through another.
#[derive(Clone, Default)]
pub struct InMemoryStores {
    /// Trains
    pub trains: InMemoryDocumentStore<Train>,
    /// Schedules
    pub schedules: InMemoryDocumentStore<Schedule>,
    /// Reservations
    pub reservations: InMemoryDocumentStore<Reservation>,
    /// Travelers
    pub travelers: InMemoryDocumentStore<Traveler>,
}

/// The booking core with its services wired to one environment.
#[derive(Clone)]
pub struct RailwayApp {
    env: BookingEnvironment,
    catalog: CatalogService,
    booking: BookingService,
    travelers: TravelerService,
    coordinator: Coordinator,
}

impl RailwayApp {
    /// Wire every service to `env`.
    #[must_use]
    pub fn new(env: BookingEnvironment) -> Self {
        Self {
            catalog: CatalogService::new(env.clone()),
            booking: BookingService::new(env.clone()),
            travelers: TravelerService::new(env.clone()),
            coordinator: Coordinator::new(env.clone()),
            env,
        }
    }

    /// App over fresh in-memory stores.
    #[must_use]
    pub fn in_memory(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::in_memory_with_stores(config, clock, InMemoryStores::default())
    }

    /// App over the given in-memory stores.
    #[must_use]
    pub fn in_memory_with_stores(
        config: &Config,
        clock: Arc<dyn Clock>,
        stores: InMemoryStores,
    ) -> Self {
        Self::new(BookingEnvironment {
            trains: Arc::new(stores.trains),
            schedules: Arc::new(stores.schedules),
            reservations: Arc::new(stores.reservations),
            travelers: Arc::new(stores.travelers),
            clock,
            policy: config.booking_policy(),
            retry: config.retry_policy(),
        })
    }

    /// App over `PostgreSQL`, running migrations first.
    ///
    /// # Errors
    ///
    /// Returns error if the connection or a migration fails.
    pub async fn postgres(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        tracing::info!("Connecting to PostgreSQL");
        let pool =
            railway_postgres::connect(&config.database.url, config.database.max_connections)
                .await?;
        tracing::info!("Running database migrations...");
        railway_postgres::migrate(&pool).await?;

        Ok(Self::new(BookingEnvironment {
            trains: Arc::new(PostgresDocumentStore::<Train>::new(pool.clone())),
            schedules: Arc::new(PostgresDocumentStore::<Schedule>::new(pool.clone())),
            reservations: Arc::new(PostgresDocumentStore::<Reservation>::new(pool.clone())),
            travelers: Arc::new(PostgresDocumentStore::<Traveler>::new(pool)),
            clock,
            policy: config.booking_policy(),
            retry: config.retry_policy(),
        }))
    }

    /// In-memory or `PostgreSQL`, as `config.database.url` selects.
    ///
    /// # Errors
    ///
    /// Returns error if the `PostgreSQL` store cannot be reached.
    pub async fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        if config.is_in_memory() {
            tracing::info!("Using in-memory document stores");
            Ok(Self::in_memory(config, clock))
        } else {
            Self::postgres(config, clock).await
        }
    }

    /// Trains and schedules.
    #[must_use]
    pub const fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    /// Reservations.
    #[must_use]
    pub const fn booking(&self) -> &BookingService {
        &self.booking
    }

    /// Traveler registry.
    #[must_use]
    pub const fn travelers(&self) -> &TravelerService {
        &self.travelers
    }

    /// Reconciliation.
    #[must_use]
    pub const fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// The shared environment.
    #[must_use]
    pub const fn environment(&self) -> &BookingEnvironment {
        &self.env
    }
}
