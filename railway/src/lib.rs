//! Railway Booking - seat inventory and reservation consistency core
//!
//! Trains run on dated schedules; travelers book seats on a schedule. Four
//! kinds of document are stored, each in its own collection:
//!
//! - **Train**: route, capacity, lifecycle status, references to its schedules
//! - **Schedule**: one dated run with the seat counter and its reservation ids
//! - **Reservation**: seats held by a traveler on a schedule
//! - **Traveler**: identity (NIC) and reservation ids
//!
//! # Architecture
//!
//! ```text
//!   CatalogService   BookingService   TravelerService   Coordinator
//!         │                │                 │               │
//!         └────────────────┴────────┬────────┴───────────────┘
//!                                   │
//!                         BookingEnvironment
//!                    (stores, clock, policy, retry)
//!                                   │
//!        ┌──────────────┬───────────┴────┬─────────────────┐
//!     trains        schedules      reservations        travelers
//!        └──────── DocumentStore<T> (in-memory or PostgreSQL) ┘
//! ```
//!
//! # Consistency
//!
//! The store has no multi-document transaction. Every composite command is an
//! ordered list of single-document compare-and-swap writes:
//!
//! ```text
//! CreateReservation:
//! 1. insert reservation
//! 2. schedule: re-check, allocate seats, add id   (failure: void 1)
//! 3. traveler: add id                              (failure: undo 2, void 1)
//! ```
//!
//! A conflict on any write re-reads and re-checks the rule, so the seat
//! counter can never go negative and two bookings can never share the last
//! seat. A crash between writes leaves a state that the [`app::Coordinator`]
//! repairs by recomputing counters and references from live reservations.
//!
//! # Usage
//!
//! See [`app::RailwayApp`] for wiring and [`aggregates`] for the documents.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod app;
pub mod config;
pub mod environment;
pub mod error;
pub mod policy;
pub mod reconcile;
pub mod types;

pub use aggregates::{
    NewSchedule, NewTrain, NewTraveler, Reservation, Schedule, ScheduleUpdate, Train, TrainStatus,
    TrainTransition, Traveler,
};
pub use app::{
    AppError, BookingService, CatalogService, Coordinator, InMemoryStores, RailwayApp,
    TrainDetails, TrainSearch, TravelerProfile, TravelerReservations, TravelerService,
};
pub use config::Config;
pub use environment::BookingEnvironment;
pub use error::{BookingError, ConflictReason, ErrorKind, ServiceResponse};
pub use policy::{BookingPolicy, Moment};
pub use reconcile::{Finding, ReconcileReport, Repair};
pub use types::*;
