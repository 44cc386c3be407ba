//! Entities of the railway booking core.
//!
//! Each entity is a versioned document in its own collection:
//! - [`Train`]: capacity, stations and the lifecycle state machine
//! - [`Schedule`]: one dated departure with its seat inventory
//! - [`Reservation`]: seats held on a schedule, snapshotting its times
//! - [`Traveler`]: NIC-keyed account with its live reservation set

pub mod reservation;
pub mod schedule;
pub mod train;
pub mod traveler;

pub use reservation::Reservation;
pub use schedule::{NewSchedule, Schedule, ScheduleUpdate};
pub use train::{NewTrain, Train, TrainStatus, TrainTransition};
pub use traveler::{NewTraveler, Traveler};
