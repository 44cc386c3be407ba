//! Train entity and its lifecycle state machine.
//!
//! # Lifecycle
//!
//! ```text
//!              Publish / first AddSchedule
//!  ┌─────────────┐ ─────────────────────► ┌───────────┐
//!  │ Unpublished │                        │ Published │
//!  └─────────────┘ ◄───────────────────── └───────────┘
//!        ▲  │           Unpublish               │
//! Activate  │ Deactivate                         │ Deactivate
//!        │  ▼                                    ▼
//!  ┌──────────────────────────────────────────────────┐
//!  │                    Inactive                      │
//!  └──────────────────────────────────────────────────┘
//! ```
//!
//! `Inactive` implies unpublished, so "published but inactive" cannot be
//! represented. Publishing an inactive train is refused.

use crate::aggregates::Schedule;
use crate::error::{BookingError, ConflictReason};
use crate::types::{Capacity, ScheduleId, Station, TrainId, TrainType};
use chrono::NaiveDate;
use railway_core::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle state of a train.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainStatus {
    /// Active, not visible to travelers.
    Unpublished,
    /// Active and visible to travelers.
    Published,
    /// Withdrawn from service; never published.
    Inactive,
}

/// Requested lifecycle change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainTransition {
    /// Make the train visible to travelers.
    Publish,
    /// Hide the train; future schedules are removed.
    Unpublish,
    /// Return an inactive train to service (schedules are not restored).
    Activate,
    /// Withdraw the train; future schedules are removed.
    Deactivate,
}

impl TrainTransition {
    /// Whether the transition removes the train's future schedules.
    #[must_use]
    pub const fn removes_future_schedules(self) -> bool {
        matches!(self, Self::Unpublish | Self::Deactivate)
    }
}

impl TrainStatus {
    /// Stored representation, used in search criteria.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unpublished => "unpublished",
            Self::Published => "published",
            Self::Inactive => "inactive",
        }
    }

    /// Whether the train is in service.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Inactive)
    }

    /// Whether travelers can see the train.
    #[must_use]
    pub const fn is_published(self) -> bool {
        matches!(self, Self::Published)
    }

    /// Transition table.
    ///
    /// # Errors
    ///
    /// `TrainInactive` when publishing an inactive train.
    pub const fn apply(self, transition: TrainTransition) -> Result<Self, ConflictReason> {
        match (self, transition) {
            (Self::Inactive, TrainTransition::Publish) => Err(ConflictReason::TrainInactive),
            (_, TrainTransition::Publish) => Ok(Self::Published),
            (Self::Inactive, TrainTransition::Unpublish | TrainTransition::Deactivate) => {
                Ok(Self::Inactive)
            }
            (_, TrainTransition::Unpublish) => Ok(Self::Unpublished),
            (_, TrainTransition::Deactivate) => Ok(Self::Inactive),
            (Self::Inactive, TrainTransition::Activate) => Ok(Self::Unpublished),
            (status, TrainTransition::Activate) => Ok(status),
        }
    }
}

/// Fields accepted by `CreateTrain`, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrain {
    /// Display name.
    pub name: String,
    /// Service category.
    pub train_type: TrainType,
    /// Seats per departure.
    pub capacity: u32,
    /// Origin station, any case.
    pub departure_station: String,
    /// Destination station, any case.
    pub arrival_station: String,
}

/// A train and the set of schedules it currently owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Train {
    /// Identity.
    pub id: TrainId,
    /// Display name.
    pub name: String,
    /// Service category.
    pub train_type: TrainType,
    /// Seats per departure.
    pub capacity: Capacity,
    /// Origin station.
    pub departure_station: Station,
    /// Destination station.
    pub arrival_station: Station,
    /// Schedules owned by this train.
    pub schedule_ids: BTreeSet<ScheduleId>,
    /// Distinct dates among `schedule_ids`.
    pub available_dates: BTreeSet<NaiveDate>,
    /// Lifecycle state.
    pub status: TrainStatus,
}

impl Document for Train {
    const COLLECTION: &'static str = "trains";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Train {
    /// Validate and build a new active, unpublished train.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on a blank name, zero capacity, blank stations, or
    /// identical departure and arrival stations.
    pub fn create(new: NewTrain) -> Result<Self, BookingError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(BookingError::invalid("Train name must not be empty"));
        }
        if new.capacity == 0 {
            return Err(BookingError::invalid("Capacity must be greater than zero"));
        }
        let departure_station =
            Station::parse(&new.departure_station).map_err(BookingError::InvalidInput)?;
        let arrival_station =
            Station::parse(&new.arrival_station).map_err(BookingError::InvalidInput)?;
        if departure_station == arrival_station {
            return Err(BookingError::invalid(format!(
                "Departure and arrival stations must differ ({departure_station})"
            )));
        }

        Ok(Self {
            id: TrainId::new(),
            name,
            train_type: new.train_type,
            capacity: Capacity::new(new.capacity),
            departure_station,
            arrival_station,
            schedule_ids: BTreeSet::new(),
            available_dates: BTreeSet::new(),
            status: TrainStatus::Unpublished,
        })
    }

    /// Record a new schedule; the first schedule publishes the train.
    ///
    /// # Errors
    ///
    /// `Conflict(TrainInactive)` if the train is inactive.
    pub fn attach_schedule(&mut self, schedule: &Schedule) -> Result<(), BookingError> {
        if !self.status.is_active() {
            return Err(BookingError::conflict(ConflictReason::TrainInactive));
        }
        self.schedule_ids.insert(schedule.id);
        self.available_dates.insert(schedule.date);
        if self.status == TrainStatus::Unpublished {
            self.status = TrainStatus::Published;
        }
        Ok(())
    }

    /// Forget removed schedules and rebuild `available_dates` from the ones
    /// that remain.
    pub fn detach_schedules<'a>(
        &mut self,
        removed: impl IntoIterator<Item = &'a ScheduleId>,
        remaining: &[Schedule],
    ) {
        for id in removed {
            self.schedule_ids.remove(id);
        }
        self.available_dates = remaining
            .iter()
            .filter(|schedule| self.schedule_ids.contains(&schedule.id))
            .map(|schedule| schedule.date)
            .collect();
    }
}
