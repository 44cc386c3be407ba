//! Pure repair computations.
//!
//! Live reservations are the source of truth. From them alone these functions
//! derive what a schedule's seat counter and back-references, a train's date
//! set and a traveler's reservation set should be. The coordinator applies
//! the results; tests use them as an oracle.

use crate::aggregates::{Reservation, Schedule};
use crate::types::{Capacity, Nic, ReservationId, ScheduleId, TrainId};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// What a schedule's seat counter should be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatCount {
    /// Seats left for sale.
    Available(u32),
    /// Live reservations hold more seats than can be sold.
    Overbooked {
        /// Seats held beyond the sellable capacity.
        excess: u32,
    },
}

/// Corrected state of one schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleRepair {
    /// Corrected seat counter.
    pub seats: SeatCount,
    /// Seats held by each live reservation on the schedule.
    pub reservation_ids: BTreeMap<ReservationId, u32>,
}

impl ScheduleRepair {
    /// Whether applying the repair would change `schedule`.
    #[must_use]
    pub fn differs_from(&self, schedule: &Schedule) -> bool {
        self.reservation_ids != schedule.reservation_ids
            || self.seats != SeatCount::Available(schedule.available_seats)
    }
}

/// Recompute a schedule's counter and references from its live reservations.
///
/// Reservations for other schedules, and cancelled ones, are ignored.
#[must_use]
pub fn compute_schedule_repair(
    schedule: &Schedule,
    capacity: Capacity,
    reservations: &[Reservation],
) -> ScheduleRepair {
    let live: Vec<&Reservation> = reservations
        .iter()
        .filter(|reservation| reservation.schedule_id == schedule.id && reservation.is_live())
        .collect();

    let held: u64 = live.iter().map(|reservation| u64::from(reservation.seats)).sum();
    let sellable = u64::from(schedule.sellable(capacity));

    let seats = if held > sellable {
        SeatCount::Overbooked {
            excess: u32::try_from(held - sellable).unwrap_or(u32::MAX),
        }
    } else {
        // held <= sellable <= u32::MAX
        SeatCount::Available(u32::try_from(sellable - held).unwrap_or(u32::MAX))
    };

    ScheduleRepair {
        seats,
        reservation_ids: live
            .iter()
            .map(|reservation| (reservation.id, reservation.seats))
            .collect(),
    }
}

/// Distinct dates among a train's schedules.
#[must_use]
pub fn compute_available_dates(schedules: &[Schedule]) -> BTreeSet<NaiveDate> {
    schedules.iter().map(|schedule| schedule.date).collect()
}

/// Ids of a traveler's live reservations.
#[must_use]
pub fn compute_traveler_refs(nic: &Nic, reservations: &[Reservation]) -> BTreeSet<ReservationId> {
    reservations
        .iter()
        .filter(|reservation| &reservation.traveler_id == nic && reservation.is_live())
        .map(|reservation| reservation.id)
        .collect()
}

/// A correction written back by the coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Repair {
    /// Schedule seat counter rewritten.
    SeatsCorrected {
        /// Schedule repaired.
        schedule_id: ScheduleId,
        /// Stored value.
        from: u32,
        /// Recomputed value.
        to: u32,
    },
    /// Schedule reservation references rewritten.
    ScheduleRefsCorrected {
        /// Schedule repaired.
        schedule_id: ScheduleId,
    },
    /// Train schedule references rewritten.
    TrainRefsCorrected {
        /// Train repaired.
        train_id: TrainId,
        /// References to schedules that no longer exist.
        removed: usize,
        /// Schedules of the train that were not referenced.
        added: usize,
    },
    /// Train date set rewritten.
    AvailableDatesCorrected {
        /// Train repaired.
        train_id: TrainId,
    },
    /// Train unpublished after its last future schedule turned out to be gone.
    PublishStateCorrected {
        /// Train repaired.
        train_id: TrainId,
    },
    /// Traveler reservation references rewritten.
    TravelerRefsCorrected {
        /// Traveler repaired.
        nic: Nic,
    },
}

impl Repair {
    /// Metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::SeatsCorrected { .. } => "seats",
            Self::ScheduleRefsCorrected { .. } => "schedule_refs",
            Self::TrainRefsCorrected { .. } => "train_refs",
            Self::AvailableDatesCorrected { .. } => "available_dates",
            Self::PublishStateCorrected { .. } => "publish_state",
            Self::TravelerRefsCorrected { .. } => "traveler_refs",
        }
    }
}

/// An inconsistency that needs a human.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Finding {
    /// Live reservations exceed the sellable seats.
    Overbooked {
        /// Schedule affected.
        schedule_id: ScheduleId,
        /// Seats over the limit.
        excess: u32,
    },
    /// Schedule whose train no longer exists.
    MissingTrain {
        /// Schedule affected.
        schedule_id: ScheduleId,
        /// Train referenced.
        train_id: TrainId,
    },
}

/// Outcome of a reconciliation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Corrections written.
    pub repairs: Vec<Repair>,
    /// Problems reported but not written.
    pub findings: Vec<Finding>,
}

impl ReconcileReport {
    /// Whether nothing was wrong.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty() && self.findings.is_empty()
    }

    /// Append another report.
    pub fn merge(&mut self, other: Self) {
        self.repairs.extend(other.repairs);
        self.findings.extend(other.findings);
    }
}
