//! Reservation entity.
//!
//! Date and times are copied from the schedule when the reservation is
//! created and never re-derived, so later schedule edits leave existing
//! bookings untouched. Cancelled reservations are kept for history.

use crate::aggregates::Schedule;
use crate::policy::Moment;
use crate::types::{Nic, ReservationId, ScheduleId, TrainId};
use chrono::{NaiveDate, NaiveTime};
use railway_core::Document;
use serde::{Deserialize, Serialize};

/// A booking of seats on one schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Identity.
    pub id: ReservationId,
    /// Traveler holding the reservation.
    pub traveler_id: Nic,
    /// Train booked.
    pub train_id: TrainId,
    /// Schedule booked.
    pub schedule_id: ScheduleId,
    /// Seats held.
    pub seats: u32,
    /// Day the reservation was made.
    pub booking_date: NaiveDate,
    /// Travel date (snapshot).
    pub reservation_date: NaiveDate,
    /// Departure time (snapshot).
    pub departure_time: NaiveTime,
    /// Arrival time (snapshot).
    pub arrival_time: NaiveTime,
    /// Cancelled reservations hold no seats.
    pub is_cancelled: bool,
    /// Set when a booking was rolled back before it ever held seats.
    #[serde(default)]
    pub is_voided: bool,
}

impl Document for Reservation {
    const COLLECTION: &'static str = "reservations";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Reservation {
    /// New live reservation snapshotting the schedule's date and times.
    #[must_use]
    pub fn book(
        traveler_id: Nic,
        schedule: &Schedule,
        seats: u32,
        booking_date: NaiveDate,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            traveler_id,
            train_id: schedule.train_id,
            schedule_id: schedule.id,
            seats,
            booking_date,
            reservation_date: schedule.date,
            departure_time: schedule.departure_time,
            arrival_time: schedule.arrival_time,
            is_cancelled: false,
            is_voided: false,
        }
    }

    /// Whether the reservation holds seats.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        !self.is_cancelled
    }

    /// Whether the snapshotted departure is still ahead of `now`.
    #[must_use]
    pub fn is_upcoming(&self, now: &Moment) -> bool {
        now.is_before_departure(self.reservation_date, self.departure_time)
    }

    /// Mark as never having held seats.
    pub fn void(&mut self) {
        self.is_cancelled = true;
        self.is_voided = true;
    }
}
