//! Schedule entity: one dated departure of a train with its own seat inventory.
//!
//! # Seat accounting
//!
//! ```text
//! available_seats + withheld_seats + Σ live reservation seats == train capacity
//! ```
//!
//! `withheld_seats` is zero unless back-office lowered the seats on sale with
//! `UpdateSchedule`. Only the booking engine moves seats between
//! `available_seats` and reservations.

use crate::error::{BookingError, ConflictReason};
use crate::policy::Moment;
use crate::types::{Capacity, Money, ReservationId, ScheduleId, TrainId};
use chrono::{NaiveDate, NaiveTime};
use railway_core::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fields accepted by `AddSchedule`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSchedule {
    /// Owning train.
    pub train_id: TrainId,
    /// Travel date.
    pub date: NaiveDate,
    /// Departure time of day.
    pub departure_time: NaiveTime,
    /// Arrival time of day.
    pub arrival_time: NaiveTime,
    /// Price per seat.
    pub price: Money,
}

/// Fields accepted by `UpdateSchedule`; `None` leaves the field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    /// New departure time.
    pub departure_time: Option<NaiveTime>,
    /// New arrival time.
    pub arrival_time: Option<NaiveTime>,
    /// New number of seats on sale (signed so negative input can be rejected).
    pub available_seats: Option<i64>,
    /// New price per seat.
    pub price: Option<Money>,
}

impl ScheduleUpdate {
    /// Whether nothing would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.departure_time.is_none()
            && self.arrival_time.is_none()
            && self.available_seats.is_none()
            && self.price.is_none()
    }
}

/// One dated departure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Identity.
    pub id: ScheduleId,
    /// Owning train.
    pub train_id: TrainId,
    /// Travel date.
    pub date: NaiveDate,
    /// Departure time of day.
    pub departure_time: NaiveTime,
    /// Arrival time of day.
    pub arrival_time: NaiveTime,
    /// Seats still for sale.
    pub available_seats: u32,
    /// Seats taken off sale by back-office.
    #[serde(default)]
    pub withheld_seats: u32,
    /// Price per seat.
    pub price: Money,
    /// Seats held by each live reservation on this schedule.
    pub reservation_ids: BTreeMap<ReservationId, u32>,
}

impl Document for Schedule {
    const COLLECTION: &'static str = "schedules";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Shared field checks for creating and editing a schedule.
fn check_times_and_price(
    departure: NaiveTime,
    arrival: NaiveTime,
    price: Money,
) -> Result<(), BookingError> {
    if departure == arrival {
        return Err(BookingError::invalid(
            "Arrival time must differ from departure time",
        ));
    }
    if price.is_zero() {
        return Err(BookingError::invalid("Price must be greater than zero"));
    }
    Ok(())
}

impl Schedule {
    /// Validate and build a schedule with the whole train capacity on sale.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on a zero price, equal departure and arrival times, or a
    /// departure that is not in the future.
    pub fn create(
        new: NewSchedule,
        capacity: Capacity,
        now: &Moment,
    ) -> Result<Self, BookingError> {
        check_times_and_price(new.departure_time, new.arrival_time, new.price)?;
        if !now.is_before_departure(new.date, new.departure_time) {
            return Err(BookingError::invalid(format!(
                "Schedule must be in the future ({} {})",
                new.date, new.departure_time
            )));
        }

        Ok(Self {
            id: ScheduleId::new(),
            train_id: new.train_id,
            date: new.date,
            departure_time: new.departure_time,
            arrival_time: new.arrival_time,
            available_seats: capacity.value(),
            withheld_seats: 0,
            price: new.price,
            reservation_ids: BTreeMap::new(),
        })
    }

    /// Whether the departure is still ahead of `now`.
    #[must_use]
    pub fn is_upcoming(&self, now: &Moment) -> bool {
        now.is_before_departure(self.date, self.departure_time)
    }

    /// Seats that can be sold at most (capacity minus withheld).
    #[must_use]
    pub const fn sellable(&self, capacity: Capacity) -> u32 {
        capacity.value().saturating_sub(self.withheld_seats)
    }

    /// Take seats for a reservation.
    ///
    /// Allocating the same reservation twice is a no-op.
    ///
    /// # Errors
    ///
    /// `Conflict(InsufficientSeats)` when fewer than `seats` remain.
    pub fn allocate(
        &mut self,
        reservation_id: ReservationId,
        seats: u32,
    ) -> Result<(), BookingError> {
        if self.reservation_ids.contains_key(&reservation_id) {
            return Ok(());
        }
        if seats > self.available_seats {
            return Err(BookingError::conflict(ConflictReason::InsufficientSeats {
                requested: seats,
                available: self.available_seats,
            }));
        }
        self.available_seats -= seats;
        self.reservation_ids.insert(reservation_id, seats);
        Ok(())
    }

    /// Return the seats a reservation holds here.
    ///
    /// Releasing a reservation that is not allocated here is a no-op.
    pub fn release(&mut self, reservation_id: ReservationId) {
        if let Some(seats) = self.reservation_ids.remove(&reservation_id) {
            self.available_seats = self.available_seats.saturating_add(seats);
        }
    }

    /// Set the seats held by a reservation to `requested`.
    ///
    /// Only the difference from the recorded allocation moves, so applying
    /// the same size twice is a no-op. A reservation not allocated here is
    /// left for reconciliation to adopt.
    ///
    /// # Errors
    ///
    /// `Conflict(InsufficientSeats)` when an increase exceeds the seats left.
    pub fn resize(
        &mut self,
        reservation_id: ReservationId,
        requested: u32,
    ) -> Result<(), BookingError> {
        let Some(held) = self.reservation_ids.get_mut(&reservation_id) else {
            return Ok(());
        };
        if requested > *held {
            let extra = requested - *held;
            if extra > self.available_seats {
                return Err(BookingError::conflict(ConflictReason::InsufficientSeats {
                    requested: extra,
                    available: self.available_seats,
                }));
            }
            self.available_seats -= extra;
        } else {
            self.available_seats = self.available_seats.saturating_add(*held - requested);
        }
        *held = requested;
        Ok(())
    }

    /// Apply a back-office edit.
    ///
    /// Callers must have verified the schedule has no live reservations.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the requested seats are negative or exceed the
    /// capacity, or when the resulting times or price are invalid.
    pub fn apply_update(
        &mut self,
        update: &ScheduleUpdate,
        capacity: Capacity,
    ) -> Result<(), BookingError> {
        let departure = update.departure_time.unwrap_or(self.departure_time);
        let arrival = update.arrival_time.unwrap_or(self.arrival_time);
        let price = update.price.unwrap_or(self.price);
        check_times_and_price(departure, arrival, price)?;

        let seats = match update.available_seats {
            None => None,
            Some(seats) if seats < 0 => {
                return Err(BookingError::invalid(format!(
                    "Available seats must not be negative (requested: {seats})"
                )));
            }
            Some(seats) => match u32::try_from(seats) {
                Ok(seats) if seats <= capacity.value() => Some(seats),
                _ => {
                    return Err(BookingError::invalid(format!(
                        "Available seats {seats} exceed train capacity {capacity}"
                    )));
                }
            },
        };

        self.departure_time = departure;
        self.arrival_time = arrival;
        self.price = price;
        if let Some(seats) = seats {
            self.available_seats = seats;
            self.withheld_seats = capacity.value() - seats;
        }
        Ok(())
    }
}
