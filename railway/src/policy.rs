//! Time and seat-count rules shared by the catalog and the booking engine.
//!
//! "Future" means `date > today OR (date == today AND departure >= now)`, and
//! every gate in the crate goes through [`Moment::is_before_departure`] so the
//! definition cannot drift between operations. Day arithmetic uses calendar
//! dates only.

use crate::error::{BookingError, ConflictReason};
use chrono::{Days, NaiveDate, NaiveTime};
use railway_core::environment::Clock;
use serde::{Deserialize, Serialize};

/// The current date and time-of-day, read once per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Moment {
    /// Calendar date.
    pub date: NaiveDate,
    /// Time of day.
    pub time: NaiveTime,
}

impl Moment {
    /// Read the current moment from a clock.
    #[must_use]
    pub fn now(clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            date: now.date_naive(),
            time: now.time(),
        }
    }

    /// Whether a departure at `date`/`departure` is still ahead.
    #[must_use]
    pub fn is_before_departure(&self, date: NaiveDate, departure: NaiveTime) -> bool {
        date > self.date || (date == self.date && departure >= self.time)
    }
}

/// Booking limits and windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPolicy {
    /// Maximum seats per reservation.
    pub max_seats: u32,
    /// How many days ahead a schedule may be booked.
    pub horizon_days: u32,
    /// Minimum notice, in days, to update or cancel a reservation.
    pub modification_window_days: u32,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            max_seats: 4,
            horizon_days: 30,
            modification_window_days: 5,
        }
    }
}

impl BookingPolicy {
    /// Seats must be in `1..=max_seats`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when out of range.
    pub fn check_seat_count(&self, seats: u32) -> Result<(), BookingError> {
        if seats == 0 || seats > self.max_seats {
            return Err(BookingError::invalid(format!(
                "Seats must be between 1 and {} (requested: {seats})",
                self.max_seats
            )));
        }
        Ok(())
    }

    /// A schedule can be booked at most `horizon_days` ahead.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `today + horizon < date`.
    pub fn check_booking_horizon(&self, date: NaiveDate, now: &Moment) -> Result<(), BookingError> {
        let within = now
            .date
            .checked_add_days(Days::new(u64::from(self.horizon_days)))
            .is_some_and(|limit| date <= limit);
        if !within {
            return Err(BookingError::invalid(format!(
                "Reservations open {} days before departure ({date} is too far ahead)",
                self.horizon_days
            )));
        }
        Ok(())
    }

    /// A reservation can be changed only while it is in the future and at
    /// least `modification_window_days` ahead.
    ///
    /// Exactly `modification_window_days` ahead is the last permitted day.
    ///
    /// # Errors
    ///
    /// - `Conflict(ScheduleDeparted)` when the departure has passed
    /// - `Conflict(ModificationWindowClosed)` when `today + window > date`
    pub fn check_modification_window(
        &self,
        date: NaiveDate,
        departure: NaiveTime,
        now: &Moment,
    ) -> Result<(), BookingError> {
        if !now.is_before_departure(date, departure) {
            return Err(BookingError::conflict(ConflictReason::ScheduleDeparted));
        }
        let open = now
            .date
            .checked_add_days(Days::new(u64::from(self.modification_window_days)))
            .is_some_and(|earliest| earliest <= date);
        if !open {
            return Err(BookingError::conflict(
                ConflictReason::ModificationWindowClosed {
                    window_days: self.modification_window_days,
                },
            ));
        }
        Ok(())
    }
}
