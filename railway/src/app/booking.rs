//! Booking engine: reservations and the seats they hold.
//!
//! # Write order
//!
//! ```text
//! create:  reservation (insert)   → schedule (take seats)    → traveler (add id)
//! update:  reservation (seats)    → schedule (move delta)
//! cancel:  reservation (cancel)   → schedule (return seats)  → traveler (drop id)
//! ```
//!
//! The reservation is written first because it is the source of truth for
//! seat counts. When a later step is refused, earlier steps are undone in
//! reverse order. If an undo fails as well, the reconciliation pass
//! recomputes schedule and traveler state from the reservations.

use crate::aggregates::{Reservation, Schedule, Traveler};
use crate::environment::{BookingEnvironment, load, modify, observe, query};
use crate::error::{BookingError, ConflictReason};
use crate::policy::Moment;
use crate::types::{Nic, ReservationId, ScheduleId};
use railway_core::{Criteria, Document};
use railway_runtime::metrics::BookingMetrics;
use serde::Serialize;
use std::cmp::Reverse;
use tracing::{error, info, instrument};

/// A traveler's reservations split around the current moment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TravelerReservations {
    /// Not yet departed, soonest first.
    pub upcoming: Vec<Reservation>,
    /// Departed, most recent first.
    pub past: Vec<Reservation>,
}

/// Reservation commands and queries.
#[derive(Clone)]
pub struct BookingService {
    env: BookingEnvironment,
}

impl BookingService {
    /// Create the service.
    #[must_use]
    pub const fn new(env: BookingEnvironment) -> Self {
        Self { env }
    }

    /// Book `seats` seats on a schedule for a traveler.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the traveler or schedule does not exist
    /// - `Conflict(TravelerInactive)` if the traveler is deactivated
    /// - `Conflict(ScheduleDeparted)` if the schedule has passed
    /// - `InvalidInput` beyond the booking horizon
    /// - `Conflict(InsufficientSeats)` if more seats are asked than are left
    /// - `InvalidInput` outside `1..=max_seats`
    #[instrument(skip(self))]
    pub async fn create_reservation(
        &self,
        traveler: &str,
        schedule_id: ScheduleId,
        seats: u32,
    ) -> Result<Reservation, BookingError> {
        let result = self.book(traveler, schedule_id, seats).await;
        observe("create_reservation", &result);
        result
    }

    async fn book(
        &self,
        traveler: &str,
        schedule_id: ScheduleId,
        seats: u32,
    ) -> Result<Reservation, BookingError> {
        let env = &self.env;
        let nic = Nic::parse(traveler).map_err(BookingError::InvalidInput)?;
        let traveler = load(&*env.travelers, nic.as_str()).await?.document;
        let schedule = load(&*env.schedules, &schedule_id.to_string())
            .await?
            .document;
        if !traveler.is_active {
            return Err(BookingError::conflict(ConflictReason::TravelerInactive));
        }
        let now = env.now();
        if !schedule.is_upcoming(&now) {
            return Err(BookingError::conflict(ConflictReason::ScheduleDeparted));
        }
        env.policy.check_booking_horizon(schedule.date, &now)?;
        // Checked before the per-reservation limit
        if seats > schedule.available_seats {
            return Err(BookingError::conflict(ConflictReason::InsufficientSeats {
                requested: seats,
                available: schedule.available_seats,
            }));
        }
        env.policy.check_seat_count(seats)?;

        let reservation = Reservation::book(nic, &schedule, seats, now.date);
        env.reservations.insert(reservation.clone()).await?;

        let allocated = modify(
            &*env.schedules,
            &schedule.key(),
            &env.retry,
            |current: &mut Schedule| {
                if !current.is_upcoming(&now) {
                    return Err(BookingError::conflict(ConflictReason::ScheduleDeparted));
                }
                current.allocate(reservation.id, seats)
            },
        )
        .await;
        if let Err(failure) = allocated {
            self.void(&reservation).await;
            return Err(failure);
        }

        let attached = modify(
            &*env.travelers,
            &traveler.key(),
            &env.retry,
            |current: &mut Traveler| {
                current.reservation_ids.insert(reservation.id);
                Ok(())
            },
        )
        .await;
        if let Err(failure) = attached {
            self.release(&reservation).await;
            self.void(&reservation).await;
            return Err(failure);
        }

        BookingMetrics::record_created(seats);
        info!(
            reservation_id = %reservation.id,
            schedule_id = %schedule_id,
            traveler = %reservation.traveler_id,
            seats,
            "Reservation created"
        );
        Ok(reservation)
    }

    /// Change the seat count of a live reservation.
    ///
    /// Asking for the current seat count succeeds without writing.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the reservation does not exist
    /// - `Conflict(AlreadyCancelled)` if it was cancelled
    /// - `Conflict(ScheduleDeparted)` or `Conflict(ModificationWindowClosed)`
    ///   when it is too late to change
    /// - `InvalidInput` outside `1..=max_seats`
    /// - `Conflict(InsufficientSeats)` if an increase does not fit
    #[instrument(skip(self))]
    pub async fn update_reservation_seats(
        &self,
        reservation_id: ReservationId,
        seats: u32,
    ) -> Result<Reservation, BookingError> {
        let result = self.resize(reservation_id, seats).await;
        observe("update_reservation_seats", &result);
        result
    }

    async fn resize(
        &self,
        reservation_id: ReservationId,
        seats: u32,
    ) -> Result<Reservation, BookingError> {
        let env = &self.env;
        let key = reservation_id.to_string();
        let current = self.live_reservation(&key).await?;
        let now = env.now();
        self.check_modifiable(&current, &now)?;
        env.policy.check_seat_count(seats)?;
        if seats == current.seats {
            return Ok(current);
        }
        if seats > current.seats {
            let schedule = load(&*env.schedules, &current.schedule_id.to_string())
                .await?
                .document;
            let extra = seats - current.seats;
            if extra > schedule.available_seats {
                return Err(BookingError::conflict(ConflictReason::InsufficientSeats {
                    requested: extra,
                    available: schedule.available_seats,
                }));
            }
        }

        let (reservation, previous) = modify(
            &*env.reservations,
            &key,
            &env.retry,
            |current: &mut Reservation| {
                self.check_modifiable(current, &now)?;
                let previous = current.seats;
                current.seats = seats;
                Ok(previous)
            },
        )
        .await?;

        let moved = modify(
            &*env.schedules,
            &reservation.schedule_id.to_string(),
            &env.retry,
            |schedule: &mut Schedule| schedule.resize(reservation.id, seats),
        )
        .await;
        if let Err(failure) = moved {
            let restored = modify(
                &*env.reservations,
                &key,
                &env.retry,
                |current: &mut Reservation| {
                    if current.seats == seats {
                        current.seats = previous;
                    }
                    Ok(())
                },
            )
            .await;
            if let Err(undo) = restored {
                error!(
                    reservation_id = %reservation_id,
                    error = %undo,
                    "Could not restore seat count, reconciliation required"
                );
            }
            return Err(failure);
        }

        BookingMetrics::record_updated();
        info!(
            reservation_id = %reservation_id,
            from = previous,
            to = seats,
            "Reservation seats updated"
        );
        Ok(reservation)
    }

    /// Cancel a reservation and return its seats. The record is kept.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the reservation does not exist
    /// - `Conflict(AlreadyCancelled)` on a second cancellation
    /// - `Conflict(ScheduleDeparted)` or `Conflict(ModificationWindowClosed)`
    ///   when it is too late to cancel
    #[instrument(skip(self))]
    pub async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, BookingError> {
        let result = self.cancel(reservation_id).await;
        observe("cancel_reservation", &result);
        result
    }

    async fn cancel(&self, reservation_id: ReservationId) -> Result<Reservation, BookingError> {
        let env = &self.env;
        let key = reservation_id.to_string();
        let current = self.live_reservation(&key).await?;
        let now = env.now();
        self.check_modifiable(&current, &now)?;

        let (reservation, ()) = modify(
            &*env.reservations,
            &key,
            &env.retry,
            |current: &mut Reservation| {
                self.check_modifiable(current, &now)?;
                current.is_cancelled = true;
                Ok(())
            },
        )
        .await?;

        let released = modify(
            &*env.schedules,
            &reservation.schedule_id.to_string(),
            &env.retry,
            |schedule: &mut Schedule| {
                schedule.release(reservation.id);
                Ok(())
            },
        )
        .await;
        if let Err(failure) = released {
            self.reinstate(&reservation).await;
            return Err(failure);
        }

        let detached = modify(
            &*env.travelers,
            reservation.traveler_id.as_str(),
            &env.retry,
            |traveler: &mut Traveler| {
                traveler.reservation_ids.remove(&reservation.id);
                Ok(())
            },
        )
        .await;
        if let Err(failure) = detached {
            // Only reinstate if the seats could be taken back
            if self.reallocate(&reservation).await {
                self.reinstate(&reservation).await;
            }
            return Err(failure);
        }

        BookingMetrics::record_cancelled();
        info!(
            reservation_id = %reservation_id,
            schedule_id = %reservation.schedule_id,
            seats = reservation.seats,
            "Reservation cancelled"
        );
        Ok(reservation)
    }

    /// One reservation, cancelled or not.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist or was rolled back during creation.
    #[instrument(skip(self))]
    pub async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, BookingError> {
        self.live_reservation(&reservation_id.to_string()).await
    }

    /// A traveler's reservations, split into upcoming and past.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on a malformed NIC, `NotFound` for an unknown traveler.
    #[instrument(skip(self))]
    pub async fn list_traveler_reservations(
        &self,
        traveler: &str,
    ) -> Result<TravelerReservations, BookingError> {
        let nic = Nic::parse(traveler).map_err(BookingError::InvalidInput)?;
        load(&*self.env.travelers, nic.as_str()).await?;

        let reservations: Vec<Reservation> = query(
            &*self.env.reservations,
            Criteria::new().eq("traveler_id", nic.as_str()),
        )
        .await?;
        let now = self.env.now();
        let (mut upcoming, mut past): (Vec<_>, Vec<_>) = reservations
            .into_iter()
            .filter(|reservation| !reservation.is_voided)
            .partition(|reservation| reservation.is_upcoming(&now));
        upcoming.sort_by_key(|reservation| {
            (reservation.reservation_date, reservation.departure_time)
        });
        past.sort_by_key(|reservation| {
            Reverse((reservation.reservation_date, reservation.departure_time))
        });

        Ok(TravelerReservations { upcoming, past })
    }

    /// Reservations on a schedule, optionally only live ones.
    ///
    /// # Errors
    ///
    /// `NotFound` if the schedule does not exist.
    #[instrument(skip(self))]
    pub async fn list_schedule_reservations(
        &self,
        schedule_id: ScheduleId,
        live_only: bool,
    ) -> Result<Vec<Reservation>, BookingError> {
        load(&*self.env.schedules, &schedule_id.to_string()).await?;

        let mut criteria = Criteria::new().eq("schedule_id", schedule_id.to_string());
        if live_only {
            criteria = criteria.eq("is_cancelled", false);
        }
        let mut reservations: Vec<Reservation> = query(&*self.env.reservations, criteria)
            .await?
            .into_iter()
            .filter(|reservation| !reservation.is_voided)
            .collect();
        reservations.sort_by_key(|reservation| (reservation.booking_date, reservation.id));
        Ok(reservations)
    }

    /// Load a reservation, hiding ones voided during creation.
    async fn live_reservation(&self, key: &str) -> Result<Reservation, BookingError> {
        let reservation = load(&*self.env.reservations, key).await?.document;
        if reservation.is_voided {
            return Err(BookingError::not_found("reservation", key));
        }
        Ok(reservation)
    }

    fn check_modifiable(
        &self,
        reservation: &Reservation,
        now: &Moment,
    ) -> Result<(), BookingError> {
        if reservation.is_cancelled {
            return Err(BookingError::conflict(ConflictReason::AlreadyCancelled));
        }
        self.env.policy.check_modification_window(
            reservation.reservation_date,
            reservation.departure_time,
            now,
        )
    }

    /// Undo the reservation insert of a refused booking.
    async fn void(&self, reservation: &Reservation) {
        let undone = modify(
            &*self.env.reservations,
            &reservation.key(),
            &self.env.retry,
            |current: &mut Reservation| {
                current.void();
                Ok(())
            },
        )
        .await;
        if let Err(failure) = undone {
            error!(
                reservation_id = %reservation.id,
                error = %failure,
                "Could not void reservation, reconciliation required"
            );
        }
    }

    /// Undo a seat allocation.
    async fn release(&self, reservation: &Reservation) {
        let undone = modify(
            &*self.env.schedules,
            &reservation.schedule_id.to_string(),
            &self.env.retry,
            |schedule: &mut Schedule| {
                schedule.release(reservation.id);
                Ok(())
            },
        )
        .await;
        if let Err(failure) = undone {
            error!(
                reservation_id = %reservation.id,
                schedule_id = %reservation.schedule_id,
                error = %failure,
                "Could not release seats, reconciliation required"
            );
        }
    }

    /// Undo a seat release. Returns whether the seats were taken back.
    async fn reallocate(&self, reservation: &Reservation) -> bool {
        let undone = modify(
            &*self.env.schedules,
            &reservation.schedule_id.to_string(),
            &self.env.retry,
            |schedule: &mut Schedule| schedule.allocate(reservation.id, reservation.seats),
        )
        .await;
        match undone {
            Ok(_) => true,
            Err(failure) => {
                error!(
                    reservation_id = %reservation.id,
                    schedule_id = %reservation.schedule_id,
                    error = %failure,
                    "Could not take seats back, reconciliation required"
                );
                false
            }
        }
    }

    /// Undo a cancellation.
    async fn reinstate(&self, reservation: &Reservation) {
        let undone = modify(
            &*self.env.reservations,
            &reservation.key(),
            &self.env.retry,
            |current: &mut Reservation| {
                current.is_cancelled = false;
                Ok(())
            },
        )
        .await;
        if let Err(failure) = undone {
            error!(
                reservation_id = %reservation.id,
                error = %failure,
                "Could not reinstate reservation, reconciliation required"
            );
        }
    }
}
