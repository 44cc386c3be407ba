//! Traveler registry.

use crate::aggregates::{NewTraveler, Reservation, Traveler};
use crate::environment::{BookingEnvironment, load, modify, observe, query};
use crate::error::BookingError;
use crate::types::Nic;
use railway_core::Criteria;
use serde::Serialize;
use tracing::{info, instrument};

/// A traveler with their upcoming live reservations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TravelerProfile {
    /// The traveler.
    pub traveler: Traveler,
    /// Live reservations not yet departed, soonest first.
    pub upcoming: Vec<Reservation>,
}

/// Traveler commands and queries.
#[derive(Clone)]
pub struct TravelerService {
    env: BookingEnvironment,
}

impl TravelerService {
    /// Create the service.
    #[must_use]
    pub const fn new(env: BookingEnvironment) -> Self {
        Self { env }
    }

    /// Register a traveler under their NIC.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on a blank NIC or name, `Conflict(AlreadyExists)` if the
    /// NIC is taken.
    #[instrument(skip(self, new), fields(nic = %new.nic))]
    pub async fn register(&self, new: NewTraveler) -> Result<Traveler, BookingError> {
        let result = async {
            let traveler = Traveler::register(new)?;
            self.env.travelers.insert(traveler.clone()).await?;
            Ok::<_, BookingError>(traveler)
        }
        .await;
        observe("register_traveler", &result);
        if let Ok(traveler) = &result {
            info!(nic = %traveler.nic, "Traveler registered");
        }
        result
    }

    /// Activate or deactivate a traveler. Inactive travelers cannot book.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown traveler.
    #[instrument(skip(self))]
    pub async fn set_active(&self, nic: &str, active: bool) -> Result<Traveler, BookingError> {
        let result = async {
            let nic = Nic::parse(nic).map_err(BookingError::InvalidInput)?;
            let (traveler, ()) = modify(
                &*self.env.travelers,
                nic.as_str(),
                &self.env.retry,
                |traveler: &mut Traveler| {
                    traveler.is_active = active;
                    Ok(())
                },
            )
            .await?;
            Ok::<_, BookingError>(traveler)
        }
        .await;
        observe("set_traveler_active", &result);
        if let Ok(traveler) = &result {
            info!(nic = %traveler.nic, active, "Traveler status changed");
        }
        result
    }

    /// A traveler and their upcoming live reservations.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown traveler.
    #[instrument(skip(self))]
    pub async fn get_traveler(&self, nic: &str) -> Result<TravelerProfile, BookingError> {
        let nic = Nic::parse(nic).map_err(BookingError::InvalidInput)?;
        let traveler = load(&*self.env.travelers, nic.as_str()).await?.document;

        let now = self.env.now();
        let mut upcoming: Vec<Reservation> = query(
            &*self.env.reservations,
            Criteria::new()
                .eq("traveler_id", nic.as_str())
                .eq("is_cancelled", false),
        )
        .await?
        .into_iter()
        .filter(|reservation| reservation.is_upcoming(&now))
        .collect();
        upcoming.sort_by_key(|reservation| {
            (reservation.reservation_date, reservation.departure_time)
        });

        Ok(TravelerProfile { traveler, upcoming })
    }

    /// All travelers, optionally filtered by activity, ordered by NIC.
    ///
    /// # Errors
    ///
    /// `Internal` on storage failure.
    #[instrument(skip(self))]
    pub async fn list_travelers(
        &self,
        active: Option<bool>,
    ) -> Result<Vec<Traveler>, BookingError> {
        let criteria = match active {
            Some(active) => Criteria::new().eq("is_active", active),
            None => Criteria::new(),
        };
        let mut travelers = query(&*self.env.travelers, criteria).await?;
        travelers.sort_by(|a, b| a.nic.cmp(&b.nic));
        Ok(travelers)
    }
}
