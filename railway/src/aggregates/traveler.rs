//! Traveler entity, keyed by NIC.

use crate::error::BookingError;
use crate::types::{Nic, ReservationId};
use railway_core::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fields accepted by `RegisterTraveler`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTraveler {
    /// National identity card number, any case.
    pub nic: String,
    /// Full name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone number.
    pub contact_no: String,
}

/// A traveler and the live reservations they hold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traveler {
    /// Natural key.
    pub nic: Nic,
    /// Full name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone number.
    pub contact_no: String,
    /// Inactive travelers cannot book.
    pub is_active: bool,
    /// Live reservations only; cancelled ones are dropped from this set.
    pub reservation_ids: BTreeSet<ReservationId>,
}

impl Document for Traveler {
    const COLLECTION: &'static str = "travelers";

    fn key(&self) -> String {
        self.nic.as_str().to_string()
    }
}

impl Traveler {
    /// Validate and build an active traveler with no reservations.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on a blank or malformed NIC, or a blank name.
    pub fn register(new: NewTraveler) -> Result<Self, BookingError> {
        let nic = Nic::parse(&new.nic).map_err(BookingError::InvalidInput)?;
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(BookingError::invalid("Traveler name must not be empty"));
        }

        Ok(Self {
            nic,
            name,
            email: new.email.trim().to_string(),
            contact_no: new.contact_no.trim().to_string(),
            is_active: true,
            reservation_ids: BTreeSet::new(),
        })
    }
}
