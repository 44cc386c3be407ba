//! Typed failures of the booking core.
//!
//! Every catalog, booking and traveler operation returns
//! `Result<T, BookingError>`. Rule violations are ordinary, user-facing
//! outcomes; only [`BookingError::Internal`] is an alert.

use railway_core::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Failure of a booking-core operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// A referenced entity does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of entity (`train`, `schedule`, ...).
        resource: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A field is malformed or out of range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A business rule blocks the requested transition.
    #[error("Conflict: {0}")]
    Conflict(ConflictReason),

    /// Unexpected storage failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Business rule that blocked an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Not enough seats left on the schedule.
    #[error("insufficient seats: requested {requested}, available {available}")]
    InsufficientSeats {
        /// Seats asked for.
        requested: u32,
        /// Seats still for sale.
        available: u32,
    },

    /// The schedule has live reservations.
    #[error("schedule has active reservations")]
    ActiveReservations,

    /// The schedule's departure is not in the future.
    #[error("schedule has passed")]
    ScheduleDeparted,

    /// Too close to the travel date to change the reservation.
    #[error("modification window closed: changes require at least {window_days} days notice")]
    ModificationWindowClosed {
        /// Required notice in days.
        window_days: u32,
    },

    /// The train is inactive.
    #[error("train is inactive")]
    TrainInactive,

    /// The traveler account is deactivated.
    #[error("traveler is inactive")]
    TravelerInactive,

    /// The reservation was already cancelled.
    #[error("reservation is already cancelled")]
    AlreadyCancelled,

    /// An entity with the same natural key exists.
    #[error("{resource} already exists: {id}")]
    AlreadyExists {
        /// Kind of entity.
        resource: &'static str,
        /// Conflicting key.
        id: String,
    },

    /// Concurrent writers kept winning until the retry budget ran out.
    #[error("concurrent modification, please retry")]
    ConcurrentModification,
}

impl ConflictReason {
    /// Stable label for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientSeats { .. } => "insufficient_seats",
            Self::ActiveReservations => "active_reservations",
            Self::ScheduleDeparted => "schedule_departed",
            Self::ModificationWindowClosed { .. } => "modification_window_closed",
            Self::TrainInactive => "train_inactive",
            Self::TravelerInactive => "traveler_inactive",
            Self::AlreadyCancelled => "already_cancelled",
            Self::AlreadyExists { .. } => "already_exists",
            Self::ConcurrentModification => "concurrent_modification",
        }
    }
}

/// Coarse category of a [`BookingError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`BookingError::NotFound`].
    NotFound,
    /// See [`BookingError::InvalidInput`].
    InvalidInput,
    /// See [`BookingError::Conflict`].
    Conflict,
    /// See [`BookingError::Internal`].
    Internal,
}

impl BookingError {
    /// Create a `NotFound` error
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Create an `InvalidInput` error
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a `Conflict` error
    #[must_use]
    pub const fn conflict(reason: ConflictReason) -> Self {
        Self::Conflict(reason)
    }

    /// Create an `Internal` error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this failure should page someone.
    #[must_use]
    pub const fn is_alert(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Whether re-reading and retrying can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(ConflictReason::ConcurrentModification))
    }

    /// Label used by the rejection counter.
    #[must_use]
    pub const fn reason_label(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Conflict(reason) => reason.as_str(),
            Self::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { collection, key } => Self::NotFound {
                resource: resource_name(collection),
                id: key,
            },
            StoreError::DuplicateKey { collection, key } => {
                Self::Conflict(ConflictReason::AlreadyExists {
                    resource: resource_name(collection),
                    id: key,
                })
            }
            StoreError::VersionConflict { .. } => {
                Self::Conflict(ConflictReason::ConcurrentModification)
            }
            StoreError::Database(message) | StoreError::Serialization(message) => {
                Self::Internal(message)
            }
        }
    }
}

/// Singular resource name for a collection.
fn resource_name(collection: &'static str) -> &'static str {
    match collection {
        "trains" => "train",
        "schedules" => "schedule",
        "reservations" => "reservation",
        "travelers" => "traveler",
        other => other,
    }
}

/// Success flag plus human-readable message, the shape callers render.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceResponse<T> {
    /// Whether the operation completed.
    pub success: bool,
    /// What happened, or which rule blocked it.
    pub message: String,
    /// Category of the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ServiceResponse<T> {
    /// Build a response from an operation result.
    pub fn from_result(result: Result<T, BookingError>, success_message: &str) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                message: success_message.to_string(),
                error: None,
                data: Some(data),
            },
            Err(error) => Self {
                success: false,
                message: error.to_string(),
                error: Some(error.kind()),
                data: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railway_core::Version;

    #[test]
    fn version_conflict_maps_to_retryable_conflict() {
        let error = BookingError::from(StoreError::VersionConflict {
            collection: "schedules",
            key: "s1".to_string(),
            expected: Version::new(1),
            actual: Version::new(2),
        });
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert!(error.is_retryable());
        assert!(!error.is_alert());
    }

    #[test]
    fn database_failure_is_the_only_alert() {
        let error = BookingError::from(StoreError::Database("connection reset".to_string()));
        assert!(error.is_alert());
        assert!(!BookingError::invalid("seats").is_alert());
        assert!(!BookingError::not_found("train", "t1").is_alert());
        assert!(!BookingError::conflict(ConflictReason::ScheduleDeparted).is_alert());
    }

    #[test]
    fn duplicate_key_names_the_resource() {
        let error = BookingError::from(StoreError::DuplicateKey {
            collection: "travelers",
            key: "991234567V".to_string(),
        });
        assert_eq!(error.to_string(), "Conflict: traveler already exists: 991234567V");
    }

    #[test]
    fn response_carries_message_and_kind() {
        let ok = ServiceResponse::from_result(Ok(3), "Reservation created successfully");
        assert!(ok.success);
        assert_eq!(ok.data, Some(3));

        let failed: ServiceResponse<u32> = ServiceResponse::from_result(
            Err(BookingError::conflict(ConflictReason::InsufficientSeats {
                requested: 48,
                available: 47,
            })),
            "unused",
        );
        assert!(!failed.success);
        assert_eq!(failed.error, Some(ErrorKind::Conflict));
        assert!(failed.message.contains("requested 48, available 47"));
    }
}
