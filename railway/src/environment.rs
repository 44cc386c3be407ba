//! Injected dependencies shared by the catalog, booking and traveler services.
//!
//! Every composite mutation is a sequence of single-document writes. Each
//! write goes through [`modify`]: read the current version, apply a closure
//! that re-checks the business rule against what was read, then
//! compare-and-swap. A version conflict re-runs the whole read-check-write
//! with backoff, so a rule is never evaluated against a stale copy.

use crate::aggregates::{Reservation, Schedule, Train, Traveler};
use crate::error::BookingError;
use crate::policy::{BookingPolicy, Moment};
use railway_core::environment::Clock;
use railway_core::{Criteria, Document, DocumentStore, StoreError, Versioned};
use railway_runtime::metrics::{BookingMetrics, ConsistencyMetrics};
use railway_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::sync::Arc;

/// Stores, clock and policy handed to every service.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Train collection.
    pub trains: Arc<dyn DocumentStore<Train>>,
    /// Schedule collection.
    pub schedules: Arc<dyn DocumentStore<Schedule>>,
    /// Reservation collection.
    pub reservations: Arc<dyn DocumentStore<Reservation>>,
    /// Traveler collection.
    pub travelers: Arc<dyn DocumentStore<Traveler>>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Seat limits and windows.
    pub policy: BookingPolicy,
    /// Backoff for optimistic-concurrency retries.
    pub retry: RetryPolicy,
}

impl BookingEnvironment {
    /// Current date and time of day.
    #[must_use]
    pub fn now(&self) -> Moment {
        Moment::now(self.clock.as_ref())
    }
}

/// Load a document or fail with `NotFound`.
///
/// # Errors
///
/// `NotFound` when absent, `Internal` on storage failure.
pub async fn load<T, S>(store: &S, key: &str) -> Result<Versioned<T>, BookingError>
where
    T: Document,
    S: DocumentStore<T> + ?Sized,
{
    store.find(key).await?.ok_or_else(|| {
        BookingError::from(StoreError::NotFound {
            collection: T::COLLECTION,
            key: key.to_string(),
        })
    })
}

/// Documents matching `criteria`, without their versions.
///
/// # Errors
///
/// `Internal` on storage failure.
pub async fn query<T, S>(store: &S, criteria: Criteria) -> Result<Vec<T>, BookingError>
where
    T: Document,
    S: DocumentStore<T> + ?Sized,
{
    Ok(store
        .find_matching(criteria)
        .await?
        .into_iter()
        .map(|row| row.document)
        .collect())
}

/// Read-check-write one document with compare-and-swap, retrying on
/// version conflicts.
///
/// `change` sees the freshly read document and may refuse by returning an
/// error, in which case nothing is written. Returns the stored document and
/// whatever `change` returned.
///
/// # Errors
///
/// The error returned by `change`, `NotFound` if the document is gone, or
/// `Conflict(ConcurrentModification)` once the retry budget is spent.
pub async fn modify<T, S, R, F>(
    store: &S,
    key: &str,
    retry: &RetryPolicy,
    change: F,
) -> Result<(T, R), BookingError>
where
    T: Document,
    S: DocumentStore<T> + ?Sized,
    F: Fn(&mut T) -> Result<R, BookingError>,
{
    let change = &change;
    retry_with_predicate(
        retry.clone(),
        || async move {
            let (mut document, version) = load(store, key).await?.into_parts();
            let outcome = change(&mut document)?;
            store.replace(document.clone(), version).await?;
            Ok::<_, BookingError>((document, outcome))
        },
        retryable(T::COLLECTION),
    )
    .await
}

/// Retry predicate for optimistic writes to `collection`; counts each retry.
pub fn retryable(collection: &'static str) -> impl Fn(&BookingError) -> bool {
    move |error: &BookingError| {
        let retryable = error.is_retryable();
        if retryable {
            ConsistencyMetrics::record_optimistic_retry(collection);
        }
        retryable
    }
}

/// Log and count the outcome of a command.
///
/// Rule violations are expected and logged at debug; only `Internal` is
/// logged as an error.
pub fn observe<T>(operation: &'static str, result: &Result<T, BookingError>) {
    let Err(error) = result else {
        return;
    };
    if error.is_alert() {
        tracing::error!(operation, error = %error, "Command failed");
    } else {
        tracing::debug!(
            operation,
            reason = error.reason_label(),
            error = %error,
            "Command rejected"
        );
        BookingMetrics::record_rejection(error.reason_label());
    }
}
