//! # Railway Core
//!
//! Ports shared by every layer of the railway booking workspace.
//!
//! The booking core never talks to a database or the system clock directly.
//! It is handed implementations of two small abstractions:
//!
//! - **[`environment::Clock`]**: the current instant, injectable for deterministic tests
//! - **[`document::DocumentStore`]**: a per-entity collection with find, filter,
//!   insert, compare-and-swap replace and compare-and-swap delete
//!
//! The store deliberately offers no multi-record transaction. Each write commits
//! on its own, and every record carries a [`document::Version`] so concurrent
//! writers are detected instead of silently overwriting each other.
//!
//! ## Implementations
//!
//! - `InMemoryDocumentStore` (in `railway-testing`): fast, deterministic, fault-injectable
//! - `PostgresDocumentStore` (in `railway-postgres`): JSONB collections with a version column
//!
//! ## Example
//!
//! ```ignore
//! use railway_core::document::{Criteria, DocumentStore};
//!
//! async fn published<S: DocumentStore<Train>>(store: &S) -> Result<Vec<Train>, StoreError> {
//!     let rows = store
//!         .find_matching(Criteria::new().eq("status", "published"))
//!         .await?;
//!     Ok(rows.into_iter().map(|row| row.document).collect())
//! }
//! ```

pub mod document;

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
pub use document::{Criteria, Document, DocumentStore, StoreError, StoreFuture, Version, Versioned};

/// Environment module - Dependency injection traits
///
/// External dependencies of the booking core are abstracted behind traits and
/// injected by the application wiring. Only time lives here; storage has its
/// own module.
pub mod environment {
    use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use railway_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.today() >= before.date_naive());
    /// ```
    ///
    /// Tests use `FixedClock` or `ManualClock` from `railway-testing` instead.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Calendar date of the current instant.
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }

        /// Time of day of the current instant.
        fn time_of_day(&self) -> NaiveTime {
            self.now().time()
        }
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_components_agree() {
        let clock = SystemClock;
        let now = clock.now();
        assert!(clock.today() >= now.date_naive());
    }
}
