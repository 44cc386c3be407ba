//! # Railway Testing
//!
//! Testing utilities for the railway booking core.
//!
//! This crate provides:
//! - Deterministic [`Clock`] implementations ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryDocumentStore`]: a `HashMap`-backed document store with fault injection
//!
//! ## Example
//!
//! ```ignore
//! use railway_testing::{test_clock, InMemoryDocumentStore};
//!
//! #[tokio::test]
//! async fn booking_flow() {
//!     let app = RailwayApp::in_memory(&Config::default(), Arc::new(test_clock()));
//!     let train = app.catalog().create_train(new_train()).await.unwrap();
//!     assert!(train.schedule_ids.is_empty());
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use railway_core::environment::Clock;

pub mod document_store;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::{Arc, PoisonError, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use railway_testing::mocks::FixedClock;
    /// use railway_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when the test moves it.
    ///
    /// Clones share the same instant, so a test can hand one clone to the
    /// application and keep another to advance time across a booking window.
    ///
    /// # Example
    ///
    /// ```
    /// use railway_testing::mocks::ManualClock;
    /// use railway_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let start = clock.now();
    /// clock.advance(Duration::days(2));
    /// assert_eq!(clock.now() - start, Duration::days(2));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a manual clock starting at the given time.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Jump to the given time.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move the clock forward (or backward, for a negative duration).
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2026-10-16 08:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2026-10-16T08:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use document_store::{InMemoryDocumentStore, WriteKind};
pub use mocks::{FixedClock, ManualClock, test_clock};
