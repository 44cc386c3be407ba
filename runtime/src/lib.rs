//! # Railway Runtime
//!
//! Execution plumbing shared by the railway booking services.
//!
//! ## Components
//!
//! - **[`retry`]**: exponential backoff, used to re-run a read-check-write
//!   sequence after an optimistic concurrency conflict
//! - **[`metrics`]**: Prometheus metric descriptions and small recorder helpers
//!
//! ## Example
//!
//! ```rust
//! use railway_runtime::retry::{RetryPolicy, retry_with_predicate};
//!
//! # async fn example() -> Result<(), String> {
//! let seats = retry_with_predicate(
//!     RetryPolicy::default(),
//!     || async { Ok::<_, String>(47) },
//!     |err: &String| err.contains("version conflict"),
//! )
//! .await?;
//! assert_eq!(seats, 47);
//! # Ok(())
//! # }
//! ```

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;
