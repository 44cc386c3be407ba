//! Versioned document store abstraction.
//!
//! Every entity of the booking core (train, schedule, reservation, traveler) is
//! persisted as one document in its own collection. The store commits each
//! document write independently; there is no transaction spanning documents.
//!
//! # Optimistic concurrency
//!
//! Each stored document carries a [`Version`]. A successful insert yields
//! version 1, and every successful [`DocumentStore::replace`] increments it.
//! `replace` and [`DocumentStore::delete`] take the version the caller last
//! read; if the stored version moved on in the meantime, the write is refused
//! with [`StoreError::VersionConflict`] and nothing changes. Callers re-read,
//! re-check their business rules, and try again.
//!
//! # Filtering
//!
//! [`Criteria`] expresses JSON containment over a document's serialized form,
//! the same semantics as the `PostgreSQL` `@>` operator:
//!
//! - `{"train_id": "..."}` matches documents whose `train_id` equals the value
//! - `{"available_dates": ["2026-10-17"]}` matches documents whose array contains the element
//!
//! Range predicates are not part of the port; callers narrow the result in
//! memory after an equality/containment fetch.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every store operation.
///
/// The store trait returns `Pin<Box<dyn Future>>` instead of using `async fn`
/// so it stays dyn-compatible (`Arc<dyn DocumentStore<T>>`).
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("Document not found: {collection}/{key}")]
    NotFound {
        /// Collection name.
        collection: &'static str,
        /// Document key.
        key: String,
    },

    /// A document with the same key already exists.
    #[error("Duplicate key: {collection}/{key}")]
    DuplicateKey {
        /// Collection name.
        collection: &'static str,
        /// Document key.
        key: String,
    },

    /// Optimistic concurrency conflict: the stored version is not the one the
    /// caller read.
    #[error("Version conflict on {collection}/{key}: expected version {expected}, found {actual}")]
    VersionConflict {
        /// Collection name.
        collection: &'static str,
        /// Document key.
        key: String,
        /// The version the caller expected.
        expected: Version,
        /// The version actually stored.
        actual: Version,
    },

    /// Backend connection or query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the error is an optimistic concurrency conflict that a
    /// re-read-and-retry can resolve.
    #[must_use]
    pub const fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Document version number for optimistic concurrency control.
///
/// # Examples
///
/// ```
/// use railway_core::document::Version;
///
/// let v1 = Version::FIRST;
/// assert_eq!(v1.next(), Version::new(2));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version assigned to a freshly inserted document.
    pub const FIRST: Self = Self(1);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document together with the version it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    /// The stored document.
    pub document: T,
    /// Version of the document when it was read.
    pub version: Version,
}

impl<T> Versioned<T> {
    /// Pair a document with its version.
    #[must_use]
    pub const fn new(document: T, version: Version) -> Self {
        Self { document, version }
    }

    /// Split into document and version.
    #[must_use]
    pub fn into_parts(self) -> (T, Version) {
        (self.document, self.version)
    }
}

/// A persistable entity.
///
/// The serialized JSON form of the document is what [`Criteria`] match against,
/// so field names used in criteria are the serde field names.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the collection (table) holding documents of this type.
    const COLLECTION: &'static str;

    /// Natural or generated key of this document.
    fn key(&self) -> String;
}

/// JSON containment predicate over a document's serialized form.
///
/// # Examples
///
/// ```
/// use railway_core::document::Criteria;
/// use serde_json::json;
///
/// let criteria = Criteria::new()
///     .eq("departure_station", "colombo")
///     .contains("available_dates", "2026-10-17");
///
/// let train = json!({
///     "departure_station": "colombo",
///     "available_dates": ["2026-10-16", "2026-10-17"],
/// });
/// assert!(criteria.matches(&train));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Criteria(Map<String, Value>);

impl Criteria {
    /// Criteria matching every document.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Require `field` to equal `value`.
    #[must_use]
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    /// Require the array `field` to contain `element`.
    #[must_use]
    pub fn contains(mut self, field: &str, element: impl Into<Value>) -> Self {
        self.0
            .insert(field.to_string(), Value::Array(vec![element.into()]));
        self
    }

    /// Whether no predicate has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The containment pattern as a JSON object (the `@>` right-hand side).
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Evaluate the criteria against a serialized document.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        json_contains(document, &self.to_json())
    }
}

/// JSON containment with `PostgreSQL` `jsonb @>` semantics.
///
/// - Objects: every key of `pattern` must exist in `target` and contain its value
/// - Arrays: every element of `pattern` must be contained by some element of `target`
/// - Scalars: equal
#[must_use]
pub fn json_contains(target: &Value, pattern: &Value) -> bool {
    match (target, pattern) {
        (Value::Object(target), Value::Object(pattern)) => pattern.iter().all(|(key, value)| {
            target
                .get(key)
                .is_some_and(|candidate| json_contains(candidate, value))
        }),
        (Value::Array(target), Value::Array(pattern)) => pattern
            .iter()
            .all(|wanted| target.iter().any(|candidate| json_contains(candidate, wanted))),
        // A scalar pattern matches an array holding it (jsonb special case).
        (Value::Array(target), scalar) if !scalar.is_object() => {
            target.iter().any(|candidate| candidate == scalar)
        }
        (target, pattern) => target == pattern,
    }
}

/// Store for one collection of versioned documents.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be shared across request tasks.
///
/// # Atomicity
///
/// Each call is atomic for the single document it touches and nothing more.
pub trait DocumentStore<T: Document>: Send + Sync {
    /// Load a document by key.
    ///
    /// Returns `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// - `Database`: backend failure
    /// - `Serialization`: stored document could not be decoded
    fn find(&self, key: &str) -> StoreFuture<'_, Option<Versioned<T>>>;

    /// Load every document matching the criteria, in unspecified order.
    ///
    /// # Errors
    ///
    /// - `Database`: backend failure
    /// - `Serialization`: a stored document could not be decoded
    fn find_matching(&self, criteria: Criteria) -> StoreFuture<'_, Vec<Versioned<T>>>;

    /// Insert a new document, returning [`Version::FIRST`].
    ///
    /// # Errors
    ///
    /// - `DuplicateKey`: a document with this key exists
    /// - `Database` / `Serialization`
    fn insert(&self, document: T) -> StoreFuture<'_, Version>;

    /// Replace the whole document if it is still at `expected`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the document no longer exists
    /// - `VersionConflict`: another writer replaced it first
    /// - `Database` / `Serialization`
    fn replace(&self, document: T, expected: Version) -> StoreFuture<'_, Version>;

    /// Delete the document if it is still at `expected`.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the document no longer exists
    /// - `VersionConflict`: another writer replaced it first
    /// - `Database`
    fn delete(&self, key: &str, expected: Version) -> StoreFuture<'_, ()>;
}
