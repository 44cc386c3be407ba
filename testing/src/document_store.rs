//! In-memory document store for fast, deterministic testing.
//!
//! [`InMemoryDocumentStore`] honours the full [`DocumentStore`] contract
//! (versions, compare-and-swap, containment criteria) and adds hooks that a
//! real database does not offer:
//!
//! - [`InMemoryDocumentStore::fail_next`]: make the next N writes of a kind fail
//!   with a `Database` error, simulating a crash between two steps of a
//!   multi-record operation
//! - [`InMemoryDocumentStore::conflict_next`]: make the next N replaces fail with
//!   a `VersionConflict`, simulating a concurrent writer winning the race
//! - [`InMemoryDocumentStore::put`]: overwrite a document without any checks, to
//!   seed drifted state for reconciliation tests
//!
//! Documents are kept in their serialized JSON form so that criteria are
//! evaluated exactly as the `PostgreSQL` store evaluates them.

use railway_core::document::{
    Criteria, Document, DocumentStore, StoreError, StoreFuture, Version, Versioned,
};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Kind of write operation, for fault injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriteKind {
    /// [`DocumentStore::insert`]
    Insert,
    /// [`DocumentStore::replace`]
    Replace,
    /// [`DocumentStore::delete`]
    Delete,
}

#[derive(Debug, Default)]
struct Faults {
    failures: HashMap<WriteKind, usize>,
    conflicts: usize,
}

impl Faults {
    fn take_failure(&mut self, kind: WriteKind) -> bool {
        match self.failures.get_mut(&kind) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn take_conflict(&mut self) -> bool {
        if self.conflicts > 0 {
            self.conflicts -= 1;
            true
        } else {
            false
        }
    }
}

/// `HashMap`-backed [`DocumentStore`] with fault injection.
///
/// Clones share the same underlying data.
///
/// # Example
///
/// ```
/// use railway_testing::InMemoryDocumentStore;
/// use railway_core::document::{Document, DocumentStore, Version};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, Serialize, Deserialize)]
/// struct Note { id: String, text: String }
///
/// impl Document for Note {
///     const COLLECTION: &'static str = "notes";
///     fn key(&self) -> String { self.id.clone() }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDocumentStore::<Note>::new();
/// let version = store.insert(Note { id: "n1".into(), text: "hi".into() }).await?;
/// assert_eq!(version, Version::FIRST);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryDocumentStore<T> {
    records: Arc<RwLock<HashMap<String, (Value, Version)>>>,
    faults: Arc<Mutex<Faults>>,
    _document: PhantomData<fn() -> T>,
}

impl<T> Clone for InMemoryDocumentStore<T> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            faults: Arc::clone(&self.faults),
            _document: PhantomData,
        }
    }
}

impl<T: Document> Default for InMemoryDocumentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> InMemoryDocumentStore<T> {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(Mutex::new(Faults::default())),
            _document: PhantomData,
        }
    }

    /// Make the next `count` writes of `kind` fail with a database error.
    ///
    /// The failing write changes nothing.
    pub fn fail_next(&self, kind: WriteKind, count: usize) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        *faults.failures.entry(kind).or_default() += count;
    }

    /// Make the next `count` replaces fail with a version conflict.
    ///
    /// The stored document is left untouched, so a retry that re-reads will
    /// succeed once the injected conflicts are used up.
    pub fn conflict_next(&self, count: usize) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.conflicts += count;
    }

    /// Overwrite (or create) a document without any version check.
    ///
    /// The stored version is still bumped so that in-flight readers notice.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the document cannot be encoded.
    pub fn put(&self, document: &T) -> Result<Version, StoreError> {
        let value = serde_json::to_value(document)?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let version = records
            .get(&document.key())
            .map_or(Version::FIRST, |(_, version)| version.next());
        records.insert(document.key(), (value, version));
        Ok(version)
    }

    /// Remove a document without any version check.
    pub fn remove(&self, key: &str) -> bool {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Read a document synchronously.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the stored document cannot be decoded.
    pub fn get(&self, key: &str) -> Result<Option<T>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(key)
            .map(|(value, _)| serde_json::from_value(value.clone()).map_err(StoreError::from))
            .transpose()
    }

    /// Every stored document, in unspecified order.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if a stored document cannot be decoded.
    pub fn documents(&self) -> Result<Vec<T>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .values()
            .map(|(value, _)| serde_json::from_value(value.clone()).map_err(StoreError::from))
            .collect()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn injected_failure(&self, kind: WriteKind) -> Option<StoreError> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        if faults.take_failure(kind) {
            tracing::debug!(collection = T::COLLECTION, ?kind, "Injected write failure");
            Some(StoreError::Database(format!(
                "injected {kind:?} failure on {}",
                T::COLLECTION
            )))
        } else {
            None
        }
    }

    fn injected_conflict(&self) -> bool {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_conflict()
    }

    fn find_now(&self, key: &str) -> Result<Option<Versioned<T>>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(key)
            .map(|(value, version)| {
                serde_json::from_value(value.clone())
                    .map(|document| Versioned::new(document, *version))
                    .map_err(StoreError::from)
            })
            .transpose()
    }

    fn find_matching_now(&self, criteria: &Criteria) -> Result<Vec<Versioned<T>>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .values()
            .filter(|(value, _)| criteria.matches(value))
            .map(|(value, version)| {
                serde_json::from_value(value.clone())
                    .map(|document| Versioned::new(document, *version))
                    .map_err(StoreError::from)
            })
            .collect()
    }

    fn insert_now(&self, document: &T) -> Result<Version, StoreError> {
        if let Some(error) = self.injected_failure(WriteKind::Insert) {
            return Err(error);
        }
        let key = document.key();
        let value = serde_json::to_value(document)?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                collection: T::COLLECTION,
                key,
            });
        }
        records.insert(key, (value, Version::FIRST));
        Ok(Version::FIRST)
    }

    fn replace_now(&self, document: &T, expected: Version) -> Result<Version, StoreError> {
        if let Some(error) = self.injected_failure(WriteKind::Replace) {
            return Err(error);
        }
        let key = document.key();
        let value = serde_json::to_value(document)?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let Some((stored, actual)) = records.get_mut(&key) else {
            return Err(StoreError::NotFound {
                collection: T::COLLECTION,
                key,
            });
        };
        if *actual != expected || self.injected_conflict() {
            return Err(StoreError::VersionConflict {
                collection: T::COLLECTION,
                key,
                expected,
                actual: *actual,
            });
        }
        *stored = value;
        *actual = actual.next();
        Ok(*actual)
    }

    fn delete_now(&self, key: &str, expected: Version) -> Result<(), StoreError> {
        if let Some(error) = self.injected_failure(WriteKind::Delete) {
            return Err(error);
        }
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get(key) {
            None => Err(StoreError::NotFound {
                collection: T::COLLECTION,
                key: key.to_string(),
            }),
            Some((_, actual)) if *actual != expected => Err(StoreError::VersionConflict {
                collection: T::COLLECTION,
                key: key.to_string(),
                expected,
                actual: *actual,
            }),
            Some(_) => {
                records.remove(key);
                Ok(())
            }
        }
    }
}

impl<T: Document> DocumentStore<T> for InMemoryDocumentStore<T> {
    fn find(&self, key: &str) -> StoreFuture<'_, Option<Versioned<T>>> {
        let result = self.find_now(key);
        Box::pin(async move { result })
    }

    fn find_matching(&self, criteria: Criteria) -> StoreFuture<'_, Vec<Versioned<T>>> {
        let result = self.find_matching_now(&criteria);
        Box::pin(async move { result })
    }

    fn insert(&self, document: T) -> StoreFuture<'_, Version> {
        let result = self.insert_now(&document);
        Box::pin(async move { result })
    }

    fn replace(&self, document: T, expected: Version) -> StoreFuture<'_, Version> {
        let result = self.replace_now(&document, expected);
        Box::pin(async move { result })
    }

    fn delete(&self, key: &str, expected: Version) -> StoreFuture<'_, ()> {
        let result = self.delete_now(key, expected);
        Box::pin(async move { result })
    }
}
