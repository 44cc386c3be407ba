//! `PostgreSQL` document store for the railway booking core.
//!
//! This crate provides a PostgreSQL-based implementation of the
//! `DocumentStore` trait from `railway-core`. Every collection is a table of
//! `(key TEXT, data JSONB, version BIGINT)`:
//!
//! - Filters are evaluated with JSONB containment (`data @> $1`) backed by a GIN index
//! - `replace` and `delete` are compare-and-swap on the `version` column
//! - Inserts never overwrite (`ON CONFLICT DO NOTHING`)
//!
//! # Example
//!
//! ```ignore
//! use railway_postgres::{PostgresDocumentStore, connect, migrate};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/railway", 10).await?;
//!     migrate(&pool).await?;
//!     let trains = PostgresDocumentStore::<Train>::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use railway_core::document::{
    Criteria, Document, DocumentStore, StoreError, StoreFuture, Version, Versioned,
};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::marker::PhantomData;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the connection fails.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// Create the document collection tables if they don't already exist.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
    Ok(())
}

/// JSONB-backed [`DocumentStore`] for one collection.
///
/// The table name is the document's `COLLECTION` constant.
#[derive(Debug)]
pub struct PostgresDocumentStore<T> {
    pool: PgPool,
    _document: PhantomData<fn() -> T>,
}

impl<T> Clone for PostgresDocumentStore<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _document: PhantomData,
        }
    }
}

impl<T: Document> PostgresDocumentStore<T> {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _document: PhantomData,
        }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Version currently stored for `key`, if the row exists.
    async fn current_version(&self, key: &str) -> Result<Option<Version>, StoreError> {
        let query = format!("SELECT version FROM {} WHERE key = $1", T::COLLECTION);

        let row: Option<(i64,)> = sqlx::query_as(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        row.map(|(version,)| from_db_version(version)).transpose()
    }

    /// Explain why a compare-and-swap write touched no row.
    async fn refused_write(&self, key: &str, expected: Version) -> StoreError {
        match self.current_version(key).await {
            Ok(None) => StoreError::NotFound {
                collection: T::COLLECTION,
                key: key.to_string(),
            },
            Ok(Some(actual)) => {
                metrics::counter!("railway_store_version_conflicts_total", "collection" => T::COLLECTION)
                    .increment(1);
                StoreError::VersionConflict {
                    collection: T::COLLECTION,
                    key: key.to_string(),
                    expected,
                    actual,
                }
            }
            Err(error) => error,
        }
    }
}

fn database_error(error: sqlx::Error) -> StoreError {
    StoreError::Database(error.to_string())
}

fn to_db_version(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version.value())
        .map_err(|_| StoreError::Database(format!("Version {version} out of range")))
}

fn from_db_version(version: i64) -> Result<Version, StoreError> {
    u64::try_from(version)
        .map(Version::new)
        .map_err(|_| StoreError::Database(format!("Negative version {version} in database")))
}

fn decode<T: Document>((data, version): (Value, i64)) -> Result<Versioned<T>, StoreError> {
    let document = serde_json::from_value(data)?;
    Ok(Versioned::new(document, from_db_version(version)?))
}

impl<T: Document> DocumentStore<T> for PostgresDocumentStore<T> {
    fn find(&self, key: &str) -> StoreFuture<'_, Option<Versioned<T>>> {
        let key = key.to_string();
        Box::pin(async move {
            let query = format!("SELECT data, version FROM {} WHERE key = $1", T::COLLECTION);

            let row: Option<(Value, i64)> = sqlx::query_as(&query)
                .bind(&key)
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

            row.map(decode).transpose()
        })
    }

    fn find_matching(&self, criteria: Criteria) -> StoreFuture<'_, Vec<Versioned<T>>> {
        Box::pin(async move {
            let query = format!("SELECT data, version FROM {} WHERE data @> $1", T::COLLECTION);

            let rows: Vec<(Value, i64)> = sqlx::query_as(&query)
                .bind(criteria.to_json())
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;

            rows.into_iter().map(decode).collect()
        })
    }

    fn insert(&self, document: T) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let key = document.key();
            let data = serde_json::to_value(&document)?;
            let query = format!(
                "INSERT INTO {} (key, data, version, updated_at)
                 VALUES ($1, $2, $3, now())
                 ON CONFLICT (key) DO NOTHING
                 RETURNING version",
                T::COLLECTION
            );

            let row: Option<(i64,)> = sqlx::query_as(&query)
                .bind(&key)
                .bind(data)
                .bind(to_db_version(Version::FIRST)?)
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

            match row {
                Some((version,)) => {
                    tracing::debug!(collection = T::COLLECTION, key = %key, "Document inserted");
                    from_db_version(version)
                }
                None => Err(StoreError::DuplicateKey {
                    collection: T::COLLECTION,
                    key,
                }),
            }
        })
    }

    fn replace(&self, document: T, expected: Version) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let key = document.key();
            let data = serde_json::to_value(&document)?;
            let query = format!(
                "UPDATE {}
                 SET data = $2, version = version + 1, updated_at = now()
                 WHERE key = $1 AND version = $3
                 RETURNING version",
                T::COLLECTION
            );

            let row: Option<(i64,)> = sqlx::query_as(&query)
                .bind(&key)
                .bind(data)
                .bind(to_db_version(expected)?)
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

            match row {
                Some((version,)) => from_db_version(version),
                None => Err(self.refused_write(&key, expected).await),
            }
        })
    }

    fn delete(&self, key: &str, expected: Version) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let query = format!(
                "DELETE FROM {} WHERE key = $1 AND version = $2",
                T::COLLECTION
            );

            let result = sqlx::query(&query)
                .bind(&key)
                .bind(to_db_version(expected)?)
                .execute(&self.pool)
                .await
                .map_err(database_error)?;

            if result.rows_affected() == 0 {
                return Err(self.refused_write(&key, expected).await);
            }

            tracing::debug!(collection = T::COLLECTION, key = %key, "Document deleted");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conversions() {
        assert_eq!(to_db_version(Version::new(7)), Ok(7));
        assert_eq!(from_db_version(7), Ok(Version::new(7)));
        assert!(from_db_version(-1).is_err());
        assert!(to_db_version(Version::new(u64::MAX)).is_err());
    }
}
