//! Document store backed by a `PostgreSQL` JSONB table.
//!
//! Queries are built at runtime with `sqlx::query` so the crate builds
//! without a live database.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use krd_core::DocumentId;

use crate::store::{DocumentStore, SetMode, StoreError};

/// `SQLSTATE` class 53: insufficient resources.
const INSUFFICIENT_RESOURCES_CLASS: &str = "53";
/// `SQLSTATE` classes 22 (data exception) and 23 (integrity constraint).
const REJECTED_CLASSES: [&str; 2] = ["22", "23"];

/// [`DocumentStore`] over `storefront.document`.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a driver error onto the store's failure classes.
fn classify(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_) => StoreError::Unavailable(error.to_string()),
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|code| code.starts_with(INSUFFICIENT_RESOURCES_CLASS)) =>
        {
            StoreError::ResourceExhausted(db.message().to_owned())
        }
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|code| REJECTED_CLASSES.iter().any(|class| code.starts_with(class))) =>
        {
            StoreError::Rejected(db.message().to_owned())
        }
        _ => StoreError::Database(error.to_string()),
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self))]
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        sqlx::query_scalar::<_, Value>(
            "SELECT body FROM storefront.document WHERE collection = $1 AND key = $2",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    #[instrument(skip(self, document))]
    async fn set(
        &self,
        collection: &str,
        key: &str,
        document: Map<String, Value>,
        mode: SetMode,
    ) -> Result<(), StoreError> {
        let sql = match mode {
            SetMode::Merge => {
                r"
                INSERT INTO storefront.document (collection, key, body)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, key) DO UPDATE
                SET body = storefront.document.body || EXCLUDED.body,
                    updated_at = now()
                "
            }
            SetMode::Replace => {
                r"
                INSERT INTO storefront.document (collection, key, body)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, key) DO UPDATE
                SET body = EXCLUDED.body,
                    updated_at = now()
                "
            }
        };
        sqlx::query(sql)
            .bind(collection)
            .bind(key)
            .bind(Value::Object(document))
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    #[instrument(skip(self, fields))]
    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.document
            SET body = body || $3, updated_at = now()
            WHERE collection = $1 AND key = $2
            ",
        )
        .bind(collection)
        .bind(key)
        .bind(Value::Object(fields))
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_owned(),
                key: key.to_owned(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, document))]
    async fn create(
        &self,
        collection: &str,
        document: Map<String, Value>,
    ) -> Result<DocumentId, StoreError> {
        let key = Uuid::new_v4().simple().to_string();
        sqlx::query("INSERT INTO storefront.document (collection, key, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&key)
            .bind(Value::Object(document))
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(DocumentId::new(key))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }
}
