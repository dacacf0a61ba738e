use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Connection, PgConnection, PgPool};
use tracing::{debug, info};

use super::{merge_json, DocumentStore, PendingCreate, StoreError};

/// `DocumentStore` over a single JSONB table keyed by `(collection, id)`.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the documents table if this database has never seen it.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection  TEXT        NOT NULL,
                id          TEXT        NOT NULL,
                data        JSONB       NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Document store schema ready");
        Ok(())
    }
}

const INSERT_IF_ABSENT: &str = r#"
    INSERT INTO documents (collection, id, data)
    VALUES ($1, $2, $3)
    ON CONFLICT (collection, id) DO NOTHING
"#;

async fn insert_if_absent(
    conn: &mut PgConnection,
    write: &PendingCreate,
) -> Result<u64, sqlx::Error> {
    Ok(sqlx::query(INSERT_IF_ABSENT)
        .bind(&write.collection)
        .bind(&write.id)
        .bind(&write.data)
        .execute(conn)
        .await?
        .rows_affected())
}

fn already_exists(collection: &str, id: &str) -> StoreError {
    StoreError::AlreadyExists {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create(&self, collection: &str, id: &str, data: &Value) -> Result<(), StoreError> {
        let inserted = sqlx::query(INSERT_IF_ABSENT)
            .bind(collection)
            .bind(id)
            .bind(data)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if inserted == 0 {
            return Err(already_exists(collection, id));
        }
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, patch: &Value) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Value> = sqlx::query_scalar(
            "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut document = current.ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        merge_json(&mut document, patch);

        sqlx::query(
            "UPDATE documents SET data = $3, updated_at = now() WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(&document)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let data = sqlx::query_scalar("SELECT data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(data)
    }

    async fn existing_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let found: Vec<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE collection = $1 AND id = ANY($2)")
                .bind(collection)
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;
        Ok(found.into_iter().collect())
    }

    async fn commit_creates(
        &self,
        writes: &[PendingCreate],
    ) -> Result<Vec<Result<(), StoreError>>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(writes.len());

        for write in writes {
            // each row gets a savepoint so a rejected row rolls back alone
            let mut savepoint = Connection::begin(&mut *tx).await?;
            let outcome = match insert_if_absent(&mut *savepoint, write).await {
                Ok(inserted) => {
                    savepoint.commit().await?;
                    if inserted == 0 {
                        Err(already_exists(&write.collection, &write.id))
                    } else {
                        Ok(())
                    }
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    debug!(
                        collection = %write.collection,
                        id = %write.id,
                        error = %e,
                        "Row insert rolled back"
                    );
                    Err(StoreError::Database(e))
                }
            };
            results.push(outcome);
        }

        tx.commit().await?;
        Ok(results)
    }
}
