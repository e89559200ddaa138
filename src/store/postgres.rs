use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, Row, Transaction};

use crate::store::traits::{Document, Store, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS records (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        body JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (collection, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS record_keys (
        collection TEXT NOT NULL,
        key_name TEXT NOT NULL,
        key_value TEXT NOT NULL,
        record_id TEXT NOT NULL,
        PRIMARY KEY (collection, key_name, key_value),
        FOREIGN KEY (collection, record_id) REFERENCES records (collection, id) ON DELETE CASCADE
    )
    "#,
];

/// Durable store: one JSONB document table plus a side table that enforces
/// secondary unique keys.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create the document tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .context("Failed to create record tables")?;
        }
        log::info!("Record tables ready");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn backend(err: sqlx::Error, context: &'static str) -> StoreError {
    StoreError::Backend(anyhow::Error::new(err).context(context))
}

async fn write_keys(tx: &mut Transaction<'_, Postgres>, document: &Document) -> Result<(), StoreError> {
    for (key, value) in &document.unique_keys {
        let inserted = sqlx::query(
            "INSERT INTO record_keys (collection, key_name, key_value, record_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(document.collection)
        .bind(*key)
        .bind(value)
        .bind(&document.id)
        .execute(&mut **tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(document.duplicate(*key, value.clone())),
            Err(e) => return Err(backend(e, "Failed to write record keys")),
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    async fn insert_document(&self, document: Document) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| backend(e, "Failed to begin transaction"))?;

        let result = sqlx::query(
            r#"
            INSERT INTO records (collection, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO NOTHING
            "#,
        )
        .bind(document.collection)
        .bind(&document.id)
        .bind(Json(&document.body))
        .execute(&mut *tx)
        .await
        .map_err(|e| backend(e, "Failed to insert record"))?;

        if result.rows_affected() == 0 {
            return Err(document.duplicate("id", document.id.clone()));
        }
        write_keys(&mut tx, &document).await?;

        tx.commit()
            .await
            .map_err(|e| backend(e, "Failed to commit record insert"))?;
        Ok(())
    }

    async fn fetch_document(&self, collection: &'static str, id: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT body FROM records WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend(e, "Failed to fetch record"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let body: Json<Value> = row
            .try_get("body")
            .map_err(|e| backend(e, "Failed to read record body"))?;
        Ok(Some(body.0))
    }

    async fn scan_collection(&self, collection: &'static str) -> Result<Vec<Value>, StoreError> {
        let rows = sqlx::query("SELECT body FROM records WHERE collection = $1 ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend(e, "Failed to list records"))?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<Json<Value>, _>("body")
                    .map(|body| body.0)
                    .map_err(|e| backend(e, "Failed to read record body"))
            })
            .collect()
    }

    async fn replace_document(&self, document: Document) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| backend(e, "Failed to begin transaction"))?;

        let result = sqlx::query(
            r#"
            UPDATE records SET body = $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(document.collection)
        .bind(&document.id)
        .bind(Json(&document.body))
        .execute(&mut *tx)
        .await
        .map_err(|e| backend(e, "Failed to update record"))?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM record_keys WHERE collection = $1 AND record_id = $2")
            .bind(document.collection)
            .bind(&document.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend(e, "Failed to clear record keys"))?;
        write_keys(&mut tx, &document).await?;

        tx.commit()
            .await
            .map_err(|e| backend(e, "Failed to commit record update"))?;
        Ok(true)
    }

    async fn remove_document(&self, collection: &'static str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM records WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(e, "Failed to delete record"))?;

        Ok(result.rows_affected() > 0)
    }
}
