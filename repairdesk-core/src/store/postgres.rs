//! PostgreSQL-backed record store and sequence counter.
//!
//! Records are kept as JSONB documents in a single `records` table keyed by
//! `(kind, id)`. Sequence numbers live in `id_sequences`, one row per kind
//! and day, and are allocated with a single conditional upsert.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::error::{IdError, StoreError};
use crate::ids::{IdKind, SequenceCounter};
use crate::models::{Record, RecordKind};
use crate::store::{Change, RecordStore};

/// Creates a connection pool and brings the schema up to date.
///
/// # Arguments
///
/// * `database_url` - PostgreSQL connection string
/// * `max_connections` - Upper bound for the pool size
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database schema is up to date");

    Ok(pool)
}

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Splits a record into the JSON document stored in `records.data`.
fn to_document(record: &Record) -> Result<Value, StoreError> {
    let mut tagged = serde_json::to_value(record).map_err(|_| StoreError::UnexpectedShape {
        kind: record.kind(),
        id: record.id(),
    })?;
    Ok(tagged
        .get_mut("data")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

fn from_document(kind: RecordKind, id: &str, data: Value) -> Result<Record, StoreError> {
    serde_json::from_value(json!({ "kind": kind, "data": data })).map_err(|_| {
        StoreError::UnexpectedShape {
            kind,
            id: id.to_string(),
        }
    })
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn load_all(&self, kind: RecordKind) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query("SELECT id, data FROM records WHERE kind = $1 ORDER BY id ASC")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let data: Value = row.try_get("data")?;
                from_document(kind, &id, data)
            })
            .collect()
    }

    async fn load_by_id(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StoreError> {
        let data: Option<Value> =
            sqlx::query_scalar("SELECT data FROM records WHERE kind = $1 AND id = $2")
                .bind(kind.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        data.map(|data| from_document(kind, id, data)).transpose()
    }

    async fn commit(&self, changes: Vec<Change>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for change in &changes {
            match change {
                Change::Put(record) => {
                    sqlx::query(
                        r#"
                        INSERT INTO records (kind, id, data, updated_at)
                        VALUES ($1, $2, $3, NOW())
                        ON CONFLICT (kind, id)
                        DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
                        "#,
                    )
                    .bind(record.kind().as_str())
                    .bind(record.id())
                    .bind(to_document(record)?)
                    .execute(&mut *tx)
                    .await?;
                }
                Change::Delete { kind, id } => {
                    sqlx::query("DELETE FROM records WHERE kind = $1 AND id = $2")
                        .bind(kind.as_str())
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        debug!("Committed {} record change(s)", changes.len());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Sequence counter shared by every process connected to the same database.
#[derive(Clone)]
pub struct PgSequenceCounter {
    pool: PgPool,
}

impl PgSequenceCounter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn counter_error(e: sqlx::Error) -> IdError {
    IdError::Counter(e.to_string())
}

#[async_trait]
impl SequenceCounter for PgSequenceCounter {
    async fn next(&self, kind: IdKind, day: NaiveDate, capacity: u32) -> Result<u32, IdError> {
        // The WHERE clause leaves an exhausted row untouched and returns nothing.
        let value: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO id_sequences (kind, day, value)
            VALUES ($1, $2, 1)
            ON CONFLICT (kind, day)
            DO UPDATE SET value = id_sequences.value + 1
            WHERE id_sequences.value < $3
            RETURNING value
            "#,
        )
        .bind(kind.as_str())
        .bind(day)
        .bind(capacity as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(counter_error)?;

        match value {
            Some(value) if value > 0 => Ok(value as u32),
            _ => Err(IdError::SequenceOverflow { kind, day, capacity }),
        }
    }

    async fn current(&self, kind: IdKind, day: NaiveDate) -> Result<u32, IdError> {
        let value: Option<i32> =
            sqlx::query_scalar("SELECT value FROM id_sequences WHERE kind = $1 AND day = $2")
                .bind(kind.as_str())
                .bind(day)
                .fetch_optional(&self.pool)
                .await
                .map_err(counter_error)?;

        Ok(value.unwrap_or(0).max(0) as u32)
    }

    async fn seed(&self, kind: IdKind, day: NaiveDate, value: u32) -> Result<(), IdError> {
        sqlx::query(
            r#"
            INSERT INTO id_sequences (kind, day, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (kind, day)
            DO UPDATE SET value = GREATEST(id_sequences.value, EXCLUDED.value)
            "#,
        )
        .bind(kind.as_str())
        .bind(day)
        .bind(value as i32)
        .execute(&self.pool)
        .await
        .map_err(counter_error)?;

        Ok(())
    }
}
