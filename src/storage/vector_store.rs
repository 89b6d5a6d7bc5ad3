//! Tenant-scoped vector storage.
//!
//! Each project resolves to an ephemeral database name, and each collection
//! within it gets its own vector table (`<database>__<collection>_vectors`).
//! A record's expiry always equals its owning project's expiry, so vectors
//! and their project vanish together. Reads filter expired rows; the
//! time-based index supporting a reaper sweep is created idempotently on
//! first insert.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{StoreError, validate_identifier};

/// One stored chunk: text, embedding, and provenance metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub job_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Collection-scoped vector tables over SQLite.
#[derive(Clone, Debug)]
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert `records` into the project's collection table, creating the
    /// table and its expiry index if absent. Returns the number inserted.
    pub async fn insert_records(
        &self,
        database: &str,
        collection: &str,
        records: &[VectorRecord],
    ) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let table = table_name(database, collection)?;
        self.ensure_table(&table).await?;

        let mut inserted = 0u64;
        for record in records {
            let embedding_json = serde_json::to_string(&record.embedding)?;
            sqlx::query(&format!(
                "INSERT INTO {table} (id, job_id, text, embedding, metadata, created_at, expires_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&record.id)
            .bind(&record.job_id)
            .bind(&record.text)
            .bind(embedding_json)
            .bind(record.metadata.to_string())
            .bind(record.created_at)
            .bind(record.expires_at)
            .execute(&self.pool)
            .await?;
            inserted += 1;
        }

        debug!(%table, inserted, "vector records stored");
        Ok(inserted)
    }

    /// Idempotently create the expiry index for a collection table.
    ///
    /// Safe to call repeatedly; `IF NOT EXISTS` swallows the already-exists
    /// case.
    pub async fn ensure_ttl_index(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<(), StoreError> {
        let table = table_name(database, collection)?;
        self.ensure_table(&table).await
    }

    /// Unexpired records stored for `job_id`, in insertion order.
    pub async fn records_for_job(
        &self,
        database: &str,
        collection: &str,
        job_id: &str,
    ) -> Result<Vec<VectorRecord>, StoreError> {
        let table = table_name(database, collection)?;
        self.ensure_table(&table).await?;

        let rows = sqlx::query(&format!(
            "SELECT id, job_id, text, embedding, metadata, created_at, expires_at
             FROM {table}
             WHERE job_id = ? AND expires_at > ?
             ORDER BY rowid"
        ))
        .bind(job_id)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let embedding_raw: String = row.try_get("embedding")?;
                let metadata_raw: String = row.try_get("metadata")?;
                Ok(VectorRecord {
                    id: row.try_get("id")?,
                    job_id: row.try_get("job_id")?,
                    text: row.try_get("text")?,
                    embedding: serde_json::from_str(&embedding_raw)?,
                    metadata: serde_json::from_str(&metadata_raw).unwrap_or_default(),
                    created_at: row.try_get("created_at")?,
                    expires_at: row.try_get("expires_at")?,
                })
            })
            .collect()
    }

    /// Count of unexpired records for `job_id`.
    pub async fn count_for_job(
        &self,
        database: &str,
        collection: &str,
        job_id: &str,
    ) -> Result<u64, StoreError> {
        let table = table_name(database, collection)?;
        self.ensure_table(&table).await?;

        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS n FROM {table} WHERE job_id = ? AND expires_at > ?"
        ))
        .bind(job_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    /// Physically remove expired records from one collection table.
    pub async fn purge_expired(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<u64, StoreError> {
        let table = table_name(database, collection)?;
        self.ensure_table(&table).await?;

        let outcome = sqlx::query(&format!("DELETE FROM {table} WHERE expires_at <= ?"))
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(outcome.rows_affected())
    }

    async fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_expiry ON {table} (expires_at)"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn table_name(database: &str, collection: &str) -> Result<String, StoreError> {
    let database = validate_identifier(database)?;
    let collection = validate_identifier(collection)?;
    Ok(format!("{database}__{collection}_vectors"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_scoped_and_validated() {
        assert_eq!(
            table_name("proj_db", "docs").unwrap(),
            "proj_db__docs_vectors"
        );
        assert!(table_name("proj db", "docs").is_err());
        assert!(table_name("proj", "docs; --").is_err());
    }
}
