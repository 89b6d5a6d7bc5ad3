//! Content-addressed, TTL-expiring storage for raw uploaded bytes.
//!
//! Blobs are identified by the SHA-256 of their bytes, computed off the
//! critical path on the bounded CPU pool. Every save physically persists a
//! new row, tagged with the owning job id and an expiry a fixed horizon
//! away; the content hash and per-row reference counter feed the
//! deduplication statistics and the delete path. Expiry is a logical
//! contract — reads filter expired rows even before the reaper removes them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::StoreError;
use crate::workers::CpuPool;

/// Stored blob metadata (without the payload bytes).
#[derive(Clone, Debug, PartialEq)]
pub struct StoredBlob {
    pub content_hash: String,
    pub job_id: String,
    pub size_bytes: u64,
    pub reference_count: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Aggregate statistics for observability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlobStats {
    pub total_files: u64,
    pub total_size_bytes: u64,
    pub total_references: u64,
    /// Share of references served without a distinct file, in `[0, 1]`.
    pub dedup_ratio: f64,
}

/// Deduplication-tracking blob store over SQLite.
#[derive(Clone, Debug)]
pub struct ContentStore {
    pool: SqlitePool,
    cpu: CpuPool,
    ttl: Duration,
}

impl ContentStore {
    /// Create a store over `pool` with the given blob lifetime, installing
    /// the schema if absent.
    pub async fn new(pool: SqlitePool, cpu: CpuPool, ttl: Duration) -> Result<Self, StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_hash TEXT NOT NULL,
                job_id TEXT NOT NULL,
                data BLOB NOT NULL,
                size_bytes INTEGER NOT NULL,
                reference_count INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_blobs_hash ON blobs (content_hash)",
            "CREATE INDEX IF NOT EXISTS idx_blobs_job ON blobs (job_id)",
            "CREATE INDEX IF NOT EXISTS idx_blobs_expiry ON blobs (expires_at)",
        ] {
            sqlx::query(ddl).execute(&pool).await?;
        }

        Ok(Self { pool, cpu, ttl })
    }

    /// Persist `bytes` for `job_id` and return their content hash.
    ///
    /// The hash is computed for tracking, but the row is always written —
    /// byte-identical uploads land as separate physical rows owned by their
    /// respective jobs, and deduplication shows up only in [`stats`].
    ///
    /// [`stats`]: Self::stats
    pub async fn save_or_reuse(
        &self,
        bytes: Vec<u8>,
        job_id: &str,
    ) -> Result<String, StoreError> {
        let (bytes, content_hash) = self
            .cpu
            .run(move || {
                let digest = Sha256::digest(&bytes);
                let hash = hex::encode(digest);
                (bytes, hash)
            })
            .await?;

        let now = Utc::now();
        let expires_at = now + self.ttl;
        let size_bytes = bytes.len() as i64;

        sqlx::query(
            "INSERT INTO blobs (content_hash, job_id, data, size_bytes, reference_count,
                                created_at, expires_at)
             VALUES (?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(&content_hash)
        .bind(job_id)
        .bind(&bytes)
        .bind(size_bytes)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        debug!(
            hash = %&content_hash[..8.min(content_hash.len())],
            size_bytes,
            job_id,
            "blob saved"
        );
        Ok(content_hash)
    }

    /// Fetch the bytes behind `content_hash`.
    ///
    /// Fails with [`StoreError::NotFound`] when the blob is absent or its
    /// expiry has passed, even if the reaper has not yet removed the row.
    pub async fn get_by_hash(&self, content_hash: &str) -> Result<Vec<u8>, StoreError> {
        let row = sqlx::query(
            "SELECT data FROM blobs
             WHERE content_hash = ? AND expires_at > ?
             ORDER BY id LIMIT 1",
        )
        .bind(content_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.try_get("data")?),
            None => Err(StoreError::NotFound {
                hash: content_hash.to_string(),
            }),
        }
    }

    /// Blob metadata for `content_hash`, honoring expiry.
    pub async fn head_by_hash(&self, content_hash: &str) -> Result<StoredBlob, StoreError> {
        let row = sqlx::query(
            "SELECT content_hash, job_id, size_bytes, reference_count, created_at, expires_at
             FROM blobs
             WHERE content_hash = ? AND expires_at > ?
             ORDER BY id LIMIT 1",
        )
        .bind(content_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| StoreError::NotFound {
            hash: content_hash.to_string(),
        })?;
        Ok(StoredBlob {
            content_hash: row.try_get("content_hash")?,
            job_id: row.try_get("job_id")?,
            size_bytes: row.try_get::<i64, _>("size_bytes")? as u64,
            reference_count: row.try_get("reference_count")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    /// Record an additional logical reference to `content_hash`.
    ///
    /// Saves always insert their own physical row, so this is how callers
    /// sharing an existing blob keep the statistics and the delete path
    /// honest. Returns `false` when no row carries the hash.
    pub async fn increment_reference(&self, content_hash: &str) -> Result<bool, StoreError> {
        let outcome = sqlx::query(
            "UPDATE blobs SET reference_count = reference_count + 1
             WHERE id = (SELECT id FROM blobs WHERE content_hash = ? ORDER BY id LIMIT 1)",
        )
        .bind(content_hash)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Drop one reference to `content_hash`.
    ///
    /// Physically deletes the row when the reference count reaches zero;
    /// otherwise only decrements. Returns `true` when a physical delete
    /// happened.
    pub async fn delete_by_hash(&self, content_hash: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT id, reference_count FROM blobs
             WHERE content_hash = ?
             ORDER BY id LIMIT 1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        let id: i64 = row.try_get("id")?;
        let reference_count: i64 = row.try_get("reference_count")?;

        if reference_count <= 1 {
            sqlx::query("DELETE FROM blobs WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            debug!(hash = %&content_hash[..8.min(content_hash.len())], "blob deleted");
            Ok(true)
        } else {
            sqlx::query("UPDATE blobs SET reference_count = reference_count - 1 WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(false)
        }
    }

    /// Aggregate storage statistics, including the deduplication ratio.
    pub async fn stats(&self) -> Result<BlobStats, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_files,
                    COALESCE(SUM(size_bytes), 0) AS total_size,
                    COALESCE(SUM(reference_count), 0) AS total_refs
             FROM blobs",
        )
        .fetch_one(&self.pool)
        .await?;

        let total_files = row.try_get::<i64, _>("total_files")? as u64;
        let total_size_bytes = row.try_get::<i64, _>("total_size")? as u64;
        let total_references = row.try_get::<i64, _>("total_refs")? as u64;
        let dedup_ratio = if total_references > 0 {
            (total_references - total_files) as f64 / total_references as f64
        } else {
            0.0
        };

        Ok(BlobStats {
            total_files,
            total_size_bytes,
            total_references,
            dedup_ratio,
        })
    }

    /// Physically remove expired rows. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let outcome = sqlx::query("DELETE FROM blobs WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        let removed = outcome.rows_affected();
        if removed > 0 {
            info!(removed, "expired blobs purged");
        }
        Ok(removed)
    }

    /// Spawn a background reaper that purges expired blobs on `interval`.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = store.purge_expired().await {
                    warn!(%err, "blob reaper sweep failed");
                }
            }
        })
    }
}
