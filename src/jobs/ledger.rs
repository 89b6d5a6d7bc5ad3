//! SQLite-backed job ledger.
//!
//! The ledger is the durable record clients poll for job status, progress,
//! and results. Stage handlers treat ledger writes as best-effort side
//! channels — the event bus, not the ledger, drives control flow — so every
//! write here is a single statement the storage layer applies atomically.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::debug;

use super::job::{IngestionJob, JobStatus, JobType};

/// Errors surfaced by ledger operations.
#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    #[diagnostic(
        code(inkstream::jobs::sqlx),
        help("Ensure the SQLite database URL is valid and accessible.")
    )]
    Sqlx(#[from] sqlx::Error),

    #[error("ledger serialization error: {0}")]
    #[diagnostic(code(inkstream::jobs::serde))]
    Serde(#[from] serde_json::Error),
}

/// Optional fields accompanying a status transition.
#[derive(Clone, Debug, Default)]
pub struct StatusUpdate {
    pub progress: Option<i64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn progress(progress: i64) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Filter for scoped job queries.
#[derive(Clone, Debug, Default)]
pub struct JobFilter {
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
}

impl JobFilter {
    #[must_use]
    pub fn by_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Sort order for job queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JobSort {
    #[default]
    CreatedDesc,
    CreatedAsc,
}

impl JobSort {
    fn sql(self) -> &'static str {
        match self {
            Self::CreatedDesc => "created_at DESC",
            Self::CreatedAsc => "created_at ASC",
        }
    }
}

/// Durable record of ingestion jobs with atomic progress counters.
#[derive(Clone, Debug)]
pub struct JobLedger {
    pool: SqlitePool,
}

impl JobLedger {
    /// Create a ledger over `pool`, installing the schema if absent.
    pub async fn new(pool: SqlitePool) -> Result<Self, LedgerError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                collection TEXT NOT NULL,
                job_type TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL,
                result TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            )",
        )
        .execute(&pool)
        .await?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_jobs_user ON jobs (user_id)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_project ON jobs (project_id)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs (created_at)",
        ] {
            sqlx::query(ddl).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// Insert a new job in `queued` state and return the stored record.
    pub async fn create(
        &self,
        job_id: &str,
        user_id: &str,
        project_id: &str,
        collection: &str,
        job_type: JobType,
        metadata: serde_json::Value,
    ) -> Result<IngestionJob, LedgerError> {
        let now = Utc::now();
        let job = IngestionJob {
            job_id: job_id.to_string(),
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            collection: collection.to_string(),
            job_type,
            status: JobStatus::Queued,
            progress: 0,
            metadata,
            result: serde_json::json!({}),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        sqlx::query(
            "INSERT INTO jobs (job_id, user_id, project_id, collection, job_type, status,
                               progress, metadata, result, error, created_at, updated_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, NULL)",
        )
        .bind(&job.job_id)
        .bind(&job.user_id)
        .bind(&job.project_id)
        .bind(&job.collection)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.progress)
        .bind(job.metadata.to_string())
        .bind(job.result.to_string())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(job_id, job_type = %job_type, "job created");
        Ok(job)
    }

    /// Fetch a job by id. An unknown id is `Ok(None)`, never an error.
    pub async fn get(&self, job_id: &str) -> Result<Option<IngestionJob>, LedgerError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| decode_job(&row)).transpose()
    }

    /// Replace the job's status and any provided fields, touching
    /// `updated_at`.
    ///
    /// Reaching `completed` forces progress to 100 and stamps
    /// `completed_at`; reaching `failed` stamps `completed_at` without
    /// touching progress.
    pub async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        update: StatusUpdate,
    ) -> Result<(), LedgerError> {
        let now = Utc::now();
        let mut sets = vec!["status = ?", "updated_at = ?"];

        let progress = match status {
            JobStatus::Completed => Some(100),
            _ => update.progress,
        };
        if progress.is_some() {
            sets.push("progress = ?");
        }
        let result_text = update.result.as_ref().map(ToString::to_string);
        if result_text.is_some() {
            sets.push("result = ?");
        }
        if update.error.is_some() {
            sets.push("error = ?");
        }
        if status.is_terminal() {
            sets.push("completed_at = ?");
        }

        let sql = format!("UPDATE jobs SET {} WHERE job_id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql).bind(status.as_str()).bind(now);
        if let Some(progress) = progress {
            query = query.bind(progress);
        }
        if let Some(result_text) = result_text {
            query = query.bind(result_text);
        }
        if let Some(error) = &update.error {
            query = query.bind(error);
        }
        if status.is_terminal() {
            query = query.bind(now);
        }
        query.bind(job_id).execute(&self.pool).await?;

        debug!(job_id, status = %status, progress = ?progress, "job status updated");
        Ok(())
    }

    /// Atomically add `delta` to the job's progress (capped at 100),
    /// optionally moving status and replacing the result map.
    pub async fn increment_progress(
        &self,
        job_id: &str,
        delta: i64,
        status: Option<JobStatus>,
        result: Option<serde_json::Value>,
    ) -> Result<(), LedgerError> {
        let mut sets = vec!["progress = MIN(100, progress + ?)", "updated_at = ?"];
        if status.is_some() {
            sets.push("status = ?");
        }
        let result_text = result.as_ref().map(ToString::to_string);
        if result_text.is_some() {
            sets.push("result = ?");
        }

        let sql = format!("UPDATE jobs SET {} WHERE job_id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql).bind(delta).bind(Utc::now());
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        if let Some(result_text) = result_text {
            query = query.bind(result_text);
        }
        query.bind(job_id).execute(&self.pool).await?;

        debug!(job_id, delta, "job progress incremented");
        Ok(())
    }

    /// Most recent jobs for an owner, optionally filtered by status.
    pub async fn list_by_owner(
        &self,
        user_id: &str,
        limit: u32,
        status: Option<JobStatus>,
    ) -> Result<Vec<IngestionJob>, LedgerError> {
        let filter = JobFilter {
            user_id: Some(user_id.to_string()),
            status,
            ..JobFilter::default()
        };
        self.find(filter, limit, JobSort::CreatedDesc).await
    }

    /// Scoped query over the ledger.
    pub async fn find(
        &self,
        filter: JobFilter,
        limit: u32,
        sort: JobSort,
    ) -> Result<Vec<IngestionJob>, LedgerError> {
        let mut conditions = Vec::new();
        if filter.user_id.is_some() {
            conditions.push("user_id = ?");
        }
        if filter.project_id.is_some() {
            conditions.push("project_id = ?");
        }
        if filter.status.is_some() {
            conditions.push("status = ?");
        }
        if filter.job_type.is_some() {
            conditions.push("job_type = ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM jobs{where_clause} ORDER BY {} LIMIT ?",
            sort.sql()
        );
        let mut query = sqlx::query(&sql);
        if let Some(user_id) = &filter.user_id {
            query = query.bind(user_id);
        }
        if let Some(project_id) = &filter.project_id {
            query = query.bind(project_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(job_type) = filter.job_type {
            query = query.bind(job_type.as_str());
        }

        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(decode_job).collect()
    }

    /// Retention hook: delete terminal jobs completed before `cutoff`.
    ///
    /// The pipeline never deletes jobs; callers run this on whatever
    /// schedule their retention policy dictates.
    pub async fn purge_completed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        let outcome = sqlx::query(
            "DELETE FROM jobs
             WHERE completed_at IS NOT NULL AND completed_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected())
    }
}

fn decode_job(row: &SqliteRow) -> Result<IngestionJob, LedgerError> {
    let status_raw: String = row.try_get("status")?;
    let job_type_raw: String = row.try_get("job_type")?;
    let metadata_raw: String = row.try_get("metadata")?;
    let result_raw: String = row.try_get("result")?;

    Ok(IngestionJob {
        job_id: row.try_get("job_id")?,
        user_id: row.try_get("user_id")?,
        project_id: row.try_get("project_id")?,
        collection: row.try_get("collection")?,
        job_type: JobType::parse(&job_type_raw).unwrap_or(JobType::TextIngest),
        status: JobStatus::parse(&status_raw).unwrap_or(JobStatus::Failed),
        progress: row.try_get("progress")?,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or_default(),
        result: serde_json::from_str(&result_raw).unwrap_or_default(),
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}
