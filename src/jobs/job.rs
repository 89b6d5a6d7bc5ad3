//! Job record and its state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle states of an ingestion job.
///
/// Transitions are forward-only along
/// `queued → extracting_text → chunking → generating_embeddings → storing →
/// completed`, except into [`Failed`](Self::Failed), which is reachable from
/// any non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    ExtractingText,
    Chunking,
    GeneratingEmbeddings,
    Storing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::ExtractingText => "extracting_text",
            Self::Chunking => "chunking",
            Self::GeneratingEmbeddings => "generating_embeddings",
            Self::Storing => "storing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the persisted form. Unknown strings yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(Self::Queued),
            "extracting_text" => Some(Self::ExtractingText),
            "chunking" => Some(Self::Chunking),
            "generating_embeddings" => Some(Self::GeneratingEmbeddings),
            "storing" => Some(Self::Storing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of work a job performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    PdfIngest,
    TextIngest,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PdfIngest => "pdf_ingest",
            Self::TextIngest => "text_ingest",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pdf_ingest" => Some(Self::PdfIngest),
            "text_ingest" => Some(Self::TextIngest),
            _ => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of ingestion work tracked from creation to terminal state.
///
/// Created by an entry-point strategy, mutated exclusively by stage
/// handlers, and never deleted by the pipeline itself. Serializes to the
/// wire shape clients poll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: String,
    pub user_id: String,
    pub project_id: String,
    pub collection: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: i64,
    pub metadata: serde_json::Value,
    pub result: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestionJob {
    /// String field from the metadata map, if present.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }

    /// Unsigned integer field from the metadata map, if present.
    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(serde_json::Value::as_u64)
    }

    /// Unsigned integer field from the result map, defaulting to zero.
    pub fn result_u64(&self, key: &str) -> u64 {
        self.result
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_persisted_form() {
        for status in [
            JobStatus::Queued,
            JobStatus::ExtractingText,
            JobStatus::Chunking,
            JobStatus::GeneratingEmbeddings,
            JobStatus::Storing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Storing.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn wire_shape_uses_type_field() {
        let json = serde_json::to_value(JobType::PdfIngest).unwrap();
        assert_eq!(json, serde_json::json!("pdf_ingest"));
    }
}
