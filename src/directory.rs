//! Project/plan directory boundary.
//!
//! The pipeline consumes, but does not implement, the platform's project
//! and plan catalog: a project id resolves to its ephemeral database scope
//! and expiry, and a tier name resolves to its numeric limits. A
//! [`StaticDirectory`] in-memory implementation ships for tests and demos.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::limiter::Tier;

/// Where a project's data lives and when it vanishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectScope {
    pub project_id: String,
    /// Ephemeral database name scoping the project's collections.
    pub database: String,
    /// Moment the project and everything it owns expires.
    pub expires_at: DateTime<Utc>,
}

/// Numeric limits attached to a tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanLimits {
    pub tier: Tier,
    pub pdf_max_size_mb: u64,
    pub max_concurrent_extractions: usize,
}

impl PlanLimits {
    /// Built-in limits for a tier, used when no catalog overrides them.
    pub fn defaults_for(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                tier,
                pdf_max_size_mb: 10,
                max_concurrent_extractions: 1,
            },
            Tier::Starter => Self {
                tier,
                pdf_max_size_mb: 25,
                max_concurrent_extractions: 2,
            },
            Tier::Pro => Self {
                tier,
                pdf_max_size_mb: 100,
                max_concurrent_extractions: 5,
            },
        }
    }
}

/// Errors surfaced by directory lookups.
#[derive(Debug, Error, Diagnostic)]
pub enum DirectoryError {
    #[error("project not found: {project_id}")]
    #[diagnostic(
        code(inkstream::directory::project_not_found),
        help("The project may have expired; ephemeral projects vanish with their data.")
    )]
    ProjectNotFound { project_id: String },
}

/// Read-only view of the platform's project and plan catalog.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Resolve a project id to its database scope and expiry.
    async fn project_scope(&self, project_id: &str) -> Result<ProjectScope, DirectoryError>;

    /// Resolve a tier name to its limits. Unknown names fall back to the
    /// most restrictive tier.
    async fn plan_limits(&self, tier_name: &str) -> Result<PlanLimits, DirectoryError>;
}

/// In-memory directory for tests and demos.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    projects: RwLock<FxHashMap<String, ProjectScope>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a project scope.
    pub fn insert_project(&self, scope: ProjectScope) {
        self.projects
            .write()
            .expect("project map poisoned")
            .insert(scope.project_id.clone(), scope);
    }
}

#[async_trait]
impl ProjectDirectory for StaticDirectory {
    async fn project_scope(&self, project_id: &str) -> Result<ProjectScope, DirectoryError> {
        self.projects
            .read()
            .expect("project map poisoned")
            .get(project_id)
            .cloned()
            .ok_or_else(|| DirectoryError::ProjectNotFound {
                project_id: project_id.to_string(),
            })
    }

    async fn plan_limits(&self, tier_name: &str) -> Result<PlanLimits, DirectoryError> {
        Ok(PlanLimits::defaults_for(Tier::parse(tier_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_directory_resolves_inserted_projects() {
        let directory = StaticDirectory::new();
        let scope = ProjectScope {
            project_id: "proj_1".into(),
            database: "proj_1_db".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        directory.insert_project(scope.clone());

        assert_eq!(directory.project_scope("proj_1").await.unwrap(), scope);
        assert!(matches!(
            directory.project_scope("missing").await,
            Err(DirectoryError::ProjectNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_tier_gets_free_limits() {
        let directory = StaticDirectory::new();
        let limits = directory.plan_limits("platinum").await.unwrap();
        assert_eq!(limits.tier, Tier::Free);
        assert_eq!(limits.max_concurrent_extractions, 1);
    }
}
