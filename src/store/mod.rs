//! Storage ports consumed by the orchestrator. The core never depends on a
//! particular database; `db::ForgeDb` provides the Postgres implementation
//! and `store::memory` the in-process one used by tests.

mod memory;

pub use memory::{InMemoryArtifactStore, InMemoryJobStore, InMemoryReportStore};

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::types::{
    Artifact, ArtifactId, GeneratedBy, Job, JobId, JobStatus, ValidationReport,
};

pub type PortFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable job records. `update_job` must be a single-record atomic write.
pub trait JobStore: Send + Sync {
    fn create_job<'a>(&'a self, job: &'a Job) -> PortFuture<'a, ()>;

    fn get_job<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, Option<Job>>;

    fn update_job<'a>(&'a self, job: &'a Job) -> PortFuture<'a, ()>;

    fn list_by_status(&self, status: JobStatus) -> PortFuture<'_, Vec<Job>>;

    /// Idempotent: locking an already locked contract is a no-op.
    fn lock_contract<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, ()>;

    /// Running jobs whose `updated_at` is older than the given instant.
    fn find_stale_running(&self, older_than: DateTime<Utc>) -> PortFuture<'_, Vec<Job>>;
}

/// Versioned artifact records. `new_version` enforces linear history per
/// path: a parent with an existing child must conflict.
pub trait ArtifactStore: Send + Sync {
    fn create<'a>(
        &'a self,
        job_id: &'a JobId,
        file_path: &'a str,
        content: &'a str,
        generated_by: GeneratedBy,
        round: u32,
    ) -> PortFuture<'a, Artifact>;

    fn new_version<'a>(
        &'a self,
        artifact_id: &'a ArtifactId,
        new_content: &'a str,
        generated_by: GeneratedBy,
    ) -> PortFuture<'a, Artifact>;

    fn mark_error<'a>(&'a self, artifact_id: &'a ArtifactId, output: &'a str)
        -> PortFuture<'a, ()>;

    fn mark_valid<'a>(&'a self, artifact_id: &'a ArtifactId) -> PortFuture<'a, ()>;

    fn get<'a>(&'a self, artifact_id: &'a ArtifactId) -> PortFuture<'a, Option<Artifact>>;

    /// Latest version of every path the job owns.
    fn list_latest<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, Vec<Artifact>>;

    /// Full version chain of one path, oldest first.
    fn list_by_path<'a>(
        &'a self,
        job_id: &'a JobId,
        file_path: &'a str,
    ) -> PortFuture<'a, Vec<Artifact>>;
}

/// Append-only validation reports.
pub trait ReportStore: Send + Sync {
    fn insert<'a>(&'a self, report: &'a ValidationReport) -> PortFuture<'a, ()>;

    fn list_for_job<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, Vec<ValidationReport>>;
}

/// Convenience for recovery sweeps: the cutoff instant for staleness.
#[must_use]
pub fn stale_cutoff(now: DateTime<Utc>, threshold_ms: u64) -> DateTime<Utc> {
    now - chrono::Duration::milliseconds(threshold_ms as i64)
}
