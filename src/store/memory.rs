//! In-process store implementations. They back the orchestrator unit tests
//! and the end-to-end scenarios; the Postgres implementations in `db` share
//! their contracts.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ForgeError, Result};
use crate::types::{
    Artifact, ArtifactId, GeneratedBy, Job, JobId, JobStatus, ValidationReport,
};

use super::{ArtifactStore, JobStore, PortFuture, ReportStore};

/// In-memory job store
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<Mutex<HashMap<JobId, Job>>>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn create_job<'a>(&'a self, job: &'a Job) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let mut jobs = self.jobs.lock().await;
            if jobs.contains_key(&job.job_id) {
                return Err(ForgeError::Internal(format!(
                    "Job already exists: {}",
                    job.job_id
                )));
            }
            jobs.insert(job.job_id.clone(), job.clone());
            Ok(())
        })
    }

    fn get_job<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, Option<Job>> {
        Box::pin(async move { Ok(self.jobs.lock().await.get(job_id).cloned()) })
    }

    fn update_job<'a>(&'a self, job: &'a Job) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let mut jobs = self.jobs.lock().await;
            if !jobs.contains_key(&job.job_id) {
                return Err(ForgeError::JobNotFound(job.job_id.value().to_string()));
            }
            jobs.insert(job.job_id.clone(), job.clone());
            Ok(())
        })
    }

    fn list_by_status(&self, status: JobStatus) -> PortFuture<'_, Vec<Job>> {
        Box::pin(async move {
            let jobs = self.jobs.lock().await;
            Ok(jobs
                .values()
                .filter(|job| job.status == status)
                .cloned()
                .collect())
        })
    }

    fn lock_contract<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let mut jobs = self.jobs.lock().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| ForgeError::JobNotFound(job_id.value().to_string()))?;
            job.lock_contract();
            Ok(())
        })
    }

    fn find_stale_running(&self, older_than: DateTime<Utc>) -> PortFuture<'_, Vec<Job>> {
        Box::pin(async move {
            let jobs = self.jobs.lock().await;
            Ok(jobs
                .values()
                .filter(|job| job.is_running() && job.updated_at < older_than)
                .cloned()
                .collect())
        })
    }
}

/// In-memory artifact store with linear per-path version chains
#[derive(Clone, Default)]
pub struct InMemoryArtifactStore {
    artifacts: Arc<Mutex<HashMap<ArtifactId, Artifact>>>,
}

impl InMemoryArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn create<'a>(
        &'a self,
        job_id: &'a JobId,
        file_path: &'a str,
        content: &'a str,
        generated_by: GeneratedBy,
        round: u32,
    ) -> PortFuture<'a, Artifact> {
        Box::pin(async move {
            let artifact =
                Artifact::initial(job_id.clone(), file_path, content, generated_by, round)?;
            let mut artifacts = self.artifacts.lock().await;
            if artifacts
                .values()
                .any(|existing| existing.job_id == *job_id && existing.file_path == file_path)
            {
                return Err(ForgeError::VersionConflict {
                    path: file_path.to_string(),
                    parent: "none".to_string(),
                });
            }
            artifacts.insert(artifact.artifact_id.clone(), artifact.clone());
            Ok(artifact)
        })
    }

    fn new_version<'a>(
        &'a self,
        artifact_id: &'a ArtifactId,
        new_content: &'a str,
        generated_by: GeneratedBy,
    ) -> PortFuture<'a, Artifact> {
        Box::pin(async move {
            // Check-and-insert under one lock: this is the serialization
            // point the optimistic-concurrency contract requires.
            let mut artifacts = self.artifacts.lock().await;
            let parent = artifacts
                .get(artifact_id)
                .cloned()
                .ok_or_else(|| ForgeError::ArtifactNotFound(artifact_id.value().to_string()))?;
            let has_child = artifacts
                .values()
                .any(|candidate| candidate.parent_artifact_id.as_ref() == Some(artifact_id));
            if has_child {
                return Err(ForgeError::VersionConflict {
                    path: parent.file_path.clone(),
                    parent: artifact_id.value().to_string(),
                });
            }
            let successor = Artifact::successor(&parent, new_content, generated_by);
            artifacts.insert(successor.artifact_id.clone(), successor.clone());
            Ok(successor)
        })
    }

    fn mark_error<'a>(
        &'a self,
        artifact_id: &'a ArtifactId,
        output: &'a str,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let mut artifacts = self.artifacts.lock().await;
            let artifact = artifacts
                .get_mut(artifact_id)
                .ok_or_else(|| ForgeError::ArtifactNotFound(artifact_id.value().to_string()))?;
            artifact.has_errors = true;
            artifact.compiler_output = Some(output.to_string());
            artifact.validated_at = Some(Utc::now());
            Ok(())
        })
    }

    fn mark_valid<'a>(&'a self, artifact_id: &'a ArtifactId) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let mut artifacts = self.artifacts.lock().await;
            let artifact = artifacts
                .get_mut(artifact_id)
                .ok_or_else(|| ForgeError::ArtifactNotFound(artifact_id.value().to_string()))?;
            artifact.has_errors = false;
            artifact.compiler_output = None;
            artifact.validated_at = Some(Utc::now());
            Ok(())
        })
    }

    fn get<'a>(&'a self, artifact_id: &'a ArtifactId) -> PortFuture<'a, Option<Artifact>> {
        Box::pin(async move { Ok(self.artifacts.lock().await.get(artifact_id).cloned()) })
    }

    fn list_latest<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, Vec<Artifact>> {
        Box::pin(async move {
            let artifacts = self.artifacts.lock().await;
            let mut latest: Vec<Artifact> = artifacts
                .values()
                .filter(|artifact| artifact.job_id == *job_id)
                .filter(|artifact| {
                    !artifacts.values().any(|candidate| {
                        candidate.parent_artifact_id.as_ref() == Some(&artifact.artifact_id)
                    })
                })
                .cloned()
                .collect();
            latest.sort_by(|a, b| a.file_path.cmp(&b.file_path));
            Ok(latest)
        })
    }

    fn list_by_path<'a>(
        &'a self,
        job_id: &'a JobId,
        file_path: &'a str,
    ) -> PortFuture<'a, Vec<Artifact>> {
        Box::pin(async move {
            let artifacts = self.artifacts.lock().await;
            let mut chain: Vec<Artifact> = artifacts
                .values()
                .filter(|artifact| artifact.job_id == *job_id && artifact.file_path == file_path)
                .cloned()
                .collect();
            chain.sort_by_key(|artifact| artifact.version);
            Ok(chain)
        })
    }
}

/// In-memory append-only report store
#[derive(Clone, Default)]
pub struct InMemoryReportStore {
    reports: Arc<Mutex<Vec<ValidationReport>>>,
}

impl InMemoryReportStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for InMemoryReportStore {
    fn insert<'a>(&'a self, report: &'a ValidationReport) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.reports.lock().await.push(report.clone());
            Ok(())
        })
    }

    fn list_for_job<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, Vec<ValidationReport>> {
        Box::pin(async move {
            let reports = self.reports.lock().await;
            Ok(reports
                .iter()
                .filter(|report| report.job_id == *job_id)
                .cloned()
                .collect())
        })
    }
}
