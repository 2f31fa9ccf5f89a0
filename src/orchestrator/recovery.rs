use chrono::Utc;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;
use crate::logstream::LogStream;
use crate::store::{stale_cutoff, JobStore};
use crate::types::{JobId, JobStatus, LogLevel, LogRole};

/// Fails running jobs whose last update is older than the staleness
/// threshold. Session memory is not durable, so an orchestrator restart
/// cannot resume them; failing fast beats leaving them stuck.
pub async fn recover_stale_jobs(
    jobs: &dyn JobStore,
    logs: &LogStream,
    threshold: Duration,
) -> Result<Vec<JobId>> {
    let cutoff = stale_cutoff(Utc::now(), threshold.as_millis() as u64);
    let stale = jobs.find_stale_running(cutoff).await?;

    let mut recovered = Vec::with_capacity(stale.len());
    for mut job in stale {
        warn!(
            "Recovering stale job {} (status {}, last update {})",
            job.job_id, job.status, job.updated_at
        );
        job.set_last_error("orchestrator restarted mid-job");
        job.transition(JobStatus::Failed)?;
        jobs.update_job(&job).await?;
        logs.append(
            &job.job_id,
            LogRole::System,
            LogLevel::Error,
            "Job failed: orchestrator restarted mid-job",
        )
        .await;
        logs.close(&job.job_id).await;
        recovered.push(job.job_id);
    }
    Ok(recovered)
}
