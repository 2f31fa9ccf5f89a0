#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};

use crate::db::mappers::job_from_row;
use crate::db::ForgeDb;
use crate::error::{ForgeError, Result};
use crate::store::{JobStore, PortFuture};
use crate::types::{Job, JobId, JobStatus};

impl ForgeDb {
    pub async fn insert_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r"INSERT INTO jobs (
                job_id, requirement, tenant_id, user_id, template_context,
                status, current_round, max_rounds, enable_integration_tests,
                contract_spec, schema_spec, contract_locked, contract_locked_at,
                sandbox_id, sandbox_url, sandbox_provider,
                last_error, error_count, started_at, completed_at,
                created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)",
        )
        .bind(job.job_id.value())
        .bind(&job.requirement)
        .bind(job.tenant_id.value())
        .bind(job.user_id.value())
        .bind(&job.template_context)
        .bind(job.status.as_str())
        .bind(job.current_round as i32)
        .bind(job.max_rounds as i32)
        .bind(job.enable_integration_tests)
        .bind(&job.contract_spec)
        .bind(&job.schema_spec)
        .bind(job.contract_locked)
        .bind(job.contract_locked_at)
        .bind(&job.sandbox_id)
        .bind(&job.sandbox_url)
        .bind(job.sandbox_provider.map(|p| p.as_str()))
        .bind(&job.last_error)
        .bind(job.error_count as i32)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| ForgeError::DatabaseError(format!("Failed to insert job: {e}")))?;
        Ok(())
    }

    pub async fn fetch_job(&self, job_id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id.value())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Single-row update. Contract and schema columns are only written
    /// while the contract is still unlocked.
    pub async fn persist_job(&self, job: &Job) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE jobs SET
                status = $2,
                current_round = $3,
                enable_integration_tests = $4,
                contract_spec = CASE WHEN contract_locked THEN contract_spec ELSE $5 END,
                schema_spec = CASE WHEN contract_locked THEN schema_spec ELSE $6 END,
                sandbox_id = $7,
                sandbox_url = $8,
                sandbox_provider = $9,
                last_error = $10,
                error_count = $11,
                started_at = $12,
                completed_at = $13,
                updated_at = $14
            WHERE job_id = $1",
        )
        .bind(job.job_id.value())
        .bind(job.status.as_str())
        .bind(job.current_round as i32)
        .bind(job.enable_integration_tests)
        .bind(&job.contract_spec)
        .bind(&job.schema_spec)
        .bind(&job.sandbox_id)
        .bind(&job.sandbox_url)
        .bind(job.sandbox_provider.map(|p| p.as_str()))
        .bind(&job.last_error)
        .bind(job.error_count as i32)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| ForgeError::DatabaseError(format!("Failed to update job: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(ForgeError::JobNotFound(job.job_id.value().to_string()));
        }
        Ok(())
    }

    pub async fn jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE status = $1 ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Idempotent contract lock.
    pub async fn lock_job_contract(&self, job_id: &JobId) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE jobs SET
                contract_locked = TRUE,
                contract_locked_at = COALESCE(contract_locked_at, NOW()),
                updated_at = NOW()
            WHERE job_id = $1",
        )
        .bind(job_id.value())
        .execute(self.pool())
        .await
        .map_err(|e| ForgeError::DatabaseError(format!("Failed to lock contract: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(ForgeError::JobNotFound(job_id.value().to_string()));
        }
        Ok(())
    }

    pub async fn stale_running_jobs(&self, older_than: DateTime<Utc>) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            r"SELECT * FROM jobs
            WHERE status IN ('planning', 'coding', 'testing') AND updated_at < $1
            ORDER BY updated_at",
        )
        .bind(older_than)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(job_from_row).collect()
    }
}

impl JobStore for ForgeDb {
    fn create_job<'a>(&'a self, job: &'a Job) -> PortFuture<'a, ()> {
        Box::pin(async move { self.insert_job(job).await })
    }

    fn get_job<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, Option<Job>> {
        Box::pin(async move { self.fetch_job(job_id).await })
    }

    fn update_job<'a>(&'a self, job: &'a Job) -> PortFuture<'a, ()> {
        Box::pin(async move { self.persist_job(job).await })
    }

    fn list_by_status(&self, status: JobStatus) -> PortFuture<'_, Vec<Job>> {
        Box::pin(async move { self.jobs_by_status(status).await })
    }

    fn lock_contract<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, ()> {
        Box::pin(async move { self.lock_job_contract(job_id).await })
    }

    fn find_stale_running(&self, older_than: DateTime<Utc>) -> PortFuture<'_, Vec<Job>> {
        Box::pin(async move { self.stale_running_jobs(older_than).await })
    }
}
