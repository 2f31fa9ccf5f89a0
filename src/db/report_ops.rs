#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::db::mappers::report_from_row;
use crate::db::ForgeDb;
use crate::error::{ForgeError, Result};
use crate::store::{PortFuture, ReportStore};
use crate::types::{JobId, ValidationReport};

impl ForgeDb {
    /// Append-only insert; reports are never updated.
    pub async fn insert_report(&self, report: &ValidationReport) -> Result<()> {
        let parsed_errors = serde_json::to_value(&report.parsed_errors)?;
        sqlx::query(
            r"INSERT INTO validation_reports (
                report_id, job_id, round, validation_type, passed,
                command, exit_code, stdout, stderr, duration_ms,
                parsed_errors, error_count, warning_count, created_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
        )
        .bind(report.report_id.value())
        .bind(report.job_id.value())
        .bind(report.round as i32)
        .bind(report.validation_type.as_str())
        .bind(report.passed)
        .bind(&report.command)
        .bind(report.exit_code)
        .bind(&report.stdout)
        .bind(&report.stderr)
        .bind(report.duration_ms as i64)
        .bind(parsed_errors)
        .bind(report.error_count as i32)
        .bind(report.warning_count as i32)
        .bind(report.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| ForgeError::DatabaseError(format!("Failed to insert report: {e}")))?;
        Ok(())
    }

    pub async fn reports_for_job(&self, job_id: &JobId) -> Result<Vec<ValidationReport>> {
        let rows = sqlx::query(
            "SELECT * FROM validation_reports WHERE job_id = $1 ORDER BY created_at",
        )
        .bind(job_id.value())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(report_from_row).collect()
    }
}

impl ReportStore for ForgeDb {
    fn insert<'a>(&'a self, report: &'a ValidationReport) -> PortFuture<'a, ()> {
        Box::pin(async move { self.insert_report(report).await })
    }

    fn list_for_job<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, Vec<ValidationReport>> {
        Box::pin(async move { self.reports_for_job(job_id).await })
    }
}
