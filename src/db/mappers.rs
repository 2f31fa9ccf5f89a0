#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::{ForgeError, Result};
use crate::types::{
    Artifact, ArtifactId, ArtifactType, GeneratedBy, Job, JobId, JobStatus, ParsedError, ReportId,
    SandboxProvider, TenantId, UserId, ValidationReport, ValidationType,
};

fn invalid(context: &str, detail: impl std::fmt::Display) -> ForgeError {
    ForgeError::DatabaseError(format!("Corrupt {context} row: {detail}"))
}

pub fn job_from_row(row: &PgRow) -> Result<Job> {
    let status: String = row.try_get("status")?;
    let provider: Option<String> = row.try_get("sandbox_provider")?;

    Ok(Job {
        job_id: JobId::new(row.try_get::<String, _>("job_id")?),
        requirement: row.try_get("requirement")?,
        tenant_id: TenantId::new(row.try_get::<String, _>("tenant_id")?),
        user_id: UserId::new(row.try_get::<String, _>("user_id")?),
        template_context: row.try_get("template_context")?,
        status: JobStatus::try_from(status.as_str()).map_err(|e| invalid("job", e))?,
        current_round: row.try_get::<i32, _>("current_round")? as u32,
        max_rounds: row.try_get::<i32, _>("max_rounds")? as u32,
        enable_integration_tests: row.try_get("enable_integration_tests")?,
        contract_spec: row.try_get("contract_spec")?,
        schema_spec: row.try_get("schema_spec")?,
        contract_locked: row.try_get("contract_locked")?,
        contract_locked_at: row.try_get("contract_locked_at")?,
        sandbox_id: row.try_get("sandbox_id")?,
        sandbox_url: row.try_get("sandbox_url")?,
        sandbox_provider: provider
            .map(|value| SandboxProvider::try_from(value.as_str()))
            .transpose()
            .map_err(|e| invalid("job", e))?,
        last_error: row.try_get("last_error")?,
        error_count: row.try_get::<i32, _>("error_count")? as u32,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

pub fn artifact_from_row(row: &PgRow) -> Result<Artifact> {
    let artifact_type: String = row.try_get("artifact_type")?;
    let generated_by: String = row.try_get("generated_by")?;
    let parent: Option<String> = row.try_get("parent_artifact_id")?;

    Ok(Artifact {
        artifact_id: ArtifactId::new(row.try_get::<String, _>("artifact_id")?),
        job_id: JobId::new(row.try_get::<String, _>("job_id")?),
        artifact_type: ArtifactType::try_from(artifact_type.as_str())
            .map_err(|e| invalid("artifact", e))?,
        file_path: row.try_get("file_path")?,
        file_name: row.try_get("file_name")?,
        content: row.try_get("content")?,
        language: row.try_get("language")?,
        version: row.try_get::<i32, _>("version")? as u32,
        parent_artifact_id: parent.map(ArtifactId::new),
        checksum: row.try_get("checksum")?,
        has_errors: row.try_get("has_errors")?,
        compiler_output: row.try_get("compiler_output")?,
        validated_at: row.try_get("validated_at")?,
        generated_by: GeneratedBy::try_from(generated_by.as_str())
            .map_err(|e| invalid("artifact", e))?,
        generation_round: row.try_get::<i32, _>("generation_round")? as u32,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

pub fn report_from_row(row: &PgRow) -> Result<ValidationReport> {
    let validation_type: String = row.try_get("validation_type")?;
    let parsed_errors: serde_json::Value = row.try_get("parsed_errors")?;
    let parsed_errors: Vec<ParsedError> = serde_json::from_value(parsed_errors)?;

    Ok(ValidationReport {
        report_id: ReportId::new(row.try_get::<String, _>("report_id")?),
        job_id: JobId::new(row.try_get::<String, _>("job_id")?),
        round: row.try_get::<i32, _>("round")? as u32,
        validation_type: ValidationType::try_from(validation_type.as_str())
            .map_err(|e| invalid("validation report", e))?,
        passed: row.try_get("passed")?,
        command: row.try_get("command")?,
        exit_code: row.try_get::<i32, _>("exit_code")?,
        stdout: row.try_get("stdout")?,
        stderr: row.try_get("stderr")?,
        duration_ms: row.try_get::<i64, _>("duration_ms")? as u64,
        parsed_errors,
        error_count: row.try_get::<i32, _>("error_count")? as u32,
        warning_count: row.try_get::<i32, _>("warning_count")? as u32,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
