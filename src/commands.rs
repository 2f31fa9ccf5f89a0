use serde_json::json;
use tracing::debug;

use crate::cli::{CliCommand, OutputFormat};
use crate::output::emit_output;
use forge::{
    recover_stale_jobs, ForgeDb, ForgeError, GenerationOptions, Job, JobId, JobStatus,
    JobSubmission, LogStream, TenantId, UserId,
};

pub async fn run_command(command: CliCommand, output: &OutputFormat) -> forge::Result<()> {
    let db = connect().await?;
    match command {
        CliCommand::Submit {
            requirement,
            payload_file,
            tenant,
            user,
            max_rounds,
            integration_tests,
        } => {
            submit(
                &db,
                output,
                requirement,
                payload_file,
                tenant,
                user,
                max_rounds,
                integration_tests,
            )
            .await
        }
        CliCommand::Status { job_id } => status(&db, output, &JobId::new(job_id)).await,
        CliCommand::Jobs { status } => jobs(&db, output, status.as_deref()).await,
        CliCommand::Artifacts { job_id, path } => {
            artifacts(&db, output, &JobId::new(job_id), path.as_deref()).await
        }
        CliCommand::Reports { job_id } => reports(&db, output, &JobId::new(job_id)).await,
        CliCommand::Recover => recover(&db, output).await,
        CliCommand::InitDb => {
            db.init_schema().await?;
            emit_output(output, "init-db", json!({"message": "Schema initialized"}));
            Ok(())
        }
    }
}

async fn connect() -> forge::Result<ForgeDb> {
    let mut last_error = None;
    for url in forge::config::database_url_candidates() {
        match ForgeDb::new(&url).await {
            Ok(db) => return Ok(db),
            Err(err) => {
                debug!("Database candidate rejected: {}", err);
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        ForgeError::ConfigError("No database URL candidates available".to_string())
    }))
}

#[allow(clippy::too_many_arguments)]
async fn submit(
    db: &ForgeDb,
    output: &OutputFormat,
    requirement: Option<String>,
    payload_file: Option<String>,
    tenant: Option<String>,
    user: Option<String>,
    max_rounds: Option<u32>,
    integration_tests: bool,
) -> forge::Result<()> {
    let submission = match payload_file {
        Some(path) => {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str::<JobSubmission>(&content)?
        }
        None => {
            let requirement = requirement.ok_or_else(|| {
                ForgeError::ConfigError(
                    "submit needs --requirement or --file <payload.json>".to_string(),
                )
            })?;
            let mut submission = JobSubmission::new(
                requirement,
                TenantId::new(tenant.unwrap_or_else(|| "local".to_string())),
                UserId::new(user.unwrap_or_else(|| "local".to_string())),
            );
            if max_rounds.is_some() || integration_tests {
                submission.generation_options = Some(GenerationOptions {
                    max_rounds,
                    enable_integration_tests: integration_tests.then_some(true),
                });
            }
            submission
        }
    };

    let config = forge::load_config(None).await?;
    let job = Job::from_submission(
        JobId::generate(),
        &submission,
        config.max_rounds,
        config.enable_integration_tests,
    )?;
    db.insert_job(&job).await?;

    emit_output(
        output,
        "submit",
        json!({
            "message": format!("Queued job {}", job.job_id),
            "job_id": job.job_id.value(),
            "max_rounds": job.max_rounds,
        }),
    );
    Ok(())
}

async fn status(db: &ForgeDb, output: &OutputFormat, job_id: &JobId) -> forge::Result<()> {
    let job = db
        .fetch_job(job_id)
        .await?
        .ok_or_else(|| ForgeError::JobNotFound(job_id.value().to_string()))?;

    emit_output(
        output,
        "status",
        json!({
            "message": format!(
                "Job {} is {} (round {}/{}{})",
                job.job_id,
                job.status,
                job.current_round,
                job.max_rounds,
                job.last_error
                    .as_deref()
                    .map(|e| format!(", last error: {e}"))
                    .unwrap_or_default()
            ),
            "job_id": job.job_id.value(),
            "status": job.status.as_str(),
            "current_round": job.current_round,
            "max_rounds": job.max_rounds,
            "contract_locked": job.contract_locked,
            "sandbox_id": job.sandbox_id,
            "last_error": job.last_error,
            "error_count": job.error_count,
            "started_at": job.started_at,
            "completed_at": job.completed_at,
        }),
    );
    Ok(())
}

async fn jobs(db: &ForgeDb, output: &OutputFormat, status: Option<&str>) -> forge::Result<()> {
    let statuses: Vec<JobStatus> = match status {
        Some(value) => vec![JobStatus::try_from(value)
            .map_err(ForgeError::ConfigError)?],
        None => vec![
            JobStatus::Queued,
            JobStatus::Planning,
            JobStatus::Coding,
            JobStatus::Testing,
            JobStatus::Completed,
            JobStatus::Failed,
        ],
    };

    let listings = futures_util::future::try_join_all(
        statuses.into_iter().map(|status| db.jobs_by_status(status)),
    )
    .await?;

    let rows: Vec<serde_json::Value> = listings
        .into_iter()
        .flatten()
        .map(|job| {
            json!({
                "job_id": job.job_id.value(),
                "status": job.status.as_str(),
                "round": job.current_round,
                "requirement": job.requirement.chars().take(60).collect::<String>(),
            })
        })
        .collect();

    if *output == OutputFormat::Json {
        emit_output(output, "jobs", json!({"rows": rows}));
    } else {
        println!("{:<38} {:<10} {:<6} requirement", "job_id", "status", "round");
        for row in rows {
            println!(
                "{:<38} {:<10} {:<6} {}",
                row["job_id"].as_str().unwrap_or("-"),
                row["status"].as_str().unwrap_or("-"),
                row["round"],
                row["requirement"].as_str().unwrap_or("-"),
            );
        }
    }
    Ok(())
}

async fn artifacts(
    db: &ForgeDb,
    output: &OutputFormat,
    job_id: &JobId,
    path: Option<&str>,
) -> forge::Result<()> {
    let artifacts = match path {
        Some(path) => db.artifact_chain(job_id, path).await?,
        None => db.latest_artifacts(job_id).await?,
    };

    let rows: Vec<serde_json::Value> = artifacts
        .iter()
        .map(|artifact| {
            json!({
                "artifact_id": artifact.artifact_id.value(),
                "file_path": artifact.file_path,
                "type": artifact.artifact_type.as_str(),
                "language": artifact.language,
                "version": artifact.version,
                "round": artifact.generation_round,
                "generated_by": artifact.generated_by.as_str(),
                "has_errors": artifact.has_errors,
                "checksum": artifact.checksum,
            })
        })
        .collect();

    if *output == OutputFormat::Json {
        emit_output(output, "artifacts", json!({"rows": rows}));
    } else {
        println!("{:<52} {:<10} {:<4} {:<6} errors", "file_path", "type", "v", "round");
        for row in &rows {
            println!(
                "{:<52} {:<10} {:<4} {:<6} {}",
                row["file_path"].as_str().unwrap_or("-"),
                row["type"].as_str().unwrap_or("-"),
                row["version"],
                row["round"],
                row["has_errors"],
            );
        }
    }
    Ok(())
}

async fn reports(db: &ForgeDb, output: &OutputFormat, job_id: &JobId) -> forge::Result<()> {
    let reports = db.reports_for_job(job_id).await?;
    let rows: Vec<serde_json::Value> = reports
        .iter()
        .map(|report| {
            json!({
                "report_id": report.report_id.value(),
                "round": report.round,
                "validation_type": report.validation_type.as_str(),
                "passed": report.passed,
                "exit_code": report.exit_code,
                "errors": report.error_count,
                "warnings": report.warning_count,
                "duration_ms": report.duration_ms,
            })
        })
        .collect();

    if *output == OutputFormat::Json {
        emit_output(output, "reports", json!({"rows": rows}));
    } else {
        println!("{:<6} {:<18} {:<8} errors", "round", "gate", "passed");
        for row in &rows {
            println!(
                "{:<6} {:<18} {:<8} {}",
                row["round"],
                row["validation_type"].as_str().unwrap_or("-"),
                row["passed"],
                row["errors"],
            );
        }
    }
    Ok(())
}

async fn recover(db: &ForgeDb, output: &OutputFormat) -> forge::Result<()> {
    let config = forge::load_config(None).await?;
    let logs = LogStream::new();
    let recovered = recover_stale_jobs(db, &logs, config.stale_job_threshold()).await?;

    emit_output(
        output,
        "recover",
        json!({
            "message": format!("Recovered {} stale job(s)", recovered.len()),
            "job_ids": recovered.iter().map(JobId::value).collect::<Vec<_>>(),
        }),
    );
    Ok(())
}
