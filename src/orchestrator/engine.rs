use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::OrchestratorConfig;
use crate::diagnostics::classify_failure_category;
use crate::error::{ForgeError, Result};
use crate::logstream::LogStream;
use crate::memory::SessionMemory;
use crate::signature;
use crate::store::{ArtifactStore, JobStore, ReportStore};
use crate::types::{
    infer_artifact_type, Artifact, ArtifactDraft, Job, JobId, JobStatus, LogLevel, LogRole,
    ValidationReport, ValidationType,
};

use super::cancel::{CancelRegistry, CancelSignal};
use super::ports::{CoderScope, GenerationPorts, SandboxHandle};
use super::recovery;
use super::retry::call_with_retry;

/// Terminal verdict of one `run_job` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

/// The round loop and state machine. One instance hosts many concurrent
/// jobs; each job is driven by a single sequential task.
pub struct Orchestrator<P> {
    ports: P,
    jobs: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    reports: Arc<dyn ReportStore>,
    logs: Arc<LogStream>,
    config: OrchestratorConfig,
    cancellations: CancelRegistry,
}

impl<P> Orchestrator<P>
where
    P: GenerationPorts + Sync,
{
    pub fn new(
        ports: P,
        jobs: Arc<dyn JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        reports: Arc<dyn ReportStore>,
        logs: Arc<LogStream>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ports,
            jobs,
            artifacts,
            reports,
            logs,
            config,
            cancellations: CancelRegistry::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Requests cooperative cancellation of a running job. The next
    /// suspension point observes the signal and fails the job.
    pub async fn cancel(&self, job_id: &JobId) -> bool {
        self.cancellations.cancel(job_id).await
    }

    /// Fails running jobs abandoned by a previous orchestrator process.
    pub async fn recover_stale_jobs(&self) -> Result<Vec<JobId>> {
        recovery::recover_stale_jobs(
            self.jobs.as_ref(),
            &self.logs,
            self.config.stale_job_threshold(),
        )
        .await
    }

    /// Drives one queued job to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure faults outside the job
    /// lifecycle (missing job, wrong initial status, store failures while
    /// recording the verdict). Agent, sandbox and budget failures are
    /// absorbed into `JobOutcome::Failed`.
    pub async fn run_job(&self, job_id: &JobId) -> Result<JobOutcome> {
        let mut job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| ForgeError::JobNotFound(job_id.value().to_string()))?;
        if job.status != JobStatus::Queued {
            return Err(ForgeError::InvalidTransition {
                from: job.status.as_str().to_string(),
                to: JobStatus::Planning.as_str().to_string(),
            });
        }

        let cancel = self.cancellations.register(job_id).await;
        let heartbeat = self
            .logs
            .spawn_heartbeat(job_id.clone(), self.config.heartbeat_interval());

        let mut sandbox: Option<SandboxHandle> = None;
        let driven = self.drive(&mut job, &cancel, &mut sandbox).await;

        let outcome = match driven {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail_job(&mut job, &err).await?;
                JobOutcome::Failed
            }
        };

        if let Some(handle) = &sandbox {
            self.teardown_sandbox(&job.job_id, handle).await;
        }
        heartbeat.abort();
        self.logs.close(job_id).await;
        self.cancellations.remove(job_id).await;
        Ok(outcome)
    }

    async fn drive(
        &self,
        job: &mut Job,
        cancel: &CancelSignal,
        sandbox: &mut Option<SandboxHandle>,
    ) -> Result<JobOutcome> {
        self.plan_phase(job, cancel).await?;
        self.coding_phase(job, cancel).await?;
        self.testing_phase(job, cancel, sandbox).await
    }

    /// Phase 2: architect plans the contract, specs are persisted and
    /// locked, initial artifacts stored.
    async fn plan_phase(&self, job: &mut Job, cancel: &CancelSignal) -> Result<()> {
        self.transition_and_store(job, JobStatus::Planning).await?;
        self.log(job, LogRole::System, LogLevel::Info, "Planning started")
            .await;

        let requirement = job.requirement.clone();
        let template_context = job.template_context.clone();
        let plan = call_with_retry(
            "architect plan",
            self.config.agent_timeout(),
            || {
                self.ports
                    .plan(&requirement, template_context.as_deref())
            },
            ForgeError::AgentUnavailable,
        )
        .await
        .map_err(|err| match err {
            ForgeError::AgentUnavailable(_) | ForgeError::PlanFailed(_) => err,
            other => ForgeError::PlanFailed(other.to_string()),
        })?;

        for warning in &plan.warnings {
            self.log(job, LogRole::Architect, LogLevel::Warn, warning).await;
        }

        job.set_specs(plan.contract_spec, plan.schema_spec)?;
        self.jobs.update_job(job).await?;
        self.jobs.lock_contract(&job.job_id).await?;
        job.lock_contract();
        self.log(job, LogRole::Architect, LogLevel::Info, "Contract locked")
            .await;

        for draft in &plan.initial_artifacts {
            self.persist_draft(job, draft, 0).await?;
        }
        self.check_cancel(cancel)
    }

    /// Phase 3: backend and frontend coders emit the round-0 snapshot.
    async fn coding_phase(&self, job: &mut Job, cancel: &CancelSignal) -> Result<()> {
        self.transition_and_store(job, JobStatus::Coding).await?;

        for scope in [CoderScope::Backend, CoderScope::Frontend] {
            let contract_spec = job.contract_spec.clone();
            let schema_spec = job.schema_spec.clone();
            let drafts = call_with_retry(
                "coder generate",
                self.config.agent_timeout(),
                || self.ports.generate(&contract_spec, &schema_spec, scope),
                ForgeError::AgentUnavailable,
            )
            .await?;

            self.log(
                job,
                LogRole::Player,
                LogLevel::Info,
                format!("{} coder produced {} artifacts", scope.as_str(), drafts.len()),
            )
            .await;
            for draft in &drafts {
                self.persist_draft(job, draft, 0).await?;
            }
            self.check_cancel(cancel)?;
        }
        Ok(())
    }

    /// Phase 4: the validate-and-repair loop.
    async fn testing_phase(
        &self,
        job: &mut Job,
        cancel: &CancelSignal,
        sandbox: &mut Option<SandboxHandle>,
    ) -> Result<JobOutcome> {
        self.transition_and_store(job, JobStatus::Testing).await?;

        let handle = call_with_retry(
            "sandbox provision",
            self.config.sandbox_validate_timeout(),
            || self.ports.provision(job),
            ForgeError::ExecutorUnavailable,
        )
        .await?;
        job.sandbox_id = Some(handle.sandbox_id.clone());
        job.sandbox_url = handle.url.clone();
        job.sandbox_provider = Some(handle.provider);
        self.jobs.update_job(job).await?;
        *sandbox = Some(handle.clone());

        let mut memory = SessionMemory::with_limits(
            job.job_id.clone(),
            self.config.max_history_size,
            self.config.max_same_error_tolerance,
        );
        let mut previous_failing_gate: Option<ValidationType> = None;

        loop {
            self.check_cancel(cancel)?;

            let snapshot = self.artifacts.list_latest(&job.job_id).await?;
            call_with_retry(
                "sandbox deploy",
                self.config.sandbox_deploy_timeout(),
                || self.ports.deploy(&handle, &snapshot),
                ForgeError::ExecutorUnavailable,
            )
            .await?;

            let Some(report) = self.run_gates(job, &handle).await? else {
                for artifact in &snapshot {
                    self.artifacts.mark_valid(&artifact.artifact_id).await?;
                }
                self.transition_and_store(job, JobStatus::Completed).await?;
                self.log(
                    job,
                    LogRole::System,
                    LogLevel::Success,
                    "All validations passed, generation complete",
                )
                .await;
                return Ok(JobOutcome::Completed);
            };

            let output = report.combined_output();
            for path in report.failing_files() {
                if let Some(artifact) = snapshot.iter().find(|a| a.file_path == path) {
                    self.artifacts
                        .mark_error(&artifact.artifact_id, &output)
                        .await?;
                }
            }

            // A later failing gate than last round means the previous
            // repair cleared the gate it was aimed at.
            if previous_failing_gate.is_some_and(|previous| report.validation_type > previous) {
                memory.mark_last_attempt_succeeded();
            }
            previous_failing_gate = Some(report.validation_type);

            let sig = signature::compute_combined(&output, &report.parsed_errors);
            let description = signature::describe(&output);
            let stuck = memory.record_error_signature(&sig);

            if stuck || memory.should_terminate() || job.current_round >= job.max_rounds {
                let reason = if stuck {
                    "consecutive identical errors"
                } else if job.current_round >= job.max_rounds {
                    "round budget exhausted"
                } else {
                    "all attempts unsuccessful"
                };
                job.set_last_error(&description);
                self.transition_and_store(job, JobStatus::Failed).await?;
                self.log(
                    job,
                    LogRole::System,
                    LogLevel::Error,
                    format!("Generation failed: {reason} ({description})"),
                )
                .await;
                return Ok(JobOutcome::Failed);
            }

            let touched = self
                .repair_round(job, cancel, &memory, &report, &snapshot, &sig, &description)
                .await?;
            memory.record_attempt(job.current_round, touched, false, sig, description, "");
        }
    }

    /// One coach repair round. Drafts for locked contract paths are
    /// rejected; remaining drafts become new artifact versions. Returns the
    /// paths actually touched.
    async fn repair_round(
        &self,
        job: &mut Job,
        cancel: &CancelSignal,
        memory: &SessionMemory,
        report: &ValidationReport,
        snapshot: &[Artifact],
        sig: &str,
        description: &str,
    ) -> Result<Vec<String>> {
        job.advance_round()?;
        self.jobs.update_job(job).await?;
        self.log(
            job,
            LogRole::System,
            LogLevel::Info,
            format!(
                "Repair round {} of {} ({}, signature {})",
                job.current_round, job.max_rounds, description, sig
            ),
        )
        .await;

        let failing_paths = report.failing_files();
        let failing_artifacts: Vec<Artifact> = snapshot
            .iter()
            .filter(|artifact| failing_paths.contains(&artifact.file_path))
            .cloned()
            .collect();
        let context = memory.build_coach_context();

        let drafts = call_with_retry(
            "coach repair",
            self.config.agent_timeout(),
            || self.ports.repair(report, &failing_artifacts, &context),
            ForgeError::AgentUnavailable,
        )
        .await?;

        // A cancel observed here discards the coach output entirely.
        self.check_cancel(cancel)?;

        if drafts.is_empty() {
            self.log(
                job,
                LogRole::Coach,
                LogLevel::Warn,
                "Coach returned no drafts; counting a no-op repair round",
            )
            .await;
            return Ok(Vec::new());
        }

        let mut touched: Vec<String> = Vec::new();
        for draft in &drafts {
            if infer_artifact_type(&draft.file_path).is_contract_surface() {
                error!(
                    "Coach draft for locked contract path rejected: {}",
                    draft.file_path
                );
                self.log(
                    job,
                    LogRole::System,
                    LogLevel::Error,
                    format!(
                        "Rejected repair draft for locked contract path {}",
                        draft.file_path
                    ),
                )
                .await;
                continue;
            }
            self.persist_draft(job, draft, job.current_round).await?;
            if !touched.contains(&draft.file_path) {
                touched.push(draft.file_path.clone());
            }
        }

        self.log(
            job,
            LogRole::Coach,
            LogLevel::Info,
            format!(
                "Applied {} repair draft(s) in round {}",
                touched.len(),
                job.current_round
            ),
        )
        .await;
        Ok(touched)
    }

    /// Runs the configured gates in fixed order, short-circuiting on the
    /// first failure. Returns the failing report, or `None` when every
    /// configured gate passed.
    async fn run_gates(
        &self,
        job: &Job,
        handle: &SandboxHandle,
    ) -> Result<Option<ValidationReport>> {
        let mut gates = vec![ValidationType::Compile, ValidationType::UnitTest];
        if job.enable_integration_tests || self.config.enable_integration_tests {
            gates.push(ValidationType::IntegrationTest);
        }

        for kind in gates {
            let run = call_with_retry(
                "sandbox validate",
                self.config.sandbox_validate_timeout(),
                || self.ports.validate(handle, kind),
                ForgeError::ExecutorUnavailable,
            )
            .await?;

            let report = ValidationReport::from_run(
                job.job_id.clone(),
                job.current_round,
                kind,
                run.command,
                run.exit_code,
                run.stdout,
                run.stderr,
                run.duration_ms,
                run.parsed_errors,
            );
            self.reports.insert(&report).await?;

            if report.passed {
                self.log(
                    job,
                    LogRole::Executor,
                    LogLevel::Info,
                    format!("{kind} passed in {} ms", report.duration_ms),
                )
                .await;
            } else {
                self.log(
                    job,
                    LogRole::Executor,
                    LogLevel::Error,
                    format!(
                        "{kind} failed with {} error(s), exit code {}",
                        report.error_count, report.exit_code
                    ),
                )
                .await;
                return Ok(Some(report));
            }
        }
        Ok(None)
    }

    /// Persists a draft: first version of a new path, or the next version
    /// of an existing chain.
    async fn persist_draft(&self, job: &Job, draft: &ArtifactDraft, round: u32) -> Result<()> {
        let chain = self
            .artifacts
            .list_by_path(&job.job_id, &draft.file_path)
            .await?;
        match chain.last() {
            Some(head) => {
                self.artifacts
                    .new_version(&head.artifact_id, &draft.content, draft.generated_by)
                    .await?;
            }
            None => {
                self.artifacts
                    .create(
                        &job.job_id,
                        &draft.file_path,
                        &draft.content,
                        draft.generated_by,
                        round,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn transition_and_store(&self, job: &mut Job, next: JobStatus) -> Result<()> {
        job.transition(next)?;
        self.jobs.update_job(job).await?;
        info!("Job {} entered {}", job.job_id, next);
        Ok(())
    }

    /// Records the exceptional unwind: any unhandled failure moves the job
    /// to FAILED with a short error tag.
    async fn fail_job(&self, job: &mut Job, err: &ForgeError) -> Result<()> {
        if job.is_finished() {
            return Ok(());
        }
        let tag = short_error_tag(err);
        warn!("Job {} failed: {}", job.job_id, err);
        job.record_error(&tag);
        if !job.status.can_transition(JobStatus::Failed) {
            // The job never left the queue; leave it for the recovery sweep.
            self.jobs.update_job(job).await?;
            return Ok(());
        }
        job.transition(JobStatus::Failed)?;
        self.jobs.update_job(job).await?;
        self.log(
            job,
            LogRole::System,
            LogLevel::Error,
            format!("Job failed ({}): {tag}", classify_failure_category(&tag)),
        )
        .await;
        Ok(())
    }

    async fn teardown_sandbox(&self, job_id: &JobId, handle: &SandboxHandle) {
        if let Err(err) = self.ports.teardown(handle).await {
            warn!("Sandbox teardown failed for job {}: {}", job_id, err);
        }
        self.logs
            .append(
                job_id,
                LogRole::Executor,
                LogLevel::Info,
                format!("Sandbox {} torn down", handle.sandbox_id),
            )
            .await;
    }

    fn check_cancel(&self, cancel: &CancelSignal) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }
        Ok(())
    }

    async fn log(
        &self,
        job: &Job,
        role: LogRole,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        self.logs.append(&job.job_id, role, level, message).await;
    }
}

/// Short tag stored in `job.last_error`.
fn short_error_tag(err: &ForgeError) -> String {
    match err {
        ForgeError::Cancelled => "cancelled".to_string(),
        ForgeError::ExecutorUnavailable(_) => "executor unavailable".to_string(),
        ForgeError::AgentUnavailable(_) => "agent unavailable".to_string(),
        ForgeError::PlanFailed(message) => format!("planning failed: {message}"),
        other => {
            let full = other.to_string();
            full.chars().take(200).collect()
        }
    }
}
