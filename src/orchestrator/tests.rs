#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use super::{
    ArchitectAgent, CoachAgent, CoderAgent, CoderScope, GenerationPorts, JobOutcome, Orchestrator,
    PlanResult, PortFuture, SandboxExecutor, SandboxHandle, SandboxRun,
};
use crate::config::OrchestratorConfig;
use crate::error::ForgeError;
use crate::logstream::LogStream;
use crate::store::{
    ArtifactStore, InMemoryArtifactStore, InMemoryJobStore, InMemoryReportStore, JobStore,
    ReportStore,
};
use crate::types::{
    Artifact, ArtifactDraft, GeneratedBy, Job, JobId, JobStatus, ParsedError, SandboxProvider,
    Severity, TenantId, UserId, ValidationReport, ValidationType,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

const SERVICE_PATH: &str = "src/main/java/com/acme/service/BookService.java";

#[derive(Debug, Clone)]
enum ScriptedValidation {
    Run(SandboxRun),
    Unavailable,
}

#[derive(Clone)]
struct FakePorts {
    plan_failure: Option<String>,
    backend_drafts: Vec<ArtifactDraft>,
    frontend_drafts: Vec<ArtifactDraft>,
    validations: Arc<Mutex<VecDeque<ScriptedValidation>>>,
    repairs: Arc<Mutex<VecDeque<Vec<ArtifactDraft>>>>,
    deploy_count: Arc<Mutex<u32>>,
    teardown_count: Arc<Mutex<u32>>,
    repair_entered: Arc<Notify>,
    repair_release: Arc<Notify>,
    hold_repair: bool,
}

impl FakePorts {
    fn new() -> Self {
        Self {
            plan_failure: None,
            backend_drafts: backend_snapshot(),
            frontend_drafts: frontend_snapshot(),
            validations: Arc::new(Mutex::new(VecDeque::new())),
            repairs: Arc::new(Mutex::new(VecDeque::new())),
            deploy_count: Arc::new(Mutex::new(0)),
            teardown_count: Arc::new(Mutex::new(0)),
            repair_entered: Arc::new(Notify::new()),
            repair_release: Arc::new(Notify::new()),
            hold_repair: false,
        }
    }

    async fn script_validations(&self, scripted: Vec<ScriptedValidation>) {
        let mut validations = self.validations.lock().await;
        validations.extend(scripted);
    }

    async fn script_repairs(&self, scripted: Vec<Vec<ArtifactDraft>>) {
        let mut repairs = self.repairs.lock().await;
        repairs.extend(scripted);
    }

    async fn teardowns(&self) -> u32 {
        *self.teardown_count.lock().await
    }
}

impl ArchitectAgent for FakePorts {
    fn plan<'a>(
        &'a self,
        _requirement: &'a str,
        _template_context: Option<&'a str>,
    ) -> PortFuture<'a, PlanResult> {
        Box::pin(async move {
            if let Some(message) = &self.plan_failure {
                return Err(ForgeError::PlanFailed(message.clone()));
            }
            Ok(PlanResult::new(
                "openapi: 3.0.0\npaths:\n  /books: {}",
                "CREATE TABLE book (id BIGINT PRIMARY KEY);",
            ))
        })
    }
}

impl CoderAgent for FakePorts {
    fn generate<'a>(
        &'a self,
        _contract_spec: &'a str,
        _schema_spec: &'a str,
        scope: CoderScope,
    ) -> PortFuture<'a, Vec<ArtifactDraft>> {
        Box::pin(async move {
            Ok(match scope {
                CoderScope::Backend => self.backend_drafts.clone(),
                CoderScope::Frontend => self.frontend_drafts.clone(),
            })
        })
    }
}

impl CoachAgent for FakePorts {
    fn repair<'a>(
        &'a self,
        _failing_report: &'a ValidationReport,
        _failing_artifacts: &'a [Artifact],
        _memory_context: &'a str,
    ) -> PortFuture<'a, Vec<ArtifactDraft>> {
        Box::pin(async move {
            if self.hold_repair {
                self.repair_entered.notify_one();
                self.repair_release.notified().await;
            }
            let mut repairs = self.repairs.lock().await;
            Ok(repairs.pop_front().unwrap_or_default())
        })
    }
}

impl SandboxExecutor for FakePorts {
    fn provision<'a>(&'a self, _job: &'a Job) -> PortFuture<'a, SandboxHandle> {
        Box::pin(async move { Ok(SandboxHandle::new("sbx-1", SandboxProvider::Local)) })
    }

    fn deploy<'a>(
        &'a self,
        _handle: &'a SandboxHandle,
        _artifacts: &'a [Artifact],
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            *self.deploy_count.lock().await += 1;
            Ok(())
        })
    }

    fn validate<'a>(
        &'a self,
        _handle: &'a SandboxHandle,
        kind: ValidationType,
    ) -> PortFuture<'a, SandboxRun> {
        Box::pin(async move {
            let mut validations = self.validations.lock().await;
            match validations.pop_front() {
                Some(ScriptedValidation::Run(run)) => Ok(run),
                Some(ScriptedValidation::Unavailable) => Err(ForgeError::ExecutorUnavailable(
                    "sandbox unreachable".to_string(),
                )),
                None => Ok(passing_run(kind)),
            }
        })
    }

    fn teardown<'a>(&'a self, _handle: &'a SandboxHandle) -> PortFuture<'a, ()> {
        Box::pin(async move {
            *self.teardown_count.lock().await += 1;
            Ok(())
        })
    }
}

fn assert_ports_contract<T: GenerationPorts>() {}

fn backend_snapshot() -> Vec<ArtifactDraft> {
    assert_ports_contract::<FakePorts>();
    [
        "src/main/java/com/acme/entity/Book.java",
        "src/main/java/com/acme/mapper/BookMapper.java",
        SERVICE_PATH,
        "src/main/java/com/acme/controller/BookController.java",
        "src/main/resources/config/application.yml",
        "src/test/java/com/acme/BookServiceTest.java",
    ]
    .iter()
    .map(|path| ArtifactDraft::new(*path, "// generated", GeneratedBy::BackendCoder))
    .collect()
}

fn frontend_snapshot() -> Vec<ArtifactDraft> {
    vec![
        ArtifactDraft::new("web/src/pages/Books.tsx", "export {}", GeneratedBy::FrontendCoder),
        ArtifactDraft::new("web/src/api/client.ts", "export {}", GeneratedBy::FrontendCoder),
    ]
}

fn passing_run(kind: ValidationType) -> SandboxRun {
    SandboxRun {
        command: format!("mvn {}", kind.as_str()),
        exit_code: 0,
        stdout: "BUILD SUCCESS".to_string(),
        stderr: String::new(),
        duration_ms: 120,
        parsed_errors: vec![],
    }
}

fn failing_run(kind: ValidationType, message: &str) -> SandboxRun {
    SandboxRun {
        command: format!("mvn {}", kind.as_str()),
        exit_code: 1,
        stdout: format!("[ERROR] {SERVICE_PATH}:[12,5] {message}"),
        stderr: String::new(),
        duration_ms: 340,
        parsed_errors: vec![ParsedError::new(
            Some(SERVICE_PATH.to_string()),
            Some(12),
            Some(5),
            message,
            Severity::Error,
        )],
    }
}

fn symbol_failure(kind: ValidationType) -> SandboxRun {
    failing_run(kind, "cannot find symbol: class BookRepository")
}

struct Harness {
    orchestrator: Orchestrator<FakePorts>,
    ports: FakePorts,
    jobs: Arc<InMemoryJobStore>,
    artifacts: Arc<InMemoryArtifactStore>,
    reports: Arc<InMemoryReportStore>,
    logs: Arc<LogStream>,
}

impl Harness {
    fn new(ports: FakePorts, config: OrchestratorConfig) -> Self {
        let jobs = Arc::new(InMemoryJobStore::new());
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let reports = Arc::new(InMemoryReportStore::new());
        let logs = Arc::new(LogStream::new());
        let orchestrator = Orchestrator::new(
            ports.clone(),
            jobs.clone(),
            artifacts.clone(),
            reports.clone(),
            logs.clone(),
            config,
        );
        Self {
            orchestrator,
            ports,
            jobs,
            artifacts,
            reports,
            logs,
        }
    }

    async fn queue_job(&self, id: &str, max_rounds: u32) -> JobId {
        let job = Job::new(
            JobId::new(id),
            "simple CRUD for a Book entity",
            TenantId::new("tenant-1"),
            UserId::new("user-1"),
            max_rounds,
        )
        .unwrap();
        self.jobs.create_job(&job).await.unwrap();
        job.job_id
    }

    async fn job(&self, job_id: &JobId) -> Job {
        self.jobs.get_job(job_id).await.unwrap().unwrap()
    }

    async fn log_messages(&self, job_id: &JobId) -> Vec<String> {
        self.logs
            .backlog(job_id)
            .await
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }
}

#[tokio::test]
async fn happy_path_completes_in_round_zero() {
    let harness = Harness::new(FakePorts::new(), OrchestratorConfig::default());
    let job_id = harness.queue_job("job-happy", 3).await;

    let outcome = harness.orchestrator.run_job(&job_id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);

    let job = harness.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.current_round, 0);
    assert!(job.contract_locked);
    assert!(job.completed_at.is_some());
    assert_eq!(job.sandbox_id.as_deref(), Some("sbx-1"));

    let latest = harness.artifacts.list_latest(&job_id).await.unwrap();
    assert_eq!(latest.len(), 8);
    assert!(latest.iter().all(|artifact| artifact.version == 1));
    assert!(latest.iter().all(|artifact| !artifact.has_errors));

    let reports = harness.reports.list_for_job(&job_id).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| report.passed));
    assert_eq!(reports[0].validation_type, ValidationType::Compile);
    assert_eq!(reports[1].validation_type, ValidationType::UnitTest);

    assert_eq!(harness.ports.teardowns().await, 1);
}

#[tokio::test]
async fn one_round_repair_recovers_and_completes() {
    let ports = FakePorts::new();
    ports
        .script_validations(vec![ScriptedValidation::Run(symbol_failure(
            ValidationType::Compile,
        ))])
        .await;
    ports
        .script_repairs(vec![vec![ArtifactDraft::new(
            SERVICE_PATH,
            "// repaired: added missing import",
            GeneratedBy::Coach,
        )]])
        .await;

    let harness = Harness::new(ports, OrchestratorConfig::default());
    let job_id = harness.queue_job("job-repair", 3).await;

    let outcome = harness.orchestrator.run_job(&job_id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);

    let job = harness.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.current_round, 1);

    let chain = harness
        .artifacts
        .list_by_path(&job_id, SERVICE_PATH)
        .await
        .unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].generated_by, GeneratedBy::Coach);

    let reports = harness.reports.list_for_job(&job_id).await.unwrap();
    assert_eq!(reports.len(), 3);
    assert!(!reports[0].passed);
    assert!(reports[1].passed);
    assert!(reports[2].passed);
}

#[tokio::test]
async fn repeated_identical_errors_terminate_the_job() {
    let ports = FakePorts::new();
    ports
        .script_validations(vec![
            ScriptedValidation::Run(failing_run(
                ValidationType::Compile,
                "incompatible types: String cannot be converted to int",
            )),
            ScriptedValidation::Run(symbol_failure(ValidationType::Compile)),
            ScriptedValidation::Run(symbol_failure(ValidationType::Compile)),
        ])
        .await;
    let wrong_fix = vec![ArtifactDraft::new(
        SERVICE_PATH,
        "// the same wrong fix",
        GeneratedBy::Coach,
    )];
    ports
        .script_repairs(vec![wrong_fix.clone(), wrong_fix])
        .await;

    let harness = Harness::new(ports, OrchestratorConfig::default());
    let job_id = harness.queue_job("job-stuck", 3).await;

    let outcome = harness.orchestrator.run_job(&job_id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed);

    let job = harness.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.current_round, 2);
    assert!(job.last_error.as_deref().unwrap().contains("symbol not found"));

    let messages = harness.log_messages(&job_id).await;
    assert!(messages
        .iter()
        .any(|message| message.contains("consecutive identical errors")));
}

#[tokio::test]
async fn round_budget_exhaustion_terminates_the_job() {
    let ports = FakePorts::new();
    ports
        .script_validations(vec![
            ScriptedValidation::Run(failing_run(
                ValidationType::Compile,
                "incompatible types: String cannot be converted to int",
            )),
            ScriptedValidation::Run(failing_run(
                ValidationType::Compile,
                "missing return statement",
            )),
            ScriptedValidation::Run(failing_run(
                ValidationType::Compile,
                "illegal start of expression",
            )),
            ScriptedValidation::Run(failing_run(
                ValidationType::Compile,
                "unreported exception java.io.IOException",
            )),
        ])
        .await;
    ports
        .script_repairs(vec![
            vec![ArtifactDraft::new(SERVICE_PATH, "// fix 1", GeneratedBy::Coach)],
            vec![ArtifactDraft::new(SERVICE_PATH, "// fix 2", GeneratedBy::Coach)],
            vec![ArtifactDraft::new(SERVICE_PATH, "// fix 3", GeneratedBy::Coach)],
        ])
        .await;

    let harness = Harness::new(ports, OrchestratorConfig::default());
    let job_id = harness.queue_job("job-budget", 3).await;

    let outcome = harness.orchestrator.run_job(&job_id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed);

    let job = harness.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.current_round, 3);

    let messages = harness.log_messages(&job_id).await;
    assert!(messages
        .iter()
        .any(|message| message.contains("round budget exhausted")));
}

#[tokio::test(start_paused = true)]
async fn executor_outage_fails_after_retry_budget() {
    let ports = FakePorts::new();
    ports
        .script_validations(vec![
            ScriptedValidation::Unavailable,
            ScriptedValidation::Unavailable,
            ScriptedValidation::Unavailable,
        ])
        .await;

    let harness = Harness::new(ports, OrchestratorConfig::default());
    let job_id = harness.queue_job("job-outage", 3).await;

    let outcome = harness.orchestrator.run_job(&job_id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed);

    let job = harness.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error.as_deref(), Some("executor unavailable"));
    assert!(job.error_count >= 1);
    assert_eq!(harness.ports.teardowns().await, 1);
}

#[tokio::test]
async fn cancel_during_repair_discards_coach_output() {
    let mut ports = FakePorts::new();
    ports.hold_repair = true;
    ports
        .script_validations(vec![ScriptedValidation::Run(symbol_failure(
            ValidationType::Compile,
        ))])
        .await;
    ports
        .script_repairs(vec![vec![ArtifactDraft::new(
            SERVICE_PATH,
            "// repair that must be discarded",
            GeneratedBy::Coach,
        )]])
        .await;

    let harness = Harness::new(ports.clone(), OrchestratorConfig::default());
    let job_id = harness.queue_job("job-cancel", 3).await;

    let orchestrator = Arc::new(harness.orchestrator);
    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        let job_id = job_id.clone();
        tokio::spawn(async move { orchestrator.run_job(&job_id).await })
    };

    // Cancel while the coach call is in flight, then let it finish.
    ports.repair_entered.notified().await;
    assert!(orchestrator.cancel(&job_id).await);
    ports.repair_release.notify_one();

    let outcome = runner.await.unwrap().unwrap();
    assert_eq!(outcome, JobOutcome::Failed);

    let job = harness.jobs.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error.as_deref(), Some("cancelled"));

    let chain = harness
        .artifacts
        .list_by_path(&job_id, SERVICE_PATH)
        .await
        .unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(harness.ports.teardowns().await, 1);
}

#[tokio::test]
async fn planning_failure_fails_the_job() {
    let mut ports = FakePorts::new();
    ports.plan_failure = Some("no usable contract".to_string());

    let harness = Harness::new(ports, OrchestratorConfig::default());
    let job_id = harness.queue_job("job-planfail", 3).await;

    let outcome = harness.orchestrator.run_job(&job_id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed);

    let job = harness.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .last_error
        .as_deref()
        .unwrap()
        .starts_with("planning failed"));
    // Planning never reached the sandbox.
    assert_eq!(harness.ports.teardowns().await, 0);
}

#[tokio::test]
async fn coach_drafts_for_contract_paths_are_rejected() {
    let ports = FakePorts::new();
    ports
        .script_validations(vec![ScriptedValidation::Run(symbol_failure(
            ValidationType::Compile,
        ))])
        .await;
    ports
        .script_repairs(vec![vec![
            ArtifactDraft::new("api/openapi.yaml", "rewritten contract", GeneratedBy::Coach),
            ArtifactDraft::new(SERVICE_PATH, "// legitimate fix", GeneratedBy::Coach),
        ]])
        .await;

    let harness = Harness::new(ports, OrchestratorConfig::default());
    let job_id = harness.queue_job("job-violation", 3).await;

    let outcome = harness.orchestrator.run_job(&job_id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);

    // The contract draft never became an artifact.
    let contract_chain = harness
        .artifacts
        .list_by_path(&job_id, "api/openapi.yaml")
        .await
        .unwrap();
    assert!(contract_chain.is_empty());

    let messages = harness.log_messages(&job_id).await;
    assert!(messages
        .iter()
        .any(|message| message.contains("locked contract path")));
}

#[tokio::test]
async fn noop_repairs_still_terminate_within_tolerance() {
    let ports = FakePorts::new();
    ports
        .script_validations(vec![
            ScriptedValidation::Run(symbol_failure(ValidationType::Compile)),
            ScriptedValidation::Run(symbol_failure(ValidationType::Compile)),
        ])
        .await;
    // No scripted repairs: the coach returns zero drafts every round.

    let harness = Harness::new(ports, OrchestratorConfig::default());
    let job_id = harness.queue_job("job-noop", 3).await;

    let outcome = harness.orchestrator.run_job(&job_id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed);

    let job = harness.job(&job_id).await;
    assert_eq!(job.current_round, 1);
    let messages = harness.log_messages(&job_id).await;
    assert!(messages
        .iter()
        .any(|message| message.contains("consecutive identical errors")));
}

#[tokio::test]
async fn integration_gate_runs_when_enabled() {
    let ports = FakePorts::new();
    let config = OrchestratorConfig {
        enable_integration_tests: true,
        ..OrchestratorConfig::default()
    };
    let harness = Harness::new(ports, config);
    let job_id = harness.queue_job("job-integration", 3).await;

    let outcome = harness.orchestrator.run_job(&job_id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);

    let reports = harness.reports.list_for_job(&job_id).await.unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(
        reports[2].validation_type,
        ValidationType::IntegrationTest
    );
}

#[tokio::test]
async fn run_job_requires_a_queued_job() {
    let harness = Harness::new(FakePorts::new(), OrchestratorConfig::default());
    let job_id = harness.queue_job("job-twice", 3).await;

    harness.orchestrator.run_job(&job_id).await.unwrap();
    let second = harness.orchestrator.run_job(&job_id).await;
    assert!(matches!(second, Err(ForgeError::InvalidTransition { .. })));
}
