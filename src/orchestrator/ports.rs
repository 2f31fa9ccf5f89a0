use crate::types::{Artifact, ArtifactDraft, Job, ParsedError, SandboxProvider, ValidationType};

pub use crate::store::PortFuture;

/// Output of the architect planning phase
#[derive(Debug, Clone)]
pub struct PlanResult {
    pub contract_spec: String,
    pub schema_spec: String,
    pub initial_artifacts: Vec<ArtifactDraft>,
    pub warnings: Vec<String>,
}

impl PlanResult {
    pub fn new(contract_spec: impl Into<String>, schema_spec: impl Into<String>) -> Self {
        Self {
            contract_spec: contract_spec.into(),
            schema_spec: schema_spec.into(),
            initial_artifacts: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Layer selection for coder agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoderScope {
    Backend,
    Frontend,
}

impl CoderScope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
        }
    }
}

/// Raw result of one sandbox validation run; the orchestrator turns it into
/// a `ValidationReport`.
#[derive(Debug, Clone)]
pub struct SandboxRun {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub parsed_errors: Vec<ParsedError>,
}

/// Exclusive handle on a provisioned sandbox
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    pub sandbox_id: String,
    pub url: Option<String>,
    pub provider: SandboxProvider,
}

impl SandboxHandle {
    pub fn new(sandbox_id: impl Into<String>, provider: SandboxProvider) -> Self {
        Self {
            sandbox_id: sandbox_id.into(),
            url: None,
            provider,
        }
    }
}

/// Plans the contract and schema. Called at most once per job; any failure
/// is a fatal planning failure.
pub trait ArchitectAgent: Send + Sync {
    fn plan<'a>(
        &'a self,
        requirement: &'a str,
        template_context: Option<&'a str>,
    ) -> PortFuture<'a, PlanResult>;
}

/// Emits artifact drafts for one layer of the locked contract.
pub trait CoderAgent: Send + Sync {
    fn generate<'a>(
        &'a self,
        contract_spec: &'a str,
        schema_spec: &'a str,
        scope: CoderScope,
    ) -> PortFuture<'a, Vec<ArtifactDraft>>;
}

/// Proposes repaired versions of failing artifacts. Must not touch paths in
/// the locked contract/schema category; violating drafts are rejected.
pub trait CoachAgent: Send + Sync {
    fn repair<'a>(
        &'a self,
        failing_report: &'a crate::types::ValidationReport,
        failing_artifacts: &'a [Artifact],
        memory_context: &'a str,
    ) -> PortFuture<'a, Vec<ArtifactDraft>>;
}

/// Sandboxed build/test executor. A non-zero validation exit code is a
/// failed validation, not a port error; transport failures surface as
/// `ForgeError::ExecutorUnavailable`.
pub trait SandboxExecutor: Send + Sync {
    fn provision<'a>(&'a self, job: &'a Job) -> PortFuture<'a, SandboxHandle>;

    fn deploy<'a>(
        &'a self,
        handle: &'a SandboxHandle,
        artifacts: &'a [Artifact],
    ) -> PortFuture<'a, ()>;

    fn validate<'a>(
        &'a self,
        handle: &'a SandboxHandle,
        kind: ValidationType,
    ) -> PortFuture<'a, SandboxRun>;

    fn teardown<'a>(&'a self, handle: &'a SandboxHandle) -> PortFuture<'a, ()>;
}

/// Everything the round loop consumes, implemented by one wiring struct.
pub trait GenerationPorts:
    ArchitectAgent + CoderAgent + CoachAgent + SandboxExecutor
{
}

impl<T> GenerationPorts for T where
    T: ArchitectAgent + CoderAgent + CoachAgent + SandboxExecutor
{
}
