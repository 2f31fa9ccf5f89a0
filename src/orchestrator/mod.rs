mod cancel;
mod engine;
mod ports;
mod recovery;
mod retry;

#[cfg(test)]
mod tests;

pub use cancel::{CancelRegistry, CancelSignal};
pub use engine::{JobOutcome, Orchestrator};
pub use ports::{
    ArchitectAgent, CoachAgent, CoderAgent, CoderScope, GenerationPorts, PlanResult, PortFuture,
    SandboxExecutor, SandboxHandle, SandboxRun,
};
pub use recovery::recover_stale_jobs;
pub use retry::{call_with_retry, RETRY_BACKOFF};
