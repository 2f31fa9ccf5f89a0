use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ForgeError, Result};

use super::identifiers::{JobId, TenantId, UserId};
use super::submission::JobSubmission;

/// Generation job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Planning,
    Coding,
    Testing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Planning => "planning",
            Self::Coding => "coding",
            Self::Testing => "testing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Planning | Self::Coding | Self::Testing)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving to `next` is a legal edge of the job state machine.
    pub fn can_transition(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Planning)
                | (Self::Planning, Self::Coding | Self::Failed)
                | (Self::Coding, Self::Testing | Self::Failed)
                | (Self::Testing, Self::Testing | Self::Completed | Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "queued" => Ok(Self::Queued),
            "planning" => Ok(Self::Planning),
            "coding" => Ok(Self::Coding),
            "testing" => Ok(Self::Testing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Sandbox backend provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SandboxProvider {
    E2b,
    Docker,
    Local,
}

impl SandboxProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E2b => "e2b",
            Self::Docker => "docker",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for SandboxProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SandboxProvider {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "e2b" => Ok(Self::E2b),
            "docker" => Ok(Self::Docker),
            "local" => Ok(Self::Local),
            _ => Err(format!("Unknown sandbox provider: {}", s)),
        }
    }
}

/// Durable generation job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub requirement: String,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub template_context: Option<String>,
    pub status: JobStatus,
    pub current_round: u32,
    pub max_rounds: u32,
    pub enable_integration_tests: bool,
    pub contract_spec: String,
    pub schema_spec: String,
    pub contract_locked: bool,
    pub contract_locked_at: Option<DateTime<Utc>>,
    pub sandbox_id: Option<String>,
    pub sandbox_url: Option<String>,
    pub sandbox_provider: Option<SandboxProvider>,
    pub last_error: Option<String>,
    pub error_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a queued job with empty contract and schema specs.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::ConfigError` when `max_rounds` is zero or the
    /// requirement is blank.
    pub fn new(
        job_id: JobId,
        requirement: impl Into<String>,
        tenant_id: TenantId,
        user_id: UserId,
        max_rounds: u32,
    ) -> Result<Self> {
        let requirement = requirement.into();
        if requirement.trim().is_empty() {
            return Err(ForgeError::ConfigError(
                "Job requirement must not be empty".to_string(),
            ));
        }
        if max_rounds == 0 {
            return Err(ForgeError::ConfigError(
                "max_rounds must be greater than zero".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            job_id,
            requirement,
            tenant_id,
            user_id,
            template_context: None,
            status: JobStatus::Queued,
            current_round: 0,
            max_rounds,
            enable_integration_tests: false,
            contract_spec: String::new(),
            schema_spec: String::new(),
            contract_locked: false,
            contract_locked_at: None,
            sandbox_id: None,
            sandbox_url: None,
            sandbox_provider: None,
            last_error: None,
            error_count: 0,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Builds a queued job from an ingress submission, applying per-job
    /// overrides over the given defaults.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Job::new`].
    pub fn from_submission(
        job_id: JobId,
        submission: &JobSubmission,
        default_max_rounds: u32,
        default_integration_tests: bool,
    ) -> Result<Self> {
        let mut job = Self::new(
            job_id,
            submission.requirement.clone(),
            submission.tenant_id.clone(),
            submission.user_id.clone(),
            submission.effective_max_rounds(default_max_rounds),
        )?;
        job.template_context = submission.template_context.clone();
        job.enable_integration_tests =
            submission.integration_tests_enabled(default_integration_tests);
        Ok(job)
    }

    /// Moves the job along a legal state-machine edge.
    ///
    /// Sets `completed_at` on entry to a terminal state and `started_at`
    /// when leaving the queue.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::InvalidTransition` for any edge outside the DAG.
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition(next) {
            return Err(ForgeError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        let now = Utc::now();
        if self.status == JobStatus::Queued {
            self.started_at = Some(now);
        }
        if next.is_finished() {
            self.completed_at = Some(now);
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Stores the architect's contract and schema specs.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::ContractLocked` once the contract is locked.
    pub fn set_specs(
        &mut self,
        contract_spec: impl Into<String>,
        schema_spec: impl Into<String>,
    ) -> Result<()> {
        if self.contract_locked {
            return Err(ForgeError::ContractLocked(self.job_id.value().to_string()));
        }
        self.contract_spec = contract_spec.into();
        self.schema_spec = schema_spec.into();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Locks the contract. Idempotent.
    pub fn lock_contract(&mut self) {
        if !self.contract_locked {
            self.contract_locked = true;
            self.contract_locked_at = Some(Utc::now());
            self.updated_at = Utc::now();
        }
    }

    /// Advances the repair round counter.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::Internal` when the round budget would be exceeded.
    pub fn advance_round(&mut self) -> Result<()> {
        if self.current_round >= self.max_rounds {
            return Err(ForgeError::Internal(format!(
                "Round budget exhausted for job {}",
                self.job_id
            )));
        }
        self.current_round += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Sets `last_error` without counting it. Used for terminal verdicts.
    pub fn set_last_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.updated_at = Utc::now();
    }

    /// Records a counted error, e.g. an exhausted transport budget.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_count += 1;
        self.set_last_error(message);
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(
            JobId::new("job-1"),
            "simple CRUD for a Book entity",
            TenantId::new("t-1"),
            UserId::new("u-1"),
            3,
        )
        .unwrap()
    }

    #[test]
    fn new_job_rejects_zero_round_budget() {
        let result = Job::new(
            JobId::new("job-1"),
            "req",
            TenantId::new("t"),
            UserId::new("u"),
            0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn legal_path_reaches_completed() {
        let mut job = job();
        job.transition(JobStatus::Planning).unwrap();
        job.transition(JobStatus::Coding).unwrap();
        job.transition(JobStatus::Testing).unwrap();
        job.transition(JobStatus::Testing).unwrap();
        job.transition(JobStatus::Completed).unwrap();
        assert!(job.completed_at.is_some());
        assert!(job.is_finished());
    }

    #[test]
    fn queued_cannot_jump_to_testing() {
        let mut job = job();
        let err = job.transition(JobStatus::Testing).unwrap_err();
        assert_eq!(err.code(), crate::error::code::CONFLICT);
    }

    #[test]
    fn terminal_states_accept_no_edges() {
        let mut job = job();
        job.transition(JobStatus::Planning).unwrap();
        job.transition(JobStatus::Failed).unwrap();
        assert!(job.transition(JobStatus::Planning).is_err());
        assert!(job.transition(JobStatus::Failed).is_err());
    }

    #[test]
    fn specs_frozen_after_lock() {
        let mut job = job();
        job.set_specs("openapi: 3.0.0", "CREATE TABLE book();").unwrap();
        job.lock_contract();
        let err = job.set_specs("rewritten", "rewritten").unwrap_err();
        assert_eq!(err.code(), crate::error::code::LOCKED);
        assert_eq!(job.contract_spec, "openapi: 3.0.0");
    }

    #[test]
    fn lock_contract_is_idempotent() {
        let mut job = job();
        job.lock_contract();
        let first = job.contract_locked_at;
        job.lock_contract();
        assert_eq!(job.contract_locked_at, first);
    }

    #[test]
    fn round_counter_respects_budget() {
        let mut job = job();
        for _ in 0..3 {
            job.advance_round().unwrap();
        }
        assert!(job.advance_round().is_err());
        assert_eq!(job.current_round, 3);
    }
}
