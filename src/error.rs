#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use thiserror::Error;

/// Error code constants for type-safe error handling
pub mod code {
    pub const CLI_ERROR: &str = "CLI_ERROR";
    pub const NOTFOUND: &str = "NOTFOUND";
    pub const INVALID: &str = "INVALID";
    pub const CONFLICT: &str = "CONFLICT";
    pub const LOCKED: &str = "LOCKED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const CANCELLED: &str = "CANCELLED";
    pub const DEPENDENCY: &str = "DEPENDENCY";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Illegal status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Contract is locked for job {0}")]
    ContractLocked(String),

    #[error("Artifact version conflict on {path}: parent {parent} already has a successor")]
    VersionConflict { path: String, parent: String },

    #[error("Planning failed: {0}")]
    PlanFailed(String),

    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("Executor unavailable: {0}")]
    ExecutorUnavailable(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// Returns the protocol error code for this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) | Self::SerializationError(_) => code::INVALID,
            Self::JobNotFound(_) | Self::ArtifactNotFound(_) => code::NOTFOUND,
            Self::InvalidTransition { .. } | Self::VersionConflict { .. } => code::CONFLICT,
            Self::ContractLocked(_) => code::LOCKED,
            Self::AgentUnavailable(_) | Self::ExecutorUnavailable(_) => code::UNAVAILABLE,
            Self::Cancelled => code::CANCELLED,
            Self::PlanFailed(_) | Self::IoError(_) => code::DEPENDENCY,
            Self::DatabaseError(_) | Self::SqlxError(_) | Self::Internal(_) => code::INTERNAL,
        }
    }

    /// Returns the exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError(_) => 2,
            Self::DatabaseError(_) | Self::SqlxError(_) => 3,
            Self::JobNotFound(_) | Self::ArtifactNotFound(_) => 4,
            Self::InvalidTransition { .. } | Self::ContractLocked(_) => 5,
            Self::VersionConflict { .. } => 6,
            Self::PlanFailed(_) | Self::AgentUnavailable(_) | Self::ExecutorUnavailable(_) => 7,
            Self::Cancelled => 8,
            Self::IoError(_) => 9,
            Self::SerializationError(_) => 10,
            Self::Internal(_) => 11,
        }
    }

    /// True when the error is a transport failure eligible for local retry.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::AgentUnavailable(_) | Self::ExecutorUnavailable(_))
    }
}

/// Protocol error codes as documented in the CLI
pub const ERROR_CODES: &[(&str, &str, &str)] = &[
    (
        code::CLI_ERROR,
        "Invalid CLI usage",
        "Run 'forge --help' for valid options",
    ),
    (
        code::NOTFOUND,
        "Resource was not found",
        "List jobs and verify identifier",
    ),
    (
        code::INVALID,
        "Invalid request payload",
        "Validate JSON syntax and ensure all required fields are present",
    ),
    (
        code::CONFLICT,
        "Conflicting state transition",
        "Run forge status to inspect current job state",
    ),
    (
        code::LOCKED,
        "Contract is locked",
        "Contract and schema are immutable after planning",
    ),
    (
        code::TIMEOUT,
        "Operation timed out",
        "Increase the per-call deadline and retry",
    ),
    (
        code::UNAVAILABLE,
        "Agent or executor transport failure",
        "Check agent and sandbox connectivity",
    ),
    (
        code::CANCELLED,
        "Job was cancelled",
        "Submit a new job to retry the requirement",
    ),
    (
        code::DEPENDENCY,
        "Upstream collaborator failed",
        "Inspect the job log stream for the failing step",
    ),
    (
        code::INTERNAL,
        "Unexpected internal failure",
        "Inspect logs and retry command",
    ),
];

pub type Result<T> = std::result::Result<T, ForgeError>;
