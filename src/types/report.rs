use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifiers::{JobId, ReportId};

/// Validation gate kind, in fixed run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValidationType {
    Compile,
    UnitTest,
    IntegrationTest,
    Runtime,
}

impl ValidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::UnitTest => "unit_test",
            Self::IntegrationTest => "integration_test",
            Self::Runtime => "runtime",
        }
    }

    /// The gate that runs after this one passes.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Compile => Some(Self::UnitTest),
            Self::UnitTest => Some(Self::IntegrationTest),
            Self::IntegrationTest => Some(Self::Runtime),
            Self::Runtime => None,
        }
    }
}

impl fmt::Display for ValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ValidationType {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "compile" => Ok(Self::Compile),
            "unit_test" => Ok(Self::UnitTest),
            "integration_test" => Ok(Self::IntegrationTest),
            "runtime" => Ok(Self::Runtime),
            _ => Err(format!("Unknown validation type: {}", s)),
        }
    }
}

/// Parsed diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl TryFrom<&str> for Severity {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// One diagnostic parsed out of validator output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedError {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
    pub severity: Severity,
}

impl ParsedError {
    pub fn new(
        file: Option<String>,
        line: Option<u32>,
        column: Option<u32>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            file,
            line,
            column,
            message: message.into(),
            severity,
        }
    }
}

/// Structured result of one sandbox run. Append-only once inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub report_id: ReportId,
    pub job_id: JobId,
    pub round: u32,
    pub validation_type: ValidationType,
    pub passed: bool,
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub parsed_errors: Vec<ParsedError>,
    pub error_count: u32,
    pub warning_count: u32,
    pub created_at: DateTime<Utc>,
}

impl ValidationReport {
    /// Builds a report from raw run output. `passed` is derived, never
    /// supplied, so `passed` implies `error_count == 0` by construction.
    pub fn from_run(
        job_id: JobId,
        round: u32,
        validation_type: ValidationType,
        command: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration_ms: u64,
        parsed_errors: Vec<ParsedError>,
    ) -> Self {
        let error_count = parsed_errors
            .iter()
            .filter(|e| e.severity == Severity::Error)
            .count() as u32;
        let warning_count = parsed_errors
            .iter()
            .filter(|e| e.severity == Severity::Warning)
            .count() as u32;

        Self {
            report_id: ReportId::generate(),
            job_id,
            round,
            validation_type,
            passed: exit_code == 0 && error_count == 0,
            command: command.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_ms,
            parsed_errors,
            error_count,
            warning_count,
            created_at: Utc::now(),
        }
    }

    /// Raw validator output, stdout then stderr.
    pub fn combined_output(&self) -> String {
        let mut combined = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&self.stderr);
        }
        combined
    }

    /// Distinct file paths named by error-severity diagnostics, in first
    /// occurrence order.
    pub fn failing_files(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.parsed_errors
            .iter()
            .filter(|e| e.severity == Severity::Error)
            .filter_map(|e| e.file.clone())
            .filter(|file| seen.insert(file.clone()))
            .collect()
    }
}
