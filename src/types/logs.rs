use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author role of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogRole {
    Player,
    Coach,
    Executor,
    Architect,
    System,
}

impl LogRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Coach => "coach",
            Self::Executor => "executor",
            Self::Architect => "architect",
            Self::System => "system",
        }
    }
}

impl fmt::Display for LogRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for LogRole {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "player" => Ok(Self::Player),
            "coach" => Ok(Self::Coach),
            "executor" => Ok(Self::Executor),
            "architect" => Ok(Self::Architect),
            "system" => Ok(Self::System),
            _ => Err(format!("Unknown log role: {}", s)),
        }
    }
}

/// Log entry level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
    Heartbeat,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Success => "success",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Heartbeat entries keep subscribers alive and are never rendered.
    pub fn is_rendered(&self) -> bool {
        !matches!(self, Self::Heartbeat)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for LogLevel {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(LogLevel::Error),
            "success" => Ok(Self::Success),
            "heartbeat" => Ok(Self::Heartbeat),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// One append-only job log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub role: LogRole,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(role: LogRole, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            role,
            level,
            message: message.into(),
        }
    }
}
