#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ForgeError, Result};

pub const DEFAULT_MAX_ROUNDS: u32 = 3;
pub const DEFAULT_AGENT_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_SANDBOX_VALIDATE_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_SANDBOX_DEPLOY_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_MAX_SAME_ERROR_TOLERANCE: u32 = 2;
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 10;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_STALE_JOB_THRESHOLD_MS: u64 = 300_000;

/// Recognized orchestrator options with their defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub max_rounds: u32,
    pub agent_timeout_ms: u64,
    pub sandbox_validate_timeout_ms: u64,
    pub sandbox_deploy_timeout_ms: u64,
    pub enable_integration_tests: bool,
    pub max_same_error_tolerance: u32,
    pub max_history_size: usize,
    pub heartbeat_interval_ms: u64,
    pub stale_job_threshold_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            agent_timeout_ms: DEFAULT_AGENT_TIMEOUT_MS,
            sandbox_validate_timeout_ms: DEFAULT_SANDBOX_VALIDATE_TIMEOUT_MS,
            sandbox_deploy_timeout_ms: DEFAULT_SANDBOX_DEPLOY_TIMEOUT_MS,
            enable_integration_tests: false,
            max_same_error_tolerance: DEFAULT_MAX_SAME_ERROR_TOLERANCE,
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            stale_job_threshold_ms: DEFAULT_STALE_JOB_THRESHOLD_MS,
        }
    }
}

impl OrchestratorConfig {
    pub const fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    pub const fn sandbox_validate_timeout(&self) -> Duration {
        Duration::from_millis(self.sandbox_validate_timeout_ms)
    }

    pub const fn sandbox_deploy_timeout(&self) -> Duration {
        Duration::from_millis(self.sandbox_deploy_timeout_ms)
    }

    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub const fn stale_job_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_job_threshold_ms)
    }
}

/// Load configuration: built-in defaults, then `.forge/config.toml`, then
/// `FORGE_*` environment variables. Later sources win.
pub async fn load_config(path: Option<PathBuf>) -> Result<OrchestratorConfig> {
    let config_path = path.unwrap_or_else(|| PathBuf::from(".forge/config.toml"));
    let mut config = OrchestratorConfig::default();

    if config_path.exists() {
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| ForgeError::ConfigError(format!("Failed to read config: {e}")))?;
        apply_config_content(&mut config, &content);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

pub fn apply_config_content(config: &mut OrchestratorConfig, content: &str) {
    for line in content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
    {
        apply_option(config, line);
    }
}

fn apply_option(config: &mut OrchestratorConfig, line: &str) {
    let parse = parse_key_value;
    if let Some(value) = parse(line, "max_rounds") {
        apply_parsed(&mut config.max_rounds, value);
    }
    if let Some(value) = parse(line, "agent_timeout_ms") {
        apply_parsed(&mut config.agent_timeout_ms, value);
    }
    if let Some(value) = parse(line, "sandbox_validate_timeout_ms") {
        apply_parsed(&mut config.sandbox_validate_timeout_ms, value);
    }
    if let Some(value) = parse(line, "sandbox_deploy_timeout_ms") {
        apply_parsed(&mut config.sandbox_deploy_timeout_ms, value);
    }
    if let Some(value) = parse(line, "enable_integration_tests") {
        apply_parsed(&mut config.enable_integration_tests, value);
    }
    if let Some(value) = parse(line, "max_same_error_tolerance") {
        apply_parsed(&mut config.max_same_error_tolerance, value);
    }
    if let Some(value) = parse(line, "max_history_size") {
        apply_parsed(&mut config.max_history_size, value);
    }
    if let Some(value) = parse(line, "heartbeat_interval_ms") {
        apply_parsed(&mut config.heartbeat_interval_ms, value);
    }
    if let Some(value) = parse(line, "stale_job_threshold_ms") {
        apply_parsed(&mut config.stale_job_threshold_ms, value);
    }
}

fn apply_parsed<T: std::str::FromStr>(target: &mut T, value: &str) {
    if let Ok(parsed) = expand_env_vars(value).parse::<T>() {
        *target = parsed;
    }
}

pub fn apply_env_overrides<F>(config: &mut OrchestratorConfig, env_lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut set = |key: &str, apply: &mut dyn FnMut(&str)| {
        if let Some(value) = env_lookup(key) {
            apply(value.trim());
        }
    };

    set("FORGE_MAX_ROUNDS", &mut |v| {
        apply_parsed(&mut config.max_rounds, v);
    });
    set("FORGE_AGENT_TIMEOUT_MS", &mut |v| {
        apply_parsed(&mut config.agent_timeout_ms, v);
    });
    set("FORGE_SANDBOX_VALIDATE_TIMEOUT_MS", &mut |v| {
        apply_parsed(&mut config.sandbox_validate_timeout_ms, v);
    });
    set("FORGE_SANDBOX_DEPLOY_TIMEOUT_MS", &mut |v| {
        apply_parsed(&mut config.sandbox_deploy_timeout_ms, v);
    });
    set("FORGE_ENABLE_INTEGRATION_TESTS", &mut |v| {
        apply_parsed(&mut config.enable_integration_tests, v);
    });
    set("FORGE_MAX_SAME_ERROR_TOLERANCE", &mut |v| {
        apply_parsed(&mut config.max_same_error_tolerance, v);
    });
    set("FORGE_MAX_HISTORY_SIZE", &mut |v| {
        apply_parsed(&mut config.max_history_size, v);
    });
    set("FORGE_HEARTBEAT_INTERVAL_MS", &mut |v| {
        apply_parsed(&mut config.heartbeat_interval_ms, v);
    });
    set("FORGE_STALE_JOB_THRESHOLD_MS", &mut |v| {
        apply_parsed(&mut config.stale_job_threshold_ms, v);
    });
}

fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_part = &result[start + 2..start + end];
            let (var_name, default) = var_part.split_once(":-").unwrap_or((var_part, ""));
            let value = std::env::var(var_name).unwrap_or_else(|_| default.to_string());
            result.replace_range(start..=(start + end), &value);
        } else {
            break;
        }
    }
    result
}

pub fn parse_key_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split_once('=')
        .and_then(|(lhs, rhs)| (lhs.trim() == key).then_some(rhs.trim().trim_matches('"')))
}

/// Ordered database URL candidates for the CLI: env var, project config,
/// computed default. Values that do not parse as URLs are skipped.
pub fn database_url_candidates() -> Vec<String> {
    let mut candidates = Vec::new();

    // 1. Environment variable wins so local shell config works immediately.
    push_unique(&mut candidates, non_empty_env_var("DATABASE_URL"));

    // 2. Project config comes next.
    if let Ok(content) = std::fs::read_to_string(".forge/config.toml") {
        let database_url = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .find_map(|line| parse_key_value(line, "database_url"))
            .map(expand_env_vars);
        push_unique(
            &mut candidates,
            database_url.and_then(|url| {
                let trimmed = url.trim().to_string();
                (!trimmed.is_empty()).then_some(trimmed)
            }),
        );
    }

    // 3. Finally, computed defaults from FORGE_DB_* values.
    push_unique(&mut candidates, Some(computed_default_database_url()));

    candidates
}

fn push_unique(target: &mut Vec<String>, value: Option<String>) {
    if let Some(candidate) = value {
        if url::Url::parse(&candidate).is_err() {
            return;
        }
        if !target.iter().any(|existing| existing == &candidate) {
            target.push(candidate);
        }
    }
}

fn non_empty_env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn computed_default_database_url() -> String {
    let user = std::env::var("FORGE_DB_USER").unwrap_or_else(|_| "appforge".to_string());
    let pass = std::env::var("FORGE_DB_PASSWORD").unwrap_or_else(|_| "appforge".to_string());
    let host = std::env::var("FORGE_DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("FORGE_DB_PORT").unwrap_or_else(|_| "5438".to_string());
    let db = std::env::var("FORGE_DB_NAME").unwrap_or_else(|_| "appforge_db".to_string());
    format!("postgres://{user}:{pass}@{host}:{port}/{db}")
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recognized_options_table() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.agent_timeout_ms, 120_000);
        assert_eq!(config.sandbox_validate_timeout_ms, 120_000);
        assert_eq!(config.sandbox_deploy_timeout_ms, 60_000);
        assert!(!config.enable_integration_tests);
        assert_eq!(config.max_same_error_tolerance, 2);
        assert_eq!(config.max_history_size, 10);
        assert_eq!(config.heartbeat_interval_ms, 15_000);
        assert_eq!(config.stale_job_threshold_ms, 300_000);
    }

    #[test]
    fn config_file_lines_override_defaults() {
        let mut config = OrchestratorConfig::default();
        apply_config_content(
            &mut config,
            r#"# generation budget
max_rounds = "5"
enable_integration_tests = "true"
heartbeat_interval_ms = "5000""#,
        );
        assert_eq!(config.max_rounds, 5);
        assert!(config.enable_integration_tests);
        assert_eq!(config.heartbeat_interval_ms, 5_000);
        assert_eq!(config.agent_timeout_ms, DEFAULT_AGENT_TIMEOUT_MS);
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = OrchestratorConfig::default();
        apply_config_content(&mut config, r#"max_rounds = "5""#);
        apply_env_overrides(&mut config, |key| {
            (key == "FORGE_MAX_ROUNDS").then(|| "7".to_string())
        });
        assert_eq!(config.max_rounds, 7);
    }

    #[test]
    fn malformed_values_keep_previous_setting() {
        let mut config = OrchestratorConfig::default();
        apply_config_content(&mut config, r#"max_rounds = "not-a-number""#);
        assert_eq!(config.max_rounds, DEFAULT_MAX_ROUNDS);
    }

    #[test]
    fn parse_key_value_handles_spaces_and_mismatch() {
        assert_eq!(
            parse_key_value("database_url = \"postgres://u:p@h/db?x=y\"", "database_url"),
            Some("postgres://u:p@h/db?x=y")
        );
        assert_eq!(parse_key_value("other = \"x\"", "database_url"), None);
    }
}
