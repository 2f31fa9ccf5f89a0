//! CLI contract tests: argument parsing, help/version surfaces and exit
//! codes must stay stable for shell scripts. None of these touch the
//! database.

use assert_cmd::Command;
use predicates::str::contains;

fn forge() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("forge"))
}

#[test]
fn help_lists_every_command() {
    forge()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("submit"))
        .stdout(contains("status"))
        .stdout(contains("artifacts"))
        .stdout(contains("reports"))
        .stdout(contains("recover"))
        .stdout(contains("init-db"));
}

#[test]
fn no_arguments_shows_help() {
    forge().assert().success().stdout(contains("USAGE"));
}

#[test]
fn version_prints_crate_version() {
    forge()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_command_exits_with_cli_error() {
    forge()
        .arg("frobnicate")
        .assert()
        .failure()
        .code(2)
        .stderr(contains("Unknown command"))
        .stderr(contains("forge --help"));
}

#[test]
fn status_without_job_exits_with_cli_error() {
    forge()
        .arg("status")
        .assert()
        .failure()
        .code(2)
        .stderr(contains("--job"));
}

#[test]
fn bad_numeric_argument_exits_with_cli_error() {
    forge()
        .args(["submit", "--requirement", "x", "--max-rounds", "many"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("--max-rounds"));
}

#[test]
fn subcommand_help_flag_wins() {
    forge()
        .args(["submit", "--help"])
        .assert()
        .success()
        .stdout(contains("USAGE"));
}

#[test]
fn all_error_variants_keep_nonzero_exit_codes() {
    let cases = vec![
        forge::ForgeError::ConfigError("x".to_string()),
        forge::ForgeError::DatabaseError("x".to_string()),
        forge::ForgeError::JobNotFound("x".to_string()),
        forge::ForgeError::ContractLocked("x".to_string()),
        forge::ForgeError::VersionConflict {
            path: "a".to_string(),
            parent: "b".to_string(),
        },
        forge::ForgeError::PlanFailed("x".to_string()),
        forge::ForgeError::AgentUnavailable("x".to_string()),
        forge::ForgeError::ExecutorUnavailable("x".to_string()),
        forge::ForgeError::Cancelled,
        forge::ForgeError::Internal("x".to_string()),
    ];

    for error in cases {
        assert_ne!(
            error.exit_code(),
            0,
            "{error} must never exit 0 - shell scripts depend on it"
        );
    }
}
