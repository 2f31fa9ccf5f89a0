#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use super::action::CliAction;
use super::commands::CliCommand;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CliError {
    #[error("Missing required argument: {}", arg)]
    MissingRequiredArg { arg: String },
    #[error("Unknown command: {}", cmd)]
    UnknownCommand { cmd: String },
    #[error("Invalid argument value for {}: {}", arg, error)]
    InvalidArgValue { arg: String, error: String },
}

pub fn parse_cli_args(args: &[String]) -> Result<CliAction, CliError> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        return Ok(CliAction::ShowHelp);
    }

    match args.first().map(String::as_str) {
        None => Ok(CliAction::ShowHelp),
        Some("-v" | "--version") => Ok(CliAction::ShowVersion),
        Some("submit") => Ok(CliAction::Command(CliCommand::Submit {
            requirement: parse_value_arg(args, "--requirement"),
            payload_file: parse_value_arg(args, "--file"),
            tenant: parse_value_arg(args, "--tenant"),
            user: parse_value_arg(args, "--user"),
            max_rounds: parse_numeric_arg(args, "--max-rounds")?,
            integration_tests: has_flag(args, "--integration-tests"),
        })),
        Some("status") => Ok(CliAction::Command(CliCommand::Status {
            job_id: parse_required_arg(args, "--job")?,
        })),
        Some("jobs") => Ok(CliAction::Command(CliCommand::Jobs {
            status: parse_value_arg(args, "--status"),
        })),
        Some("artifacts") => Ok(CliAction::Command(CliCommand::Artifacts {
            job_id: parse_required_arg(args, "--job")?,
            path: parse_value_arg(args, "--path"),
        })),
        Some("reports") => Ok(CliAction::Command(CliCommand::Reports {
            job_id: parse_required_arg(args, "--job")?,
        })),
        Some("recover") => Ok(CliAction::Command(CliCommand::Recover)),
        Some("init-db") => Ok(CliAction::Command(CliCommand::InitDb)),
        Some(other) => Err(CliError::UnknownCommand {
            cmd: other.to_string(),
        }),
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn parse_value_arg(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == key)
        .and_then(|index| args.get(index + 1))
        .cloned()
}

fn parse_required_arg(args: &[String], key: &str) -> Result<String, CliError> {
    parse_value_arg(args, key).ok_or_else(|| CliError::MissingRequiredArg {
        arg: key.to_string(),
    })
}

fn parse_numeric_arg(args: &[String], key: &str) -> Result<Option<u32>, CliError> {
    parse_value_arg(args, key)
        .map(|value| {
            value.parse::<u32>().map_err(|e| CliError::InvalidArgValue {
                arg: key.to_string(),
                error: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn empty_args_show_help() {
        assert!(matches!(
            parse_cli_args(&argv(&[])).unwrap(),
            CliAction::ShowHelp
        ));
        assert!(matches!(
            parse_cli_args(&argv(&["submit", "--help"])).unwrap(),
            CliAction::ShowHelp
        ));
    }

    #[test]
    fn submit_collects_options() {
        let action = parse_cli_args(&argv(&[
            "submit",
            "--requirement",
            "CRUD for Book",
            "--max-rounds",
            "5",
            "--integration-tests",
        ]))
        .unwrap();
        match action {
            CliAction::Command(CliCommand::Submit {
                requirement,
                max_rounds,
                integration_tests,
                ..
            }) => {
                assert_eq!(requirement.as_deref(), Some("CRUD for Book"));
                assert_eq!(max_rounds, Some(5));
                assert!(integration_tests);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn status_requires_job() {
        let err = parse_cli_args(&argv(&["status"])).unwrap_err();
        assert!(matches!(err, CliError::MissingRequiredArg { .. }));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = parse_cli_args(&argv(&["frobnicate"])).unwrap_err();
        assert!(matches!(err, CliError::UnknownCommand { .. }));
    }

    #[test]
    fn bad_numeric_value_is_rejected() {
        let err = parse_cli_args(&argv(&["submit", "--max-rounds", "many"])).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgValue { .. }));
    }
}
