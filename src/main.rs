#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

mod cli;
mod commands;
mod output;

use std::env;

use cli::{parse_cli_args, CliAction, OutputFormat};
use output::emit_error;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP: &str = "\
forge - AI-driven application generation orchestrator

USAGE:
    forge <command> [options] [--output text|json]

COMMANDS:
    submit      Queue a generation job
                  --requirement <text> | --file <payload.json>
                  [--tenant <id>] [--user <id>]
                  [--max-rounds <n>] [--integration-tests]
    status      Show one job            --job <id>
    jobs        List jobs               [--status <status>]
    artifacts   List latest artifacts   --job <id> [--path <p>]
    reports     List validation runs    --job <id>
    recover     Fail stale running jobs
    init-db     Initialize database schema

OPTIONS:
    -h, --help       Show this help
    -v, --version    Show version

Configuration is read from .forge/config.toml and FORGE_* environment
variables; the database URL comes from DATABASE_URL, the config file, or
FORGE_DB_* parts.";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let output = OutputFormat::from_args(&args);

    let action = match parse_cli_args(&args) {
        Ok(action) => action,
        Err(err) => {
            eprintln!("error [CLI_ERROR]: {}", err);
            eprintln!("hint: Run 'forge --help' for valid options");
            std::process::exit(2);
        }
    };

    match action {
        CliAction::ShowHelp => println!("{}", HELP),
        CliAction::ShowVersion => println!("forge {}", VERSION),
        CliAction::Command(command) => {
            if let Err(err) = commands::run_command(command, &output).await {
                emit_error(&output, &err);
                std::process::exit(err.exit_code());
            }
        }
    }
}
