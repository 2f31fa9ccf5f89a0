use super::commands::CliCommand;

/// Top-level action resolved from argv
#[derive(Debug, Clone)]
pub enum CliAction {
    ShowHelp,
    ShowVersion,
    Command(CliCommand),
}
