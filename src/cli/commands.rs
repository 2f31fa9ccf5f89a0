/// Parsed CLI command
#[derive(Debug, Clone)]
pub enum CliCommand {
    Submit {
        requirement: Option<String>,
        payload_file: Option<String>,
        tenant: Option<String>,
        user: Option<String>,
        max_rounds: Option<u32>,
        integration_tests: bool,
    },
    Status {
        job_id: String,
    },
    Jobs {
        status: Option<String>,
    },
    Artifacts {
        job_id: String,
        path: Option<String>,
    },
    Reports {
        job_id: String,
    },
    Recover,
    InitDb,
}
