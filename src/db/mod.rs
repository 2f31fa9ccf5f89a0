mod artifact_ops;
mod job_ops;
mod mappers;
mod report_ops;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::error::Result;

/// Postgres-backed implementation of the storage ports
#[derive(Clone)]
pub struct ForgeDb {
    pool: PgPool,
}

impl ForgeDb {
    pub async fn new(database_url: &str) -> Result<Self> {
        let max_connections = resolve_pool_max_connections();

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL generation store");
        Ok(Self { pool })
    }

    /// Create a new ForgeDb with an existing pool (for testing).
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the three record families when they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(self.pool()).await?;
        }
        info!("Generation store schema initialized");
        Ok(())
    }
}

const SCHEMA_STATEMENTS: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS jobs (
        job_id TEXT PRIMARY KEY,
        requirement TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        template_context TEXT,
        status TEXT NOT NULL,
        current_round INTEGER NOT NULL DEFAULT 0,
        max_rounds INTEGER NOT NULL,
        enable_integration_tests BOOLEAN NOT NULL DEFAULT FALSE,
        contract_spec TEXT NOT NULL DEFAULT '',
        schema_spec TEXT NOT NULL DEFAULT '',
        contract_locked BOOLEAN NOT NULL DEFAULT FALSE,
        contract_locked_at TIMESTAMPTZ,
        sandbox_id TEXT,
        sandbox_url TEXT,
        sandbox_provider TEXT,
        last_error TEXT,
        error_count INTEGER NOT NULL DEFAULT 0,
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS artifacts (
        artifact_id TEXT PRIMARY KEY,
        job_id TEXT NOT NULL REFERENCES jobs(job_id),
        artifact_type TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_name TEXT NOT NULL,
        content TEXT NOT NULL,
        language TEXT NOT NULL,
        version INTEGER NOT NULL,
        parent_artifact_id TEXT REFERENCES artifacts(artifact_id),
        checksum TEXT NOT NULL,
        has_errors BOOLEAN NOT NULL DEFAULT FALSE,
        compiler_output TEXT,
        validated_at TIMESTAMPTZ,
        generated_by TEXT NOT NULL,
        generation_round INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    // Linear history: at most one child per parent, one root per path.
    r"CREATE UNIQUE INDEX IF NOT EXISTS artifacts_one_child_per_parent
        ON artifacts(parent_artifact_id) WHERE parent_artifact_id IS NOT NULL",
    r"CREATE UNIQUE INDEX IF NOT EXISTS artifacts_one_root_per_path
        ON artifacts(job_id, file_path) WHERE parent_artifact_id IS NULL",
    r"CREATE TABLE IF NOT EXISTS validation_reports (
        report_id TEXT PRIMARY KEY,
        job_id TEXT NOT NULL REFERENCES jobs(job_id),
        round INTEGER NOT NULL,
        validation_type TEXT NOT NULL,
        passed BOOLEAN NOT NULL,
        command TEXT NOT NULL,
        exit_code INTEGER NOT NULL,
        stdout TEXT NOT NULL,
        stderr TEXT NOT NULL,
        duration_ms BIGINT NOT NULL,
        parsed_errors JSONB NOT NULL DEFAULT '[]'::jsonb,
        error_count INTEGER NOT NULL,
        warning_count INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    r"CREATE INDEX IF NOT EXISTS validation_reports_job
        ON validation_reports(job_id, created_at)",
];

fn resolve_pool_max_connections() -> u32 {
    resolve_pool_max_connections_from(|key| std::env::var(key).ok())
}

fn resolve_pool_max_connections_from<F>(env_lookup: F) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    env_lookup("FORGE_DB_MAX_CONNECTIONS")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or_else(|| {
            let job_count = env_lookup("FORGE_MAX_CONCURRENT_JOBS")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(16);

            32_u32.max(job_count.saturating_mul(2))
        })
}
