#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::db::mappers::artifact_from_row;
use crate::db::ForgeDb;
use crate::error::{ForgeError, Result};
use crate::store::{ArtifactStore, PortFuture};
use crate::types::{Artifact, ArtifactId, GeneratedBy, JobId};

const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}

impl ForgeDb {
    async fn insert_artifact(&self, artifact: &Artifact) -> Result<()> {
        sqlx::query(
            r"INSERT INTO artifacts (
                artifact_id, job_id, artifact_type, file_path, file_name,
                content, language, version, parent_artifact_id, checksum,
                has_errors, compiler_output, validated_at,
                generated_by, generation_round, created_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
        )
        .bind(artifact.artifact_id.value())
        .bind(artifact.job_id.value())
        .bind(artifact.artifact_type.as_str())
        .bind(&artifact.file_path)
        .bind(&artifact.file_name)
        .bind(&artifact.content)
        .bind(&artifact.language)
        .bind(artifact.version as i32)
        .bind(artifact.parent_artifact_id.as_ref().map(ArtifactId::value))
        .bind(&artifact.checksum)
        .bind(artifact.has_errors)
        .bind(&artifact.compiler_output)
        .bind(artifact.validated_at)
        .bind(artifact.generated_by.as_str())
        .bind(artifact.generation_round as i32)
        .bind(artifact.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            // The partial unique indexes enforce linear history: one root
            // per (job, path), one child per parent.
            if is_unique_violation(&e) {
                ForgeError::VersionConflict {
                    path: artifact.file_path.clone(),
                    parent: artifact
                        .parent_artifact_id
                        .as_ref()
                        .map_or_else(|| "none".to_string(), |id| id.value().to_string()),
                }
            } else {
                ForgeError::DatabaseError(format!("Failed to insert artifact: {e}"))
            }
        })?;
        Ok(())
    }

    pub async fn create_artifact(
        &self,
        job_id: &JobId,
        file_path: &str,
        content: &str,
        generated_by: GeneratedBy,
        round: u32,
    ) -> Result<Artifact> {
        let artifact = Artifact::initial(job_id.clone(), file_path, content, generated_by, round)?;
        self.insert_artifact(&artifact).await?;
        Ok(artifact)
    }

    pub async fn create_artifact_version(
        &self,
        artifact_id: &ArtifactId,
        new_content: &str,
        generated_by: GeneratedBy,
    ) -> Result<Artifact> {
        let parent = self
            .fetch_artifact(artifact_id)
            .await?
            .ok_or_else(|| ForgeError::ArtifactNotFound(artifact_id.value().to_string()))?;
        let successor = Artifact::successor(&parent, new_content, generated_by);
        self.insert_artifact(&successor).await?;
        Ok(successor)
    }

    pub async fn set_artifact_error(&self, artifact_id: &ArtifactId, output: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE artifacts
            SET has_errors = TRUE, compiler_output = $2, validated_at = NOW()
            WHERE artifact_id = $1",
        )
        .bind(artifact_id.value())
        .bind(output)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(ForgeError::ArtifactNotFound(artifact_id.value().to_string()));
        }
        Ok(())
    }

    pub async fn set_artifact_valid(&self, artifact_id: &ArtifactId) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE artifacts
            SET has_errors = FALSE, compiler_output = NULL, validated_at = NOW()
            WHERE artifact_id = $1",
        )
        .bind(artifact_id.value())
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(ForgeError::ArtifactNotFound(artifact_id.value().to_string()));
        }
        Ok(())
    }

    pub async fn fetch_artifact(&self, artifact_id: &ArtifactId) -> Result<Option<Artifact>> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE artifact_id = $1")
            .bind(artifact_id.value())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(artifact_from_row).transpose()
    }

    /// Latest version of every path: artifacts without a child.
    pub async fn latest_artifacts(&self, job_id: &JobId) -> Result<Vec<Artifact>> {
        let rows = sqlx::query(
            r"SELECT a.* FROM artifacts a
            WHERE a.job_id = $1
              AND NOT EXISTS (
                SELECT 1 FROM artifacts c WHERE c.parent_artifact_id = a.artifact_id
              )
            ORDER BY a.file_path",
        )
        .bind(job_id.value())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(artifact_from_row).collect()
    }

    pub async fn artifact_chain(&self, job_id: &JobId, file_path: &str) -> Result<Vec<Artifact>> {
        let rows = sqlx::query(
            r"SELECT * FROM artifacts
            WHERE job_id = $1 AND file_path = $2
            ORDER BY version",
        )
        .bind(job_id.value())
        .bind(file_path)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(artifact_from_row).collect()
    }
}

impl ArtifactStore for ForgeDb {
    fn create<'a>(
        &'a self,
        job_id: &'a JobId,
        file_path: &'a str,
        content: &'a str,
        generated_by: GeneratedBy,
        round: u32,
    ) -> PortFuture<'a, Artifact> {
        Box::pin(async move {
            self.create_artifact(job_id, file_path, content, generated_by, round)
                .await
        })
    }

    fn new_version<'a>(
        &'a self,
        artifact_id: &'a ArtifactId,
        new_content: &'a str,
        generated_by: GeneratedBy,
    ) -> PortFuture<'a, Artifact> {
        Box::pin(async move {
            self.create_artifact_version(artifact_id, new_content, generated_by)
                .await
        })
    }

    fn mark_error<'a>(
        &'a self,
        artifact_id: &'a ArtifactId,
        output: &'a str,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move { self.set_artifact_error(artifact_id, output).await })
    }

    fn mark_valid<'a>(&'a self, artifact_id: &'a ArtifactId) -> PortFuture<'a, ()> {
        Box::pin(async move { self.set_artifact_valid(artifact_id).await })
    }

    fn get<'a>(&'a self, artifact_id: &'a ArtifactId) -> PortFuture<'a, Option<Artifact>> {
        Box::pin(async move { self.fetch_artifact(artifact_id).await })
    }

    fn list_latest<'a>(&'a self, job_id: &'a JobId) -> PortFuture<'a, Vec<Artifact>> {
        Box::pin(async move { self.latest_artifacts(job_id).await })
    }

    fn list_by_path<'a>(
        &'a self,
        job_id: &'a JobId,
        file_path: &'a str,
    ) -> PortFuture<'a, Vec<Artifact>> {
        Box::pin(async move { self.artifact_chain(job_id, file_path).await })
    }
}
