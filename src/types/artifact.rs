use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{ForgeError, Result};

use super::identifiers::{ArtifactId, JobId};

/// Generated file category, inferred from its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactType {
    Contract,
    Schema,
    Entity,
    Mapper,
    Service,
    Controller,
    Config,
    Test,
    Frontend,
    Other,
}

impl ArtifactType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Schema => "schema",
            Self::Entity => "entity",
            Self::Mapper => "mapper",
            Self::Service => "service",
            Self::Controller => "controller",
            Self::Config => "config",
            Self::Test => "test",
            Self::Frontend => "frontend",
            Self::Other => "other",
        }
    }

    pub const ALL_STRINGS: [&'static str; 10] = [
        "contract",
        "schema",
        "entity",
        "mapper",
        "service",
        "controller",
        "config",
        "test",
        "frontend",
        "other",
    ];

    #[must_use]
    pub const fn names() -> &'static [&'static str] {
        &Self::ALL_STRINGS
    }

    /// Paths in these categories carry the locked contract and must never
    /// be touched by repair drafts.
    #[must_use]
    pub const fn is_contract_surface(&self) -> bool {
        matches!(self, Self::Contract | Self::Schema)
    }
}

impl TryFrom<&str> for ArtifactType {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, String> {
        match value {
            "contract" => Ok(Self::Contract),
            "schema" => Ok(Self::Schema),
            "entity" => Ok(Self::Entity),
            "mapper" => Ok(Self::Mapper),
            "service" => Ok(Self::Service),
            "controller" => Ok(Self::Controller),
            "config" => Ok(Self::Config),
            "test" => Ok(Self::Test),
            "frontend" => Ok(Self::Frontend),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown artifact type: {value}")),
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Agent role that produced an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeneratedBy {
    Architect,
    BackendCoder,
    FrontendCoder,
    Coach,
}

impl GeneratedBy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::BackendCoder => "backend_coder",
            Self::FrontendCoder => "frontend_coder",
            Self::Coach => "coach",
        }
    }
}

impl TryFrom<&str> for GeneratedBy {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, String> {
        match value {
            "architect" => Ok(Self::Architect),
            "backend_coder" => Ok(Self::BackendCoder),
            "frontend_coder" => Ok(Self::FrontendCoder),
            "coach" => Ok(Self::Coach),
            _ => Err(format!("Unknown generator role: {value}")),
        }
    }
}

impl fmt::Display for GeneratedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derive the artifact category from path segments and extension.
#[must_use]
pub fn infer_artifact_type(file_path: &str) -> ArtifactType {
    let lowered = file_path.to_ascii_lowercase();
    let segment = |needle: &str| lowered.contains(&format!("/{needle}/")) || lowered.starts_with(&format!("{needle}/"));

    if lowered.ends_with(".tsx") || lowered.ends_with(".jsx") {
        return ArtifactType::Frontend;
    }
    if (lowered.ends_with(".yaml") || lowered.ends_with(".yml")) && lowered.contains("openapi") {
        return ArtifactType::Contract;
    }
    if lowered.ends_with(".sql") || lowered.ends_with(".ddl") {
        return ArtifactType::Schema;
    }
    if segment("test") || segment("tests") {
        return ArtifactType::Test;
    }
    if segment("entity") || segment("entities") || segment("model") {
        return ArtifactType::Entity;
    }
    if segment("mapper") || segment("repository") {
        return ArtifactType::Mapper;
    }
    if segment("service") {
        return ArtifactType::Service;
    }
    if segment("controller") || segment("api") {
        return ArtifactType::Controller;
    }
    if segment("config") || lowered.ends_with(".properties") || lowered.ends_with(".toml") {
        return ArtifactType::Config;
    }
    if segment("frontend") || segment("web") || lowered.ends_with(".ts") || lowered.ends_with(".js") {
        return ArtifactType::Frontend;
    }
    ArtifactType::Other
}

/// Derive the language tag from the file extension.
#[must_use]
pub fn infer_language(file_path: &str) -> &'static str {
    let lowered = file_path.to_ascii_lowercase();
    match lowered.rsplit_once('.').map(|(_, ext)| ext) {
        Some("java") => "java",
        Some("kt") => "kotlin",
        Some("rs") => "rust",
        Some("ts" | "tsx") => "typescript",
        Some("js" | "jsx") => "javascript",
        Some("py") => "python",
        Some("sql" | "ddl") => "sql",
        Some("yaml" | "yml") => "yaml",
        Some("json") => "json",
        Some("xml") => "xml",
        Some("toml") => "toml",
        Some("properties") => "properties",
        Some("md") => "markdown",
        Some("html") => "html",
        Some("css") => "css",
        _ => "text",
    }
}

/// SHA-256 checksum over artifact content, hex encoded.
#[must_use]
pub fn content_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A file proposed by an agent, before it is persisted as a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDraft {
    pub file_path: String,
    pub content: String,
    pub generated_by: GeneratedBy,
}

impl ArtifactDraft {
    pub fn new(
        file_path: impl Into<String>,
        content: impl Into<String>,
        generated_by: GeneratedBy,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            content: content.into(),
            generated_by,
        }
    }
}

/// One versioned generated file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: ArtifactId,
    pub job_id: JobId,
    pub artifact_type: ArtifactType,
    pub file_path: String,
    pub file_name: String,
    pub content: String,
    pub language: String,
    pub version: u32,
    pub parent_artifact_id: Option<ArtifactId>,
    pub checksum: String,
    pub has_errors: bool,
    pub compiler_output: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub generated_by: GeneratedBy,
    pub generation_round: u32,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// First version of a path. Type and language are inferred from the path.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::ConfigError` for an empty or absolute path.
    pub fn initial(
        job_id: JobId,
        file_path: impl Into<String>,
        content: impl Into<String>,
        generated_by: GeneratedBy,
        generation_round: u32,
    ) -> Result<Self> {
        let file_path = file_path.into();
        if file_path.trim().is_empty() {
            return Err(ForgeError::ConfigError(
                "Artifact path must not be empty".to_string(),
            ));
        }
        if file_path.starts_with('/') {
            return Err(ForgeError::ConfigError(format!(
                "Artifact path must be relative: {file_path}"
            )));
        }

        let content = content.into();
        let file_name = file_path
            .rsplit('/')
            .next()
            .unwrap_or(file_path.as_str())
            .to_string();
        Ok(Self {
            artifact_id: ArtifactId::generate(),
            job_id,
            artifact_type: infer_artifact_type(&file_path),
            language: infer_language(&file_path).to_string(),
            file_name,
            checksum: content_checksum(&content),
            file_path,
            content,
            version: 1,
            parent_artifact_id: None,
            has_errors: false,
            compiler_output: None,
            validated_at: None,
            generated_by,
            generation_round,
            created_at: Utc::now(),
        })
    }

    /// Successor version of `parent` with new content.
    ///
    /// Path, type and language carry over; `version` and `generation_round`
    /// increment.
    pub fn successor(parent: &Self, content: impl Into<String>, generated_by: GeneratedBy) -> Self {
        let content = content.into();
        Self {
            artifact_id: ArtifactId::generate(),
            job_id: parent.job_id.clone(),
            artifact_type: parent.artifact_type,
            file_path: parent.file_path.clone(),
            file_name: parent.file_name.clone(),
            language: parent.language.clone(),
            version: parent.version + 1,
            parent_artifact_id: Some(parent.artifact_id.clone()),
            checksum: content_checksum(&content),
            content,
            has_errors: false,
            compiler_output: None,
            validated_at: None,
            generated_by,
            generation_round: parent.generation_round + 1,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn type_inference_follows_path_segments() {
        assert_eq!(
            infer_artifact_type("src/main/java/com/acme/entity/Book.java"),
            ArtifactType::Entity
        );
        assert_eq!(
            infer_artifact_type("src/main/java/com/acme/mapper/BookMapper.java"),
            ArtifactType::Mapper
        );
        assert_eq!(
            infer_artifact_type("src/main/java/com/acme/service/BookService.java"),
            ArtifactType::Service
        );
        assert_eq!(
            infer_artifact_type("src/main/java/com/acme/controller/BookController.java"),
            ArtifactType::Controller
        );
        assert_eq!(
            infer_artifact_type("src/test/java/com/acme/BookServiceTest.java"),
            ArtifactType::Test
        );
        assert_eq!(infer_artifact_type("api/openapi.yaml"), ArtifactType::Contract);
        assert_eq!(infer_artifact_type("db/schema.sql"), ArtifactType::Schema);
        assert_eq!(
            infer_artifact_type("web/src/pages/Books.tsx"),
            ArtifactType::Frontend
        );
        assert_eq!(
            infer_artifact_type("config/application.properties"),
            ArtifactType::Config
        );
        assert_eq!(infer_artifact_type("README"), ArtifactType::Other);
    }

    #[test]
    fn language_inference_follows_extension() {
        assert_eq!(infer_language("a/b/Book.java"), "java");
        assert_eq!(infer_language("web/App.tsx"), "typescript");
        assert_eq!(infer_language("schema.sql"), "sql");
        assert_eq!(infer_language("Makefile"), "text");
    }

    #[test]
    fn initial_artifact_starts_chain() {
        let artifact = Artifact::initial(
            JobId::new("job-1"),
            "src/main/java/entity/Book.java",
            "class Book {}",
            GeneratedBy::BackendCoder,
            0,
        )
        .unwrap();
        assert_eq!(artifact.version, 1);
        assert!(artifact.parent_artifact_id.is_none());
        assert_eq!(artifact.file_name, "Book.java");
        assert!(!artifact.has_errors);
    }

    #[test]
    fn initial_rejects_absolute_path() {
        let result = Artifact::initial(
            JobId::new("job-1"),
            "/etc/passwd",
            "",
            GeneratedBy::Coach,
            1,
        );
        assert!(result.is_err());
    }

    #[test]
    fn successor_links_to_parent() {
        let first = Artifact::initial(
            JobId::new("job-1"),
            "src/service/BookService.java",
            "v1",
            GeneratedBy::BackendCoder,
            0,
        )
        .unwrap();
        let second = Artifact::successor(&first, "v2", GeneratedBy::Coach);
        assert_eq!(second.version, 2);
        assert_eq!(second.parent_artifact_id, Some(first.artifact_id.clone()));
        assert_eq!(second.file_path, first.file_path);
        assert_eq!(second.generation_round, 1);
        assert_ne!(second.checksum, first.checksum);
    }

    #[test]
    fn checksum_is_stable() {
        assert_eq!(content_checksum("abc"), content_checksum("abc"));
        assert_ne!(content_checksum("abc"), content_checksum("abd"));
    }
}
