use serde::{Deserialize, Serialize};

use super::identifiers::{TenantId, UserId};

/// Requested backend/frontend/database stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStack {
    pub backend: String,
    pub frontend: String,
    pub database: String,
}

/// Per-job overrides accepted at submission time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default)]
    pub max_rounds: Option<u32>,
    #[serde(default)]
    pub enable_integration_tests: Option<bool>,
}

/// Job submission payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub requirement: String,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    #[serde(default)]
    pub template_context: Option<String>,
    #[serde(default)]
    pub target_stack: Option<TargetStack>,
    #[serde(default)]
    pub generation_options: Option<GenerationOptions>,
}

impl JobSubmission {
    pub fn new(
        requirement: impl Into<String>,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Self {
        Self {
            requirement: requirement.into(),
            tenant_id,
            user_id,
            template_context: None,
            target_stack: None,
            generation_options: None,
        }
    }

    /// Effective round budget: submission override, else the given default.
    pub fn effective_max_rounds(&self, default_max_rounds: u32) -> u32 {
        self.generation_options
            .as_ref()
            .and_then(|options| options.max_rounds)
            .unwrap_or(default_max_rounds)
    }

    pub fn integration_tests_enabled(&self, default_enabled: bool) -> bool {
        self.generation_options
            .as_ref()
            .and_then(|options| options.enable_integration_tests)
            .unwrap_or(default_enabled)
    }
}
