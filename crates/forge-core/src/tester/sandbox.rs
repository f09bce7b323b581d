//! Sandbox abstraction: loading, constructing and exercising a candidate
//! outside the forge process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::CommandResponse;
use crate::domain::{Candidate, Scenario};

/// Sandbox failures. The display text becomes validation feedback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("{step} failed:\n{diagnostics}")]
    Build { step: String, diagnostics: String },

    #[error("{step} timed out after {seconds}s")]
    Timeout { step: String, seconds: u64 },

    /// A cargo build exceeded its budget. Treated as a host problem.
    #[error("{step} timed out after {seconds}s")]
    BuildTimeout { step: String, seconds: u64 },

    #[error("constructing the capability panicked: {0}")]
    Panicked(String),

    #[error("harness exited with code {code}: {stderr}")]
    Harness { code: i32, stderr: String },

    #[error("harness output could not be read: {0}")]
    Protocol(String),

    #[error("sandbox unavailable: {0}")]
    Unavailable(String),
}

impl SandboxError {
    /// Host-side failures that say nothing about the candidate. These abort
    /// the run instead of consuming attempts.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            SandboxError::Unavailable(_) | SandboxError::BuildTimeout { .. }
        )
    }
}

/// Result of one scenario run inside the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub scenario: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CommandResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panic: Option<String>,
}

/// Everything the behavioral level observes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseReport {
    pub healthy: bool,
    pub runs: Vec<ScenarioRun>,
}

/// Isolated execution environment for candidate modules.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Compile the module in isolation (validation level 2).
    async fn load(&self, candidate: &Candidate) -> Result<(), SandboxError>;

    /// Construct the capability with `Default::default()` (level 3).
    async fn instantiate(&self, candidate: &Candidate) -> Result<(), SandboxError>;

    /// Call `health_check` then run every scenario in order (level 5).
    async fn exercise(
        &self,
        candidate: &Candidate,
        scenarios: &[Scenario],
    ) -> Result<ExerciseReport, SandboxError>;

    /// Called once per validation that reached [`Sandbox::load`], after its
    /// last step and whatever the outcome. Frees per-candidate resources.
    async fn release(&self, _candidate: &Candidate) {}
}
