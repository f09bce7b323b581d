//! Forge requests: what to build, and whether a human approved building it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ForgeError, Result};

/// Natural-language description of a missing capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Suggested capability name, if the caller has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub description: String,
}

impl Requirement {
    /// Build a requirement, rejecting blank descriptions.
    pub fn new(description: impl Into<String>) -> Result<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(ForgeError::InvalidRequirement(
                "description must not be blank".to_string(),
            ));
        }
        Ok(Self {
            name: None,
            description: description.trim().to_string(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.trim().is_empty() {
            None
        } else {
            Some(name.trim().to_string())
        };
        self
    }

    /// Short label for logs.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

/// Human approval for a forge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Approval {
    Granted {
        approver: String,
        granted_at: DateTime<Utc>,
    },
    Withheld,
}

impl Approval {
    pub fn granted(approver: impl Into<String>) -> Self {
        Approval::Granted {
            approver: approver.into(),
            granted_at: Utc::now(),
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, Approval::Granted { .. })
    }
}

/// A requirement paired with its approval state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeRequest {
    pub requirement: Requirement,
    pub approval: Approval,
}

impl ForgeRequest {
    pub fn new(requirement: Requirement, approval: Approval) -> Self {
        Self {
            requirement,
            approval,
        }
    }

    pub fn approved(requirement: Requirement, approver: impl Into<String>) -> Self {
        Self::new(requirement, Approval::granted(approver))
    }

    pub fn unapproved(requirement: Requirement) -> Self {
        Self::new(requirement, Approval::Withheld)
    }
}
