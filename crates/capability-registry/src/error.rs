//! Error types for capability-registry

use thiserror::Error;

/// Errors that can occur in the registry layer
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A module with this name is already installed
    #[error("capability '{name}' already exists in the registry")]
    Conflict { name: String },

    /// The write did not complete; nothing was installed
    #[error("failed to install capability '{name}': {reason}")]
    WriteFailed { name: String, reason: String },

    /// No module with this name
    #[error("capability not found: {name}")]
    NotFound { name: String },

    /// Name rejected by the identifier policy
    #[error("invalid capability name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// IO error outside of an install
    #[error("registry io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Whether this error is a name collision.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RegistryError::Conflict { .. })
    }
}
