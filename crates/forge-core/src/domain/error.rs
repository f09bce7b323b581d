//! Domain-level error taxonomy for Forge.

use capability_registry::RegistryError;

/// Failures of a single language-model generation.
///
/// Inside a forge run these are attempt failures, not run failures: the
/// controller records them and spends an attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("model returned empty output for {role}")]
    EmptyOutput { role: String },

    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// Forge domain errors.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Forge domain operations.
pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_display() {
        let err = GenerationError::Timeout { seconds: 30 };
        assert!(err.to_string().contains("30s"));

        let err = GenerationError::Api {
            status: 404,
            message: "model not found".to_string(),
        };
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn test_forge_error_wraps_generation_error() {
        let err: ForgeError = GenerationError::EmptyOutput {
            role: "coder".to_string(),
        }
        .into();
        assert!(err.to_string().contains("generation failed"));
        assert!(err.to_string().contains("coder"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = ForgeError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_registry_error_conversion() {
        let err: ForgeError = RegistryError::Conflict {
            name: "lamp".to_string(),
        }
        .into();
        assert!(err.to_string().contains("lamp"));
    }
}
