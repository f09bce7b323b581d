//! Registry trait definitions
//!
//! `CapabilityRegistry` is the storage abstraction the Forge publisher writes
//! into. It is async and backend-agnostic; `fakes` provides an in-memory
//! implementation for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// File extension used for installed modules.
pub const MODULE_EXTENSION: &str = "rs";

const MAX_NAME_LEN: usize = 64;

// ---------------------------------------------------------------------------
// CapabilityName
// ---------------------------------------------------------------------------

/// Validated, file-safe capability identifier.
///
/// The inner field is private so a value always satisfies the policy:
/// starts with `a-z`, continues with `a-z`, `0-9` or `_`, at most 64 chars.
/// No separators, dots or uppercase, so it can never escape the registry root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityName(String);

impl CapabilityName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the installed module (`<name>.rs`).
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, MODULE_EXTENSION)
    }

    fn check(s: &str) -> Result<(), &'static str> {
        if s.is_empty() {
            return Err("name is empty");
        }
        if s.len() > MAX_NAME_LEN {
            return Err("name is longer than 64 characters");
        }
        let mut chars = s.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {}
            _ => return Err("name must start with a lowercase ascii letter"),
        }
        if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err("name may only contain a-z, 0-9 and '_'");
        }
        Ok(())
    }
}

impl TryFrom<String> for CapabilityName {
    type Error = RegistryError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match Self::check(&s) {
            Ok(()) => Ok(CapabilityName(s)),
            Err(reason) => Err(RegistryError::InvalidName {
                name: s,
                reason: reason.to_string(),
            }),
        }
    }
}

impl TryFrom<&str> for CapabilityName {
    type Error = RegistryError;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        Self::try_from(s.to_string())
    }
}

impl From<CapabilityName> for String {
    fn from(name: CapabilityName) -> Self {
        name.0
    }
}

impl std::fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CapabilityRegistry
// ---------------------------------------------------------------------------

/// Confirmation returned by a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: CapabilityName,
    /// Backend-specific location (file path for the fs registry).
    pub location: String,
    /// SHA-256 hex digest of the installed source.
    pub source_digest: String,
    pub installed_at: DateTime<Utc>,
}

impl InstallReceipt {
    pub fn new(name: CapabilityName, location: impl Into<String>, source: &str) -> Self {
        use sha2::Digest;
        Self {
            name,
            location: location.into(),
            source_digest: hex::encode(sha2::Sha256::digest(source.as_bytes())),
            installed_at: Utc::now(),
        }
    }
}

/// Capability module registry.
///
/// Guarantees:
/// - `list()` returns installed names in ascending order.
/// - `install()` never overwrites: an existing name yields
///   `RegistryError::Conflict` and zero mutations.
/// - A failed install (`WriteFailed`) leaves no partial entry behind.
#[async_trait]
pub trait CapabilityRegistry: Send + Sync {
    /// List installed capability names.
    async fn list(&self) -> RegistryResult<Vec<CapabilityName>>;

    /// Whether a capability with this name is installed.
    async fn contains(&self, name: &CapabilityName) -> RegistryResult<bool>;

    /// Install a complete module under `name`.
    async fn install(&self, name: &CapabilityName, source: &str) -> RegistryResult<InstallReceipt>;

    /// Read back the source of an installed module.
    async fn source(&self, name: &CapabilityName) -> RegistryResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names_are_accepted() {
        for name in ["square_root", "lamp2", "a", "hue_bridge_v2"] {
            assert!(CapabilityName::try_from(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_path_like_names_are_rejected() {
        for name in ["../etc", "a/b", "a\\b", "lamp.rs", "", "_lead", "9lives", "Lamp"] {
            let err = CapabilityName::try_from(name).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidName { .. }), "{name}");
        }
    }

    #[test]
    fn test_overlong_name_is_rejected() {
        let name = "a".repeat(65);
        assert!(CapabilityName::try_from(name).is_err());
        assert!(CapabilityName::try_from("a".repeat(64)).is_ok());
    }

    #[test]
    fn test_file_name_appends_extension() {
        let name = CapabilityName::try_from("square_root").unwrap();
        assert_eq!(name.file_name(), "square_root.rs");
    }

    #[test]
    fn test_serde_rejects_invalid_names() {
        let ok: CapabilityName = serde_json::from_str("\"lamp\"").unwrap();
        assert_eq!(ok.as_str(), "lamp");
        assert!(serde_json::from_str::<CapabilityName>("\"../lamp\"").is_err());
    }

    #[test]
    fn test_receipt_digest_is_stable() {
        let name = CapabilityName::try_from("lamp").unwrap();
        let a = InstallReceipt::new(name.clone(), "mem://lamp", "fn x() {}");
        let b = InstallReceipt::new(name, "mem://lamp", "fn x() {}");
        assert_eq!(a.source_digest, b.source_digest);
        assert_eq!(a.source_digest.len(), 64);
    }
}
