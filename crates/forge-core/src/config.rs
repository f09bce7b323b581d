//! Forge configuration: defaults, an optional TOML file, then environment
//! overrides.
//!
//! Recognized variables:
//! - `FORGE_MAX_ATTEMPTS`
//! - `FORGE_REGISTRY_DIR`, `FORGE_ARTIFACTS_DIR`
//! - `OLLAMA_URL`, `OLLAMA_TIMEOUT_SECS`, `FORGE_MODEL`, `FORGE_SEED`
//! - `FORGE_SANDBOX_DIR`, `FORGE_SANDBOX_OFFLINE`

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{ForgeError, Result};
use crate::gateway::GatewayConfig;
use crate::pipeline::{ForgePolicy, DEFAULT_MAX_ATTEMPTS};
use crate::stages::FeedbackWindow;
use crate::tester::SandboxConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub max_attempts: u32,
    pub feedback: FeedbackWindow,
    /// Directory the filesystem registry installs modules into.
    pub registry_dir: PathBuf,
    /// Directory run artifacts are written to.
    pub artifacts_dir: PathBuf,
    pub gateway: GatewayConfig,
    pub sandbox: SandboxConfig,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            feedback: FeedbackWindow::default(),
            registry_dir: PathBuf::from("capabilities"),
            artifacts_dir: PathBuf::from(".forge/runs"),
            gateway: GatewayConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ForgeError::Config(format!("{key}: cannot parse `{raw}`")))
}

impl ForgeConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ForgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ForgeError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, then validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FORGE_MAX_ATTEMPTS") {
            self.max_attempts = parse_var("FORGE_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("FORGE_REGISTRY_DIR") {
            self.registry_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FORGE_ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OLLAMA_URL") {
            self.gateway.endpoint = v;
        }
        if let Some(v) = lookup("OLLAMA_TIMEOUT_SECS") {
            self.gateway.timeout_secs = parse_var("OLLAMA_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("FORGE_MODEL") {
            self.gateway.model = v;
        }
        if let Some(v) = lookup("FORGE_SEED") {
            self.gateway.seed = Some(parse_var("FORGE_SEED", &v)?);
        }
        if let Some(v) = lookup("FORGE_SANDBOX_DIR") {
            self.sandbox.work_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FORGE_SANDBOX_OFFLINE") {
            self.sandbox.offline = matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ForgeError::Config("max_attempts must be at least 1".into()));
        }
        if self.feedback.attempts == 0 {
            return Err(ForgeError::Config(
                "feedback.attempts must be at least 1".into(),
            ));
        }
        let endpoint = self.gateway.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ForgeError::Config(format!(
                "gateway.endpoint must be an http(s) URL, got `{endpoint}`"
            )));
        }
        if self.gateway.model.trim().is_empty() {
            return Err(ForgeError::Config("gateway.model is empty".into()));
        }
        if self.gateway.timeout_secs == 0
            || self.sandbox.build_timeout_secs == 0
            || self.sandbox.run_timeout_secs == 0
        {
            return Err(ForgeError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn policy(&self) -> ForgePolicy {
        ForgePolicy {
            max_attempts: self.max_attempts,
            feedback: self.feedback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ForgeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.policy().budget(), 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ForgeConfig::from_toml_str(
            r#"
max_attempts = 3
registry_dir = "/srv/caps"

[gateway]
model = "llama3"

[feedback]
detail_chars = 200
"#,
        )
        .unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.registry_dir, PathBuf::from("/srv/caps"));
        assert_eq!(config.gateway.model, "llama3");
        assert_eq!(config.gateway.timeout_secs, 120);
        assert_eq!(config.feedback.detail_chars, 200);
        assert_eq!(config.feedback.attempts, 3);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ForgeConfig::from_toml_str("max_attempts = \"many\"").unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
        let err = ForgeConfig::from_toml_str("max_attempts = 0").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ForgeConfig::default();
        config
            .apply_overrides(lookup(&[
                ("FORGE_MAX_ATTEMPTS", "2"),
                ("OLLAMA_URL", "http://gpu-box:11434"),
                ("FORGE_SEED", "42"),
                ("FORGE_SANDBOX_OFFLINE", "true"),
            ]))
            .unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.gateway.endpoint, "http://gpu-box:11434");
        assert_eq!(config.gateway.seed, Some(42));
        assert!(config.sandbox.offline);
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let mut config = ForgeConfig::default();
        let err = config
            .apply_overrides(lookup(&[("FORGE_MAX_ATTEMPTS", "five")]))
            .unwrap_err();
        assert!(err.to_string().contains("FORGE_MAX_ATTEMPTS"));

        let mut config = ForgeConfig::default();
        let err = config
            .apply_overrides(lookup(&[("OLLAMA_URL", "gpu-box:11434")]))
            .unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forge.toml");
        std::fs::write(&path, "artifacts_dir = \"runs\"\n").unwrap();
        let config = ForgeConfig::load(&path).unwrap();
        assert_eq!(config.artifacts_dir, PathBuf::from("runs"));

        let err = ForgeConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
    }
}
