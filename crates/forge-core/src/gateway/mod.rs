//! Language-model gateway.
//!
//! Every stage that needs text generation goes through [`LanguageModel`],
//! which maps a prompt role plus variables to raw model output. The
//! production implementation is [`ollama::OllamaGateway`]; tests use
//! `crate::fakes::ScriptedGateway`.

pub mod ollama;
pub mod prompts;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::GenerationError;

pub use ollama::{GatewayConfig, OllamaGateway};

/// Which prompt template a generation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    Researcher,
    Coder,
    Reviewer,
    Router,
    RouterRepair,
}

impl PromptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptRole::Researcher => "researcher",
            PromptRole::Coder => "coder",
            PromptRole::Reviewer => "reviewer",
            PromptRole::Router => "router",
            PromptRole::RouterRepair => "router_repair",
        }
    }
}

impl std::fmt::Display for PromptRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named values substituted into a prompt template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptVars(BTreeMap<String, String>);

impl PromptVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Text generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Render the template for `role` with `vars` and return the raw output.
    async fn generate(&self, role: PromptRole, vars: &PromptVars)
        -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_vars_overwrite_and_iterate_sorted() {
        let vars = PromptVars::new()
            .with("b", "2")
            .with("a", "1")
            .with("b", "3");
        assert_eq!(vars.get("b"), Some("3"));
        assert_eq!(vars.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_prompt_role_names() {
        assert_eq!(PromptRole::RouterRepair.to_string(), "router_repair");
    }
}
