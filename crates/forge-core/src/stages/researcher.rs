use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::extract::{scenarios_from_metadata, split_json_block};
use super::Researcher;
use crate::capability::REQUIRED_OPERATIONS;
use crate::domain::{GenerationError, Requirement, ResearchBrief};
use crate::gateway::{LanguageModel, PromptRole, PromptVars};

/// Researcher backed by a language model.
pub struct LlmResearcher {
    model: Arc<dyn LanguageModel>,
}

impl LlmResearcher {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

fn interface_listing() -> Vec<String> {
    REQUIRED_OPERATIONS
        .iter()
        .map(|op| op.signature.to_string())
        .collect()
}

#[async_trait]
impl Researcher for LlmResearcher {
    async fn research(&self, requirement: &Requirement) -> Result<ResearchBrief, GenerationError> {
        let interface = interface_listing();
        let vars = PromptVars::new()
            .with("task_name", requirement.label())
            .with("task_description", &requirement.description)
            .with(
                "interface",
                format!("trait Capability {{\n    {};\n}}", interface.join(";\n    ")),
            );

        let output = self.model.generate(PromptRole::Researcher, &vars).await?;
        let (notes, meta) = split_json_block(&output);
        let notes = notes.trim().to_string();
        if notes.is_empty() && meta.is_none() {
            return Err(GenerationError::EmptyOutput {
                role: PromptRole::Researcher.to_string(),
            });
        }

        let suggested_type = meta
            .as_ref()
            .and_then(|m| m.get("capability_type"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let scenarios = meta
            .as_ref()
            .map(|m| scenarios_from_metadata(m, "brief"))
            .unwrap_or_default();
        debug!(
            scenarios = scenarios.len(),
            suggested_type = suggested_type.as_deref().unwrap_or(""),
            "research brief parsed"
        );

        Ok(ResearchBrief {
            notes,
            interface,
            suggested_type,
            scenarios,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedGateway;

    #[tokio::test]
    async fn test_brief_parses_scenarios_and_type() {
        let gateway = Arc::new(ScriptedGateway::new().respond(
            PromptRole::Researcher,
            "TECHNICAL NOTES\nUse f64::sqrt.\n```json\n{\"capability_type\": \"SquareRoot\", \"test_scenarios\": [{\"action\": \"sqrt\", \"parameters\": {\"number\": 9}, \"expected_result_contains\": \"3\"}]}\n```",
        ));
        let researcher = LlmResearcher::new(gateway.clone());
        let req = Requirement::new("square roots").unwrap().with_name("square_root");

        let brief = researcher.research(&req).await.unwrap();
        assert_eq!(brief.suggested_type.as_deref(), Some("SquareRoot"));
        assert_eq!(brief.scenarios.len(), 1);
        assert_eq!(brief.interface.len(), 4);
        assert!(brief.notes.contains("f64::sqrt"));

        let vars = gateway.last_vars(PromptRole::Researcher).unwrap();
        assert_eq!(vars.get("task_name"), Some("square_root"));
        assert!(vars.get("interface").unwrap().contains("health_check"));
    }

    #[tokio::test]
    async fn test_brief_without_metadata_has_no_scenarios() {
        let gateway = Arc::new(ScriptedGateway::new().respond(PromptRole::Researcher, "Just notes."));
        let brief = LlmResearcher::new(gateway)
            .research(&Requirement::new("x").unwrap())
            .await
            .unwrap();
        assert!(brief.scenarios.is_empty());
        assert_eq!(brief.suggested_type, None);
    }

    #[tokio::test]
    async fn test_gateway_error_propagates() {
        let gateway = Arc::new(
            ScriptedGateway::new().fail(PromptRole::Researcher, GenerationError::Timeout { seconds: 1 }),
        );
        let err = LlmResearcher::new(gateway)
            .research(&Requirement::new("x").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Timeout { seconds: 1 });
    }
}
