use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::extract::{
    declared_capability_type, scenarios_from_metadata, split_json_block, strip_code_fences,
    truncate,
};
use super::Coder;
use crate::domain::{AttemptRecord, Candidate, GenerationError, ResearchBrief};
use crate::gateway::{LanguageModel, PromptRole, PromptVars};
use crate::tester::CONTRACT_SOURCE;

/// How much failure history the coder sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackWindow {
    /// Most recent attempts included.
    pub attempts: usize,
    /// Per-attempt cap on detail text, in chars.
    pub detail_chars: usize,
}

impl Default for FeedbackWindow {
    fn default() -> Self {
        Self {
            attempts: 3,
            detail_chars: 600,
        }
    }
}

impl FeedbackWindow {
    /// The tail of `history` this window admits.
    pub fn select<'a>(&self, history: &'a [AttemptRecord]) -> &'a [AttemptRecord] {
        let start = history.len().saturating_sub(self.attempts);
        &history[start..]
    }
}

/// Render failed attempts as a compact bullet list for the coder prompt.
pub fn render_feedback(records: &[AttemptRecord], detail_chars: usize) -> String {
    if records.is_empty() {
        return "None (first attempt).".to_string();
    }
    records
        .iter()
        .map(|r| {
            format!(
                "- attempt {} failed while {}: {}",
                r.attempt,
                r.stage,
                truncate(&r.summary, detail_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Coder backed by a language model.
pub struct LlmCoder {
    model: Arc<dyn LanguageModel>,
    window: FeedbackWindow,
}

impl LlmCoder {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self::with_window(model, FeedbackWindow::default())
    }

    pub fn with_window(model: Arc<dyn LanguageModel>, window: FeedbackWindow) -> Self {
        Self { model, window }
    }
}

#[async_trait]
impl Coder for LlmCoder {
    async fn write(
        &self,
        brief: &ResearchBrief,
        feedback: &[AttemptRecord],
        attempt: u32,
    ) -> Result<Candidate, GenerationError> {
        let scenarios = serde_json::to_string_pretty(&brief.scenarios)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let vars = PromptVars::new()
            .with("research_notes", &brief.notes)
            .with(
                "suggested_type",
                brief.suggested_type.as_deref().unwrap_or("choose one"),
            )
            .with("interface_definition", CONTRACT_SOURCE)
            .with(
                "feedback",
                render_feedback(self.window.select(feedback), self.window.detail_chars),
            )
            .with("scenarios", scenarios);

        let output = self.model.generate(PromptRole::Coder, &vars).await?;
        let (code, meta) = split_json_block(&output);
        let source = strip_code_fences(&code);
        if source.is_empty() {
            return Err(GenerationError::EmptyOutput {
                role: PromptRole::Coder.to_string(),
            });
        }

        let type_name = meta
            .as_ref()
            .and_then(|m| m.get("capability"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| declared_capability_type(&source))
            .or_else(|| brief.suggested_type.clone())
            .unwrap_or_default();
        if type_name.is_empty() {
            warn!(attempt, "coder output names no capability type");
        }

        let scenarios = meta
            .as_ref()
            .map(|m| scenarios_from_metadata(m, &format!("attempt{attempt}")))
            .unwrap_or_default();
        debug!(attempt, type_name = %type_name, scenarios = scenarios.len(), "candidate parsed");

        Ok(Candidate::new(type_name, source, scenarios, attempt))
    }
}
