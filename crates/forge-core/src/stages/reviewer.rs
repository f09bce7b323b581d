use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::extract::truncate;
use super::Reviewer;
use crate::domain::{
    Candidate, GenerationError, Requirement, ResearchBrief, ReviewVerdict, ValidationReport,
};
use crate::gateway::{LanguageModel, PromptRole, PromptVars};
use crate::tester::security;

/// Source patterns a capability module must never contain.
const FORBIDDEN_PATTERNS: [(&str, &str); 7] = [
    ("unsafe", "uses `unsafe` code"),
    ("std::process", "spawns processes"),
    ("process::Command", "spawns processes"),
    ("std::net", "opens network connections"),
    ("std::fs", "touches the file system"),
    ("std::env::set_var", "mutates the process environment"),
    ("std::ptr", "manipulates raw pointers"),
];

/// Plain-text screen for sources that do not parse.
fn text_findings(source: &str) -> Vec<String> {
    let compact: String = source.chars().filter(|c| !c.is_whitespace()).collect();
    let mut findings: Vec<String> = Vec::new();
    for (pattern, finding) in FORBIDDEN_PATTERNS {
        let hit = if pattern.contains("::") {
            compact.contains(pattern)
        } else {
            source
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .any(|word| word == pattern)
        };
        if hit && !findings.iter().any(|f| f.ends_with(finding)) {
            findings.push(format!("security: module {finding}"));
        }
    }
    findings
}

/// Static findings that reject a module before any model review.
///
/// The tester already rejects these at level 2; the reviewer repeats the
/// screen so a custom validator cannot let them through.
pub fn security_findings(source: &str) -> Vec<String> {
    security::screen_source(source).unwrap_or_else(|| text_findings(source))
}

/// Interpret reviewer output: an `APPROVED` first line approves, anything
/// else is feedback.
fn parse_verdict(output: &str) -> ReviewVerdict {
    let first = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let head = first.trim_matches(|c: char| !c.is_ascii_alphabetic());
    if head.eq_ignore_ascii_case("approved") {
        return ReviewVerdict::Approved;
    }

    let bullets: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter_map(|l| {
            l.strip_prefix("- ")
                .or_else(|| l.strip_prefix("* "))
                .or_else(|| {
                    let digits = l.trim_start_matches(|c: char| c.is_ascii_digit());
                    if digits.len() < l.len() {
                        digits.strip_prefix(". ").or_else(|| digits.strip_prefix(") "))
                    } else {
                        None
                    }
                })
        })
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    if bullets.is_empty() {
        ReviewVerdict::rejected(truncate(output.trim(), 800))
    } else {
        ReviewVerdict::Rejected { feedback: bullets }
    }
}

/// Reviewer backed by a language model, with a static security screen.
pub struct LlmReviewer {
    model: Arc<dyn LanguageModel>,
}

impl LlmReviewer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Reviewer for LlmReviewer {
    async fn review(
        &self,
        requirement: &Requirement,
        candidate: &Candidate,
        brief: &ResearchBrief,
        report: &ValidationReport,
    ) -> Result<ReviewVerdict, GenerationError> {
        let findings = security_findings(&candidate.source);
        if !findings.is_empty() {
            info!(
                candidate = %candidate.short_digest(),
                findings = findings.len(),
                "candidate rejected by security screen"
            );
            return Ok(ReviewVerdict::Rejected { feedback: findings });
        }

        let vars = PromptVars::new()
            .with("requirement", &requirement.description)
            .with("research_notes", &brief.notes)
            .with("validation", report.summary())
            .with("code_draft", &candidate.source);
        let output = self.model.generate(PromptRole::Reviewer, &vars).await?;
        let verdict = parse_verdict(&output);
        debug!(candidate = %candidate.short_digest(), approved = verdict.is_approved(), "review parsed");
        Ok(verdict)
    }
}
