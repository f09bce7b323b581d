//! Attempt history and terminal outcomes of a forge run.

use capability_registry::CapabilityName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::candidate::{Candidate, ResearchBrief};
use super::report::ValidationReport;
use super::request::Requirement;

/// Controller states. `Done` is the only terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForgeStage {
    AwaitingApproval,
    Researching,
    Coding,
    Testing,
    Reviewing,
    Publishing,
    Done,
}

impl ForgeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ForgeStage::AwaitingApproval => "awaiting_approval",
            ForgeStage::Researching => "researching",
            ForgeStage::Coding => "coding",
            ForgeStage::Testing => "testing",
            ForgeStage::Reviewing => "reviewing",
            ForgeStage::Publishing => "publishing",
            ForgeStage::Done => "done",
        }
    }
}

impl std::fmt::Display for ForgeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer verdict on a candidate that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    Rejected { feedback: Vec<String> },
}

impl ReviewVerdict {
    pub fn rejected(feedback: impl Into<String>) -> Self {
        ReviewVerdict::Rejected {
            feedback: vec![feedback.into()],
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ReviewVerdict::Approved)
    }
}

/// One failed attempt: where it failed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub stage: ForgeStage,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ValidationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_digest: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(attempt: u32, stage: ForgeStage, summary: impl Into<String>) -> Self {
        Self {
            attempt,
            stage,
            summary: summary.into(),
            report: None,
            candidate_digest: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_report(mut self, report: ValidationReport) -> Self {
        self.candidate_digest = Some(report.candidate_digest.clone());
        self.report = Some(report);
        self
    }

    pub fn with_candidate(mut self, candidate: &Candidate) -> Self {
        self.candidate_digest = Some(candidate.digest.clone());
        self
    }
}

/// Why a run stopped without exhausting its budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    ApprovalMissing,
    RegistryConflict { name: String },
    RegistryWriteError { name: String, detail: String },
    InvalidName { declared: String, detail: String },
    Operator { message: String },
    SandboxUnavailable { detail: String },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::ApprovalMissing => write!(f, "approval missing"),
            AbortReason::RegistryConflict { name } => {
                write!(f, "capability `{name}` already exists in the registry")
            }
            AbortReason::RegistryWriteError { name, detail } => {
                write!(f, "registry write for `{name}` failed: {detail}")
            }
            AbortReason::InvalidName { declared, detail } => {
                write!(f, "cannot derive a capability name from `{declared}`: {detail}")
            }
            AbortReason::Operator { message } => write!(f, "aborted by operator: {message}"),
            AbortReason::SandboxUnavailable { detail } => {
                write!(f, "validation sandbox unavailable: {detail}")
            }
        }
    }
}

/// Terminal outcome of a forge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ForgeOutcome {
    Success {
        capability: CapabilityName,
        location: String,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_failure: Option<String>,
    },
    Aborted {
        reason: AbortReason,
    },
}

impl ForgeOutcome {
    pub fn tag(&self) -> &'static str {
        match self {
            ForgeOutcome::Success { .. } => "success",
            ForgeOutcome::Exhausted { .. } => "exhausted",
            ForgeOutcome::Aborted { .. } => "aborted",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ForgeOutcome::Success { .. })
    }

    pub fn capability(&self) -> Option<&CapabilityName> {
        match self {
            ForgeOutcome::Success { capability, .. } => Some(capability),
            _ => None,
        }
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            ForgeOutcome::Aborted { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Complete, auditable record of one forge run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeRun {
    pub run_id: Uuid,
    pub requirement: Requirement,
    pub outcome: ForgeOutcome,
    /// Attempts started, never more than the policy maximum.
    pub attempts: u32,
    /// Failed attempts, oldest first.
    pub history: Vec<AttemptRecord>,
    /// States visited, in order.
    pub trace: Vec<ForgeStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<ResearchBrief>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_candidate: Option<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_report: Option<ValidationReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ForgeRun {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::ValidationLevel;

    #[test]
    fn test_outcome_serde_tagged() {
        let outcome = ForgeOutcome::Aborted {
            reason: AbortReason::RegistryConflict {
                name: "lamp".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "aborted");
        assert_eq!(json["reason"]["reason"], "registry_conflict");

        let back: ForgeOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_attempt_record_with_report_carries_digest() {
        let report = ValidationReport::failed_at("abc", ValidationLevel::Load, "nope");
        let record = AttemptRecord::new(2, ForgeStage::Testing, report.summary()).with_report(report);
        assert_eq!(record.candidate_digest.as_deref(), Some("abc"));
        assert!(record.summary.contains("load"));
    }

    #[test]
    fn test_abort_reason_display() {
        let reason = AbortReason::InvalidName {
            declared: "9Lives".to_string(),
            detail: "name must start with a lowercase ascii letter".to_string(),
        };
        assert!(reason.to_string().contains("9Lives"));
        assert_eq!(AbortReason::ApprovalMissing.to_string(), "approval missing");
    }

    #[test]
    fn test_review_verdict_helpers() {
        assert!(ReviewVerdict::Approved.is_approved());
        let rejected = ReviewVerdict::rejected("handle negatives");
        assert!(!rejected.is_approved());
    }
}
