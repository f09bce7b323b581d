//! Research briefs, candidate modules and their test scenarios.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::capability::{Command, CommandStatus};

/// Expected result of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    #[serde(default = "default_status")]
    pub status: CommandStatus,
    /// Substring that must appear in the serialized response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
}

fn default_status() -> CommandStatus {
    CommandStatus::Success
}

impl Default for Expectation {
    fn default() -> Self {
        Self {
            status: CommandStatus::Success,
            contains: None,
        }
    }
}

/// A behavioral test case: a command and what its response must look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub command: Command,
    #[serde(default)]
    pub expect: Expectation,
}

impl Scenario {
    pub fn new(name: impl Into<String>, command: Command) -> Self {
        Self {
            name: name.into(),
            command,
            expect: Expectation::default(),
        }
    }

    pub fn expecting(mut self, contains: impl Into<String>) -> Self {
        self.expect.contains = Some(contains.into());
        self
    }

    pub fn expecting_status(mut self, status: CommandStatus) -> Self {
        self.expect.status = status;
        self
    }
}

/// The researcher's plan for a capability. Produced once per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchBrief {
    /// Free-form implementation notes.
    pub notes: String,
    /// Contract operations the module has to provide.
    pub interface: Vec<String>,
    /// Suggested name for the capability type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_type: Option<String>,
    /// Scenarios every candidate of this run must satisfy.
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

/// One generated capability module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Type the module claims to implement `Capability` for.
    pub type_name: String,
    pub source: String,
    /// Scenarios the coder proposed alongside the code.
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    /// Attempt that produced this candidate.
    pub attempt: u32,
    /// SHA-256 over type name and source.
    pub digest: String,
}

impl Candidate {
    pub fn new(
        type_name: impl Into<String>,
        source: impl Into<String>,
        scenarios: Vec<Scenario>,
        attempt: u32,
    ) -> Self {
        let type_name = type_name.into();
        let source = source.into();
        let digest = candidate_digest(&type_name, &source);
        Self {
            type_name,
            source,
            scenarios,
            attempt,
            digest,
        }
    }

    /// First 12 hex chars of the digest, for logs and directory names.
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

/// Digest of what gets compiled. Scenarios and the attempt number are
/// excluded; sandbox scaffolds and build artifacts are keyed by it.
fn candidate_digest(type_name: &str, source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(type_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_digest_ignores_attempt() {
        let a = Candidate::new("Lamp", "struct Lamp;", vec![], 1);
        let b = Candidate::new("Lamp", "struct Lamp;", vec![], 4);
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.digest.len(), 64);
        assert_eq!(a.short_digest().len(), 12);
    }

    #[test]
    fn test_candidate_digest_ignores_scenarios() {
        let a = Candidate::new("Lamp", "struct Lamp;", vec![], 1);
        let b = Candidate::new(
            "Lamp",
            "struct Lamp;",
            vec![Scenario::new("on", Command::new("turn_on", "lamp.hall"))],
            1,
        );
        assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn test_candidate_digest_covers_type_name() {
        let a = Candidate::new("Lamp", "struct Lamp; struct Fan;", vec![], 1);
        let b = Candidate::new("Fan", "struct Lamp; struct Fan;", vec![], 1);
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_scenario_expectation_defaults_to_success() {
        let s: Scenario =
            serde_json::from_str(r#"{"name":"ping","command":{"action":"ping"}}"#).unwrap();
        assert_eq!(s.expect.status, CommandStatus::Success);
        assert_eq!(s.expect.contains, None);
    }
}
