//! Graded validation reports.

use serde::{Deserialize, Serialize};

/// The five ordered validation levels. A candidate reaches level k only if
/// it passed every level below k.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Syntax = 1,
    Load = 2,
    Instantiation = 3,
    Interface = 4,
    Behavioral = 5,
}

impl ValidationLevel {
    pub const ALL: [ValidationLevel; 5] = [
        ValidationLevel::Syntax,
        ValidationLevel::Load,
        ValidationLevel::Instantiation,
        ValidationLevel::Interface,
        ValidationLevel::Behavioral,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ValidationLevel::Syntax => "syntax",
            ValidationLevel::Load => "load",
            ValidationLevel::Instantiation => "instantiation",
            ValidationLevel::Interface => "interface",
            ValidationLevel::Behavioral => "behavioral",
        }
    }
}

impl std::fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "level {} ({})", self.number(), self.name())
    }
}

/// Result of one attempted level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelResult {
    pub level: ValidationLevel,
    pub passed: bool,
}

/// Why a candidate stopped at a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub level: ValidationLevel,
    pub detail: String,
}

/// Tester verdict for one candidate.
///
/// Holds no timestamps, so validating the same candidate twice yields
/// equal reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub candidate_digest: String,
    /// Highest level passed, 0 when level 1 failed.
    pub level_reached: u8,
    /// Levels actually attempted, in order. Nothing above the failing level
    /// is present.
    pub levels: Vec<LevelResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ValidationFailure>,
}

impl ValidationReport {
    /// Report for a candidate that passed every level.
    pub fn passed(candidate_digest: impl Into<String>) -> Self {
        Self {
            candidate_digest: candidate_digest.into(),
            level_reached: ValidationLevel::Behavioral.number(),
            levels: ValidationLevel::ALL
                .iter()
                .map(|&level| LevelResult {
                    level,
                    passed: true,
                })
                .collect(),
            failure: None,
        }
    }

    /// Report for a candidate that failed at `level`.
    pub fn failed_at(
        candidate_digest: impl Into<String>,
        level: ValidationLevel,
        detail: impl Into<String>,
    ) -> Self {
        let mut levels: Vec<LevelResult> = ValidationLevel::ALL
            .iter()
            .take_while(|&&l| l < level)
            .map(|&l| LevelResult {
                level: l,
                passed: true,
            })
            .collect();
        levels.push(LevelResult {
            level,
            passed: false,
        });
        Self {
            candidate_digest: candidate_digest.into(),
            level_reached: level.number() - 1,
            levels,
            failure: Some(ValidationFailure {
                level,
                detail: detail.into(),
            }),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.failure.is_none() && self.level_reached == ValidationLevel::Behavioral.number()
    }

    pub fn failing_level(&self) -> Option<ValidationLevel> {
        self.failure.as_ref().map(|f| f.level)
    }

    /// One-line summary for feedback and logs.
    pub fn summary(&self) -> String {
        match &self.failure {
            None => "passed all 5 validation levels".to_string(),
            Some(f) => format!("failed at {}: {}", f.level, f.detail),
        }
    }
}
