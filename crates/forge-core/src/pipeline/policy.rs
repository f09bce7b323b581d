use serde::{Deserialize, Serialize};

use crate::stages::FeedbackWindow;

/// Default attempt budget per run.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Bounds for one forge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgePolicy {
    /// Attempt budget; values below 1 are treated as 1.
    pub max_attempts: u32,
    pub feedback: FeedbackWindow,
}

impl Default for ForgePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            feedback: FeedbackWindow::default(),
        }
    }
}

impl ForgePolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}
