//! Operator abort control.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recorded operator abort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortRequest {
    pub operator: String,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// Cloneable handle an operator uses to stop a running forge.
///
/// The controller checks it before every transition; a stage already in
/// flight finishes first.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    inner: Arc<Mutex<Option<AbortRequest>>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort. The first request wins.
    pub fn abort(&self, operator: impl Into<String>, reason: impl Into<String>) {
        let mut slot = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(AbortRequest {
                operator: operator.into(),
                reason: reason.into(),
                requested_at: Utc::now(),
            });
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.request().is_some()
    }

    pub fn request(&self) -> Option<AbortRequest> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}
