//! Global atomic counters for forge runs.
//!
//! Counters are incremented at the call site. Call [`Metrics::flush`] to
//! emit the current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    runs_started: AtomicU64,
    candidates_generated: AtomicU64,
    validation_failures: AtomicU64,
    review_rejections: AtomicU64,
    capabilities_published: AtomicU64,
    runs_exhausted: AtomicU64,
    runs_aborted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            candidates_generated: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            review_rejections: AtomicU64::new(0),
            capabilities_published: AtomicU64::new(0),
            runs_exhausted: AtomicU64::new(0),
            runs_aborted: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_runs_started(&self) {
        Self::bump(&self.runs_started, "runs_started");
    }

    pub fn inc_candidates(&self) {
        Self::bump(&self.candidates_generated, "candidates_generated");
    }

    pub fn inc_validation_failures(&self) {
        Self::bump(&self.validation_failures, "validation_failures");
    }

    pub fn inc_review_rejections(&self) {
        Self::bump(&self.review_rejections, "review_rejections");
    }

    pub fn inc_published(&self) {
        Self::bump(&self.capabilities_published, "capabilities_published");
    }

    pub fn inc_exhausted(&self) {
        Self::bump(&self.runs_exhausted, "runs_exhausted");
    }

    pub fn inc_aborted(&self) {
        Self::bump(&self.runs_aborted, "runs_aborted");
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_started = self.runs_started(),
            candidates_generated = self.candidates_generated(),
            validation_failures = self.validation_failures(),
            review_rejections = self.review_rejections(),
            capabilities_published = self.capabilities_published(),
            runs_exhausted = self.runs_exhausted(),
            runs_aborted = self.runs_aborted(),
        );
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn candidates_generated(&self) -> u64 {
        self.candidates_generated.load(Ordering::Relaxed)
    }

    pub fn validation_failures(&self) -> u64 {
        self.validation_failures.load(Ordering::Relaxed)
    }

    pub fn review_rejections(&self) -> u64 {
        self.review_rejections.load(Ordering::Relaxed)
    }

    pub fn capabilities_published(&self) -> u64 {
        self.capabilities_published.load(Ordering::Relaxed)
    }

    pub fn runs_exhausted(&self) -> u64 {
        self.runs_exhausted.load(Ordering::Relaxed)
    }

    pub fn runs_aborted(&self) -> u64 {
        self.runs_aborted.load(Ordering::Relaxed)
    }
}
