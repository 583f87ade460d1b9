//! Shared health state for the /health endpoint.
//! Updated by the periodic VelocityAnalyzer run, read by the API.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};

#[derive(Default)]
pub struct HealthState {
    /// Unix seconds of the last completed periodic analysis (0 = none yet).
    pub last_analysis_at_secs: AtomicI64,
    /// Outcome of that analysis.
    pub last_analysis_ok: AtomicBool,
    /// Ranked entities in the last successful report.
    pub last_result_count: AtomicU64,
    pub analyses_failed: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, at_secs: i64, result_count: usize) {
        self.last_result_count.store(result_count as u64, Ordering::Relaxed);
        self.last_analysis_ok.store(true, Ordering::Relaxed);
        self.last_analysis_at_secs.store(at_secs, Ordering::Relaxed);
    }

    pub fn record_failure(&self, at_secs: i64) {
        self.analyses_failed.fetch_add(1, Ordering::Relaxed);
        self.last_analysis_ok.store(false, Ordering::Relaxed);
        self.last_analysis_at_secs.store(at_secs, Ordering::Relaxed);
    }

    pub fn last_analysis_at(&self) -> Option<DateTime<Utc>> {
        match self.last_analysis_at_secs.load(Ordering::Relaxed) {
            0 => None,
            secs => DateTime::from_timestamp(secs, 0),
        }
    }

    /// `None` until the first analysis has finished.
    pub fn last_analysis_ok(&self) -> Option<bool> {
        self.last_analysis_at()?;
        Some(self.last_analysis_ok.load(Ordering::Relaxed))
    }

    pub fn last_result_count(&self) -> u64 {
        self.last_result_count.load(Ordering::Relaxed)
    }

    pub fn analyses_failed(&self) -> u64 {
        self.analyses_failed.load(Ordering::Relaxed)
    }
}
