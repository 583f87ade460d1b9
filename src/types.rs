use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_TOP_N, DEFAULT_WINDOW_HOURS};
use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Correlation id
// ---------------------------------------------------------------------------

static TRACE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Correlation identifier for one run or request: `<job>_<YYYYmmdd_HHMMSS>`.
/// Passed explicitly to every stage and attached to every log line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn new(job: &str) -> Self {
        Self::at(job, Utc::now())
    }

    pub fn at(job: &str, now: DateTime<Utc>) -> Self {
        Self(format!("{job}_{}", now.format("%Y%m%d_%H%M%S")))
    }

    /// Like `new`, with a process-wide sequence suffix so concurrent requests in the
    /// same second stay distinguishable.
    pub fn unique(job: &str) -> Self {
        let seq = TRACE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}_{seq:06}", Self::new(job).0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Sample store records
// ---------------------------------------------------------------------------

/// Static metadata of a tracked video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub video_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// One timestamped observation of an entity's cumulative counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entity_id: String,
    pub captured_at: DateTime<Utc>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
}

/// One line of collector output: metadata plus the counters observed at collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedVideo {
    #[serde(flatten)]
    pub meta: VideoMeta,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub comment_count: i64,
}

impl CollectedVideo {
    pub fn snapshot_at(&self, captured_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            entity_id: self.meta.video_id.clone(),
            captured_at,
            view_count: self.view_count,
            like_count: self.like_count,
            comment_count: self.comment_count,
        }
    }
}

/// One row of an analysis window: a snapshot joined with its entity's metadata.
/// `view_count` is nullable in the store; pairs touching a missing count are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRow {
    pub entity_id: String,
    pub captured_at: DateTime<Utc>,
    pub view_count: Option<i64>,
    pub title: String,
    pub channel: String,
}

// ---------------------------------------------------------------------------
// Velocity results
// ---------------------------------------------------------------------------

/// Rate between two consecutive snapshots of the same entity.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocitySample {
    pub entity_id: String,
    pub delta_t_minutes: f64,
    pub delta_views: i64,
    pub velocity: f64,
}

/// Per-entity outcome of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityVelocity {
    #[serde(rename = "video_id")]
    pub entity_id: String,
    pub title: String,
    pub channel: String,
    /// Peak views-per-minute across valid intervals, after outlier clipping.
    pub views_per_min: f64,
    /// Raw snapshots seen for this entity in the window.
    pub data_points: usize,
    /// Consecutive snapshot pairs that produced a usable velocity.
    pub valid_intervals: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub window_hours: u32,
    pub top_n: usize,
}

impl AnalysisParams {
    pub fn new(window_hours: u32, top_n: usize) -> Result<Self> {
        if window_hours == 0 {
            return Err(AppError::Config("window_hours must be greater than 0".to_string()));
        }
        if top_n == 0 {
            return Err(AppError::Config("top_n must be greater than 0".to_string()));
        }
        Ok(Self { window_hours, top_n })
    }
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            window_hours: DEFAULT_WINDOW_HOURS,
            top_n: DEFAULT_TOP_N,
        }
    }
}

/// Output envelope of one analysis run, as written by the CLI and served by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityReport {
    pub timestamp: DateTime<Utc>,
    pub analysis_params: AnalysisParams,
    pub results: Vec<EntityVelocity>,
}
