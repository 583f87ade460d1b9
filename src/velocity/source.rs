use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::types::{TraceId, WindowRow};

/// Read side of the sample store as seen by the velocity engine.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// All snapshots with `captured_at >= now - window_hours`, joined with entity
    /// metadata and ordered by `(entity_id, captured_at)`. No matching rows is an
    /// empty vec, not an error.
    async fn load_window(
        &self,
        window_hours: u32,
        now: DateTime<Utc>,
        trace_id: &TraceId,
    ) -> Result<Vec<WindowRow>>;
}

/// Earliest `captured_at` inside a window ending at `now`. `None` when the window
/// reaches past the representable time range, meaning every snapshot qualifies.
pub fn window_start(now: DateTime<Utc>, window_hours: u32) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(Duration::try_hours(i64::from(window_hours))?)
}
