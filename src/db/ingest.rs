use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::db::SampleStore;
use crate::error::Result;
use crate::types::{CollectedVideo, TraceId};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: usize,
    pub rejected: usize,
    pub videos_upserted: usize,
    pub snapshots_stored: usize,
}

/// Loads JSON-lines collector output: every video is upserted and gets one snapshot
/// at `now`. Blank lines are skipped; unparseable lines are counted and logged.
pub async fn ingest_lines<R>(
    store: &SampleStore,
    mut reader: R,
    now: DateTime<Utc>,
    trace_id: &TraceId,
) -> Result<IngestStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = IngestStats::default();
    let mut collected = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        // Invalid UTF-8 is one more malformed line, not a failed batch.
        let line = match std::str::from_utf8(&buf) {
            Ok(text) => text.trim(),
            Err(e) => {
                stats.lines += 1;
                stats.rejected += 1;
                warn!(trace_id = %trace_id, line = stats.lines, "Skipping non UTF-8 video record: {e}");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;
        match serde_json::from_str::<CollectedVideo>(line) {
            Ok(v) => collected.push(v),
            Err(e) => {
                stats.rejected += 1;
                warn!(trace_id = %trace_id, line = stats.lines, "Skipping malformed video record: {e}");
            }
        }
    }

    let metas: Vec<_> = collected.iter().map(|v| v.meta.clone()).collect();
    let snapshots: Vec<_> = collected.iter().map(|v| v.snapshot_at(now)).collect();

    stats.videos_upserted = store.upsert_videos(&metas).await?;
    stats.snapshots_stored = store.insert_snapshots(&snapshots).await?;

    info!(
        trace_id = %trace_id,
        job = "ingest",
        lines = stats.lines,
        rejected = stats.rejected,
        videos_upserted = stats.videos_upserted,
        snapshots_stored = stats.snapshots_stored,
        "Ingest completed"
    );
    Ok(stats)
}
