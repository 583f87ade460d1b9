/// Database row types matching `migrations/0001_init.sql`.
/// Timestamps are stored as INTEGER unix seconds (UTC).

/// Snapshot joined with its video's title and channel, as read for a window.
#[derive(Debug, sqlx::FromRow)]
pub struct WindowRecord {
    pub video_id: String,
    pub captured_at: i64,
    pub view_count: Option<i64>,
    pub title: String,
    pub channel: String,
}
