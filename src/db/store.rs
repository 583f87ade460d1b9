use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::models::WindowRecord;
use crate::error::{AppError, Result};
use crate::types::{Snapshot, TraceId, VideoMeta, WindowRow};
use crate::velocity::source::{window_start, SnapshotSource};

/// SQLite-backed sample store: video metadata plus append-only metric snapshots,
/// deduplicated on `(video_id, captured_at)`.
#[derive(Clone)]
pub struct SampleStore {
    pool: SqlitePool,
}

impl SampleStore {
    /// Opens (creating if missing) the database file and applies migrations.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database. A single connection, otherwise every pooled
    /// connection would see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Inserts or refreshes video metadata. Returns the number of videos written.
    pub async fn upsert_videos(&self, videos: &[VideoMeta]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for video in videos {
            let tags = serde_json::to_string(&video.tags)?;
            let published_at = video.published_at.map(|t| t.timestamp());
            sqlx::query(
                r#"
                INSERT INTO videos (
                    video_id, title, description, channel, category, tags, country_code, published_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(video_id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    channel = excluded.channel,
                    category = excluded.category,
                    tags = excluded.tags,
                    country_code = excluded.country_code,
                    published_at = excluded.published_at
                "#,
            )
            .bind(&video.video_id)
            .bind(&video.title)
            .bind(&video.description)
            .bind(&video.channel)
            .bind(&video.category)
            .bind(tags)
            .bind(&video.country_code)
            .bind(published_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(videos.len())
    }

    /// Appends snapshots, truncating `captured_at` to the minute. A snapshot whose
    /// `(video_id, captured_at)` already exists is skipped. Returns rows inserted.
    pub async fn insert_snapshots(&self, snapshots: &[Snapshot]) -> Result<usize> {
        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;
        for s in snapshots {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO video_metrics_snapshot
                    (video_id, captured_at, view_count, like_count, comment_count)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&s.entity_id)
            .bind(minute_floor(s.captured_at))
            .bind(s.view_count)
            .bind(s.like_count)
            .bind(s.comment_count)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;

        let skipped = snapshots.len() - inserted;
        if skipped > 0 {
            debug!(inserted, skipped, "Duplicate snapshots ignored");
        }
        Ok(inserted)
    }
}

#[async_trait]
impl SnapshotSource for SampleStore {
    async fn load_window(
        &self,
        window_hours: u32,
        now: DateTime<Utc>,
        trace_id: &TraceId,
    ) -> Result<Vec<WindowRow>> {
        let since = window_start(now, window_hours).map_or(i64::MIN, |t| t.timestamp());

        let records: Vec<WindowRecord> = sqlx::query_as(
            r#"
            SELECT
                s.video_id,
                s.captured_at,
                s.view_count,
                COALESCE(v.title, '') AS title,
                COALESCE(v.channel, '') AS channel
            FROM video_metrics_snapshot s
            JOIN videos v ON s.video_id = v.video_id
            WHERE s.captured_at >= ?
            ORDER BY s.video_id, s.captured_at
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DataSource)?;

        let rows = records
            .into_iter()
            .map(|r| {
                let captured_at = DateTime::from_timestamp(r.captured_at, 0).ok_or_else(|| {
                    AppError::DataSource(sqlx::Error::Decode(
                        format!("captured_at {} out of range for {}", r.captured_at, r.video_id).into(),
                    ))
                })?;
                Ok(WindowRow {
                    entity_id: r.video_id,
                    captured_at,
                    view_count: r.view_count,
                    title: r.title,
                    channel: r.channel,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            trace_id = %trace_id,
            rows = rows.len(),
            window_hours,
            "Fetched metrics window"
        );
        Ok(rows)
    }
}

fn minute_floor(t: DateTime<Utc>) -> i64 {
    let secs = t.timestamp();
    secs - secs.rem_euclid(60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, s).unwrap()
    }

    fn video(id: &str, title: &str) -> VideoMeta {
        VideoMeta {
            video_id: id.to_string(),
            title: Some(title.to_string()),
            channel: Some("channel".to_string()),
            ..Default::default()
        }
    }

    fn snap(id: &str, at: DateTime<Utc>, views: i64) -> Snapshot {
        Snapshot {
            entity_id: id.to_string(),
            captured_at: at,
            view_count: views,
            like_count: 0,
            comment_count: 0,
        }
    }

    async fn seeded_store() -> SampleStore {
        let store = SampleStore::in_memory().await.unwrap();
        store
            .upsert_videos(&[video("b", "Second"), video("a", "First")])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn duplicate_snapshot_is_ignored() {
        let store = seeded_store().await;
        let first = store.insert_snapshots(&[snap("a", t(10, 0, 0), 1000)]).await.unwrap();
        // Same minute after truncation: 10:00:30 -> 10:00:00.
        let second = store
            .insert_snapshots(&[snap("a", t(10, 0, 30), 1001)])
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM video_metrics_snapshot")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn window_is_filtered_and_ordered() {
        let store = seeded_store().await;
        store
            .insert_snapshots(&[
                snap("b", t(10, 1, 0), 20),
                snap("a", t(10, 2, 0), 12),
                snap("a", t(6, 0, 0), 1), // outside a 3h window ending at 11:00
                snap("b", t(10, 0, 0), 10),
                snap("a", t(10, 1, 0), 11),
            ])
            .await
            .unwrap();

        let rows = store
            .load_window(3, t(11, 0, 0), &TraceId::from("test"))
            .await
            .unwrap();

        let keys: Vec<(String, DateTime<Utc>)> = rows
            .iter()
            .map(|r| (r.entity_id.clone(), r.captured_at))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a".to_string(), t(10, 1, 0)),
                ("a".to_string(), t(10, 2, 0)),
                ("b".to_string(), t(10, 0, 0)),
                ("b".to_string(), t(10, 1, 0)),
            ]
        );
        assert_eq!(rows[0].title, "First");
        assert_eq!(rows[0].view_count, Some(11));
    }

    #[tokio::test]
    async fn window_boundary_is_inclusive() {
        let store = seeded_store().await;
        store.insert_snapshots(&[snap("a", t(8, 0, 0), 5)]).await.unwrap();
        let rows = store
            .load_window(3, t(11, 0, 0), &TraceId::from("test"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn empty_store_yields_empty_window() {
        let store = SampleStore::in_memory().await.unwrap();
        let rows = store
            .load_window(3, t(11, 0, 0), &TraceId::from("test"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn upsert_refreshes_metadata() {
        let store = seeded_store().await;
        store.upsert_videos(&[video("a", "Renamed")]).await.unwrap();
        store.insert_snapshots(&[snap("a", t(10, 0, 0), 1)]).await.unwrap();
        let rows = store
            .load_window(3, t(11, 0, 0), &TraceId::from("test"))
            .await
            .unwrap();
        assert_eq!(rows[0].title, "Renamed");
    }

    #[tokio::test]
    async fn closed_pool_surfaces_data_source_error() {
        let store = SampleStore::in_memory().await.unwrap();
        store.pool.close().await;
        let err = store
            .load_window(3, t(11, 0, 0), &TraceId::from("test"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DataSource(_)));
    }

    #[tokio::test]
    async fn maximal_window_returns_everything() {
        let store = seeded_store().await;
        store
            .insert_snapshots(&[snap("a", t(0, 0, 0), 1), snap("a", t(10, 0, 0), 2)])
            .await
            .unwrap();
        let rows = store
            .load_window(u32::MAX, t(11, 0, 0), &TraceId::from("test"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn analyzer_accepts_maximal_window() {
        use crate::types::AnalysisParams;
        use crate::velocity::VelocityAnalyzer;

        let store = seeded_store().await;
        let report = VelocityAnalyzer::new(store)
            .analyze(AnalysisParams::new(u32::MAX, 10).unwrap())
            .await
            .unwrap();
        assert!(report.results.is_empty());
    }
}
