use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::config::ANALYZER_INTERVAL_SECS;
use crate::error::{AppError, Result};
use crate::types::{AnalysisParams, EntityVelocity, TraceId, VelocityReport};
use crate::velocity::clip::clip_outliers;
use crate::velocity::compute::compute_velocities;
use crate::velocity::rank::select_top;
use crate::velocity::source::SnapshotSource;

/// Turns a window of snapshots into a ranked, outlier-clipped velocity list.
///
/// Stages run in order: load window, per-entity peak velocity, batch 99th-percentile
/// clip, top-N. Load and compute failures abort the run; clipping problems degrade
/// to unclipped values.
pub struct VelocityAnalyzer<S> {
    source: S,
    health: Option<Arc<HealthState>>,
}

impl<S: SnapshotSource> VelocityAnalyzer<S> {
    pub fn new(source: S) -> Self {
        Self { source, health: None }
    }

    /// Record each periodic run's outcome for the /health endpoint.
    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = Some(health);
        self
    }

    /// Runs against the current clock. The trace id carries a sequence suffix so
    /// concurrent runs started in the same second stay distinguishable.
    pub async fn analyze(&self, params: AnalysisParams) -> Result<VelocityReport> {
        self.analyze_traced(params, Utc::now(), TraceId::unique("velocity_analysis"))
            .await
    }

    /// `analyze` with an explicit clock; the window ends at `now`.
    pub async fn analyze_at(&self, params: AnalysisParams, now: DateTime<Utc>) -> Result<VelocityReport> {
        self.analyze_traced(params, now, TraceId::at("velocity_analysis", now))
            .await
    }

    async fn analyze_traced(
        &self,
        params: AnalysisParams,
        now: DateTime<Utc>,
        trace_id: TraceId,
    ) -> Result<VelocityReport> {
        info!(
            trace_id = %trace_id,
            job = "analyzer_velocity",
            window_hours = params.window_hours,
            top_n = params.top_n,
            "Starting velocity analysis"
        );

        match self.run_stages(params, now, &trace_id).await {
            Ok(results) => Ok(VelocityReport {
                timestamp: now,
                analysis_params: params,
                results,
            }),
            Err(e) => {
                error!(trace_id = %trace_id, job = "analyzer_velocity", "Velocity analysis failed: {e}");
                Err(AppError::Analysis {
                    trace_id: trace_id.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn run_stages(
        &self,
        params: AnalysisParams,
        now: DateTime<Utc>,
        trace_id: &TraceId,
    ) -> Result<Vec<EntityVelocity>> {
        let rows = self.source.load_window(params.window_hours, now, trace_id).await?;
        if rows.is_empty() {
            info!(trace_id = %trace_id, "No metrics data found in window");
            return Ok(Vec::new());
        }

        let velocities = compute_velocities(&rows, trace_id);
        if velocities.is_empty() {
            info!(trace_id = %trace_id, rows = rows.len(), "No entity qualified for velocity ranking");
            return Ok(Vec::new());
        }
        let total_videos = velocities.len();

        let clipped = clip_outliers(velocities, trace_id);
        let top = select_top(clipped, params.top_n);

        info!(
            trace_id = %trace_id,
            job = "analyzer_velocity",
            window_hours = params.window_hours,
            total_videos,
            top_results = top.len(),
            "Velocity analysis completed"
        );
        Ok(top)
    }
}

impl<S: SnapshotSource + 'static> VelocityAnalyzer<S> {
    /// Background loop: analyze every `ANALYZER_INTERVAL_SECS`, log the ranking,
    /// and keep going on failure.
    pub async fn run(self, params: AnalysisParams) {
        let mut interval = tokio::time::interval(Duration::from_secs(ANALYZER_INTERVAL_SECS));
        interval.tick().await; // consume immediate first tick

        loop {
            interval.tick().await;
            match self.analyze(params).await {
                Ok(report) => {
                    for (rank, r) in report.results.iter().enumerate() {
                        info!(
                            rank = rank + 1,
                            video_id = %r.entity_id,
                            views_per_min = r.views_per_min,
                            "#{} {:.1} views/min | {} ({})",
                            rank + 1,
                            r.views_per_min,
                            r.title,
                            r.channel,
                        );
                    }
                    if let Some(h) = &self.health {
                        h.record_success(report.timestamp.timestamp(), report.results.len());
                    }
                }
                Err(e) => {
                    warn!("Periodic velocity analysis failed: {e}");
                    if let Some(h) = &self.health {
                        h.record_failure(Utc::now().timestamp());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::velocity::source::fake::FakeSource;
    use crate::types::WindowRow;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap()
    }

    fn at(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 10, m, 0).unwrap()
    }

    fn row(id: &str, at: DateTime<Utc>, views: i64) -> WindowRow {
        WindowRow {
            entity_id: id.to_string(),
            captured_at: at,
            view_count: Some(views),
            title: format!("title {id}"),
            channel: "chan".to_string(),
        }
    }

    /// Four edge-case entities: steady growth, same-minute pair, decline, spike.
    fn fixture_rows() -> Vec<WindowRow> {
        vec![
            row("v1", at(0), 1000),
            row("v1", at(1), 1100),
            row("v1", at(2), 1250),
            row("v2", at(0), 2000),
            row("v2", at(0), 2100),
            row("v3", at(0), 3000),
            row("v3", at(1), 2900),
            row("v4", at(0), 100),
            row("v4", at(1), 100_000),
        ]
    }

    fn params(top_n: usize) -> AnalysisParams {
        AnalysisParams::new(3, top_n).unwrap()
    }

    #[tokio::test]
    async fn fixture_ranks_only_qualifying_entities() {
        let analyzer = VelocityAnalyzer::new(FakeSource::new(fixture_rows()));
        let report = analyzer.analyze_at(params(10), now()).await.unwrap();

        let ids: Vec<&str> = report.results.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["v4", "v1"]);
        assert_eq!(report.results[1].views_per_min, 150.0);
        // v4's raw 99_900 is capped at the batch p99 (between 150 and 99_900).
        let v4 = report.results[0].views_per_min;
        assert!(v4 < 99_900.0 && v4 > 150.0, "v4={v4}");
        assert_eq!(report.timestamp, now());
        assert_eq!(report.analysis_params, params(10));
    }

    #[tokio::test]
    async fn outlier_among_normal_entities_is_clipped() {
        let mut rows = vec![row("v4", at(0), 100), row("v4", at(1), 100_000)];
        for i in 0..10 {
            let id = format!("n{i}");
            rows.push(row(&id, at(0), 0));
            rows.push(row(&id, at(1), 100 + i * 10));
        }
        let analyzer = VelocityAnalyzer::new(FakeSource::new(rows));
        let report = analyzer.analyze_at(params(3), now()).await.unwrap();

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[0].entity_id, "v4");
        assert!(report.results[0].views_per_min < 99_900.0);
        assert_eq!(report.results[1].views_per_min, 190.0);
        assert_eq!(report.results[2].views_per_min, 180.0);
    }

    #[tokio::test]
    async fn fewer_qualifiers_than_top_n() {
        let rows = vec![
            row("a", at(0), 0),
            row("a", at(1), 10),
            row("b", at(0), 0),
            row("b", at(1), 30),
            row("c", at(0), 0),
            row("c", at(1), 20),
        ];
        let analyzer = VelocityAnalyzer::new(FakeSource::new(rows));
        let report = analyzer.analyze_at(params(10), now()).await.unwrap();
        let ids: Vec<&str> = report.results.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn empty_window_is_not_an_error() {
        let analyzer = VelocityAnalyzer::new(FakeSource::new(Vec::new()));
        let report = analyzer.analyze_at(params(10), now()).await.unwrap();
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn rows_outside_window_are_ignored() {
        let old = Utc.with_ymd_and_hms(2025, 1, 1, 7, 0, 0).unwrap();
        let rows = vec![row("stale", old, 0), row("stale", at(0), 5000)];
        let analyzer = VelocityAnalyzer::new(FakeSource::new(rows));
        let report = analyzer.analyze_at(params(10), now()).await.unwrap();
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn source_failure_carries_trace_id() {
        let analyzer = VelocityAnalyzer::new(FakeSource::failing());
        let err = analyzer.analyze_at(params(10), now()).await.unwrap_err();
        match err {
            AppError::Analysis { trace_id, source } => {
                assert_eq!(trace_id, "velocity_analysis_20250101_110000");
                assert!(matches!(*source, AppError::DataSource(_)));
            }
            other => panic!("expected Analysis error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sqlite_store_end_to_end() {
        use crate::db::SampleStore;
        use crate::types::{Snapshot, VideoMeta};

        let store = SampleStore::in_memory().await.unwrap();
        store
            .upsert_videos(&[VideoMeta {
                video_id: "v1".to_string(),
                title: Some("Launch".to_string()),
                channel: Some("Tech".to_string()),
                ..Default::default()
            }])
            .await
            .unwrap();
        let snaps: Vec<Snapshot> = [(0, 1000), (1, 1100), (2, 1250)]
            .into_iter()
            .map(|(m, views)| Snapshot {
                entity_id: "v1".to_string(),
                captured_at: at(m),
                view_count: views,
                like_count: 0,
                comment_count: 0,
            })
            .collect();
        store.insert_snapshots(&snaps).await.unwrap();

        let report = VelocityAnalyzer::new(store).analyze_at(params(10), now()).await.unwrap();
        assert_eq!(report.results.len(), 1);
        let r = &report.results[0];
        assert_eq!((r.title.as_str(), r.channel.as_str()), ("Launch", "Tech"));
        assert_eq!(r.views_per_min, 150.0);
        assert_eq!((r.data_points, r.valid_intervals), (3, 2));
    }

    #[tokio::test]
    async fn concurrent_runs_get_distinct_trace_ids() {
        let analyzer = VelocityAnalyzer::new(FakeSource::failing());
        let (a, b) = tokio::join!(analyzer.analyze(params(10)), analyzer.analyze(params(10)));

        let ids: Vec<String> = [a, b]
            .into_iter()
            .map(|r| r.unwrap_err().trace_id().map(str::to_string).unwrap())
            .collect();
        assert!(ids.iter().all(|id| id.starts_with("velocity_analysis_")));
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn maximal_window_keeps_all_rows() {
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let rows = vec![row("old", old, 0), row("old", at(0), 5000)];
        let analyzer = VelocityAnalyzer::new(FakeSource::new(rows));
        let params = AnalysisParams::new(u32::MAX, 10).unwrap();
        let report = analyzer.analyze_at(params, now()).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].entity_id, "old");
    }
}
