use std::collections::HashMap;

use tracing::{debug, info};

use crate::types::{EntityVelocity, TraceId, VelocitySample, WindowRow};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ComputeStats {
    pub entities: usize,
    /// Entities with fewer than two snapshots in the window.
    pub single_snapshot: usize,
    /// Entities whose every pair was discarded.
    pub no_valid_interval: usize,
    /// Pairs discarded for non-positive Δt, negative Δviews, missing counts, or a
    /// non-finite rate.
    pub discarded_pairs: usize,
}

/// Per-entity peak velocity over a window of snapshot rows.
///
/// Rows are grouped by entity in first-encounter order; each group is stably sorted
/// by `captured_at`, so unsorted or duplicated input is tolerated. Entities with
/// fewer than two snapshots or no valid interval produce nothing.
pub fn compute_velocities(rows: &[WindowRow], trace_id: &TraceId) -> Vec<EntityVelocity> {
    let (results, stats) = compute_with_stats(rows);
    info!(
        trace_id = %trace_id,
        entities = stats.entities,
        qualified = results.len(),
        single_snapshot = stats.single_snapshot,
        no_valid_interval = stats.no_valid_interval,
        discarded_pairs = stats.discarded_pairs,
        "Velocity computed"
    );
    results
}

pub fn compute_with_stats(rows: &[WindowRow]) -> (Vec<EntityVelocity>, ComputeStats) {
    let groups = group_by_entity(rows);
    let mut stats = ComputeStats {
        entities: groups.len(),
        ..Default::default()
    };
    let mut results = Vec::new();

    for mut group in groups {
        if group.len() < 2 {
            stats.single_snapshot += 1;
            continue;
        }
        group.sort_by_key(|r| r.captured_at);

        let samples = interval_samples(&group);
        stats.discarded_pairs += (group.len() - 1) - samples.len();

        let Some(peak) = samples.iter().max_by(|a, b| a.velocity.total_cmp(&b.velocity)) else {
            stats.no_valid_interval += 1;
            debug!(entity_id = %group[0].entity_id, "No valid interval");
            continue;
        };
        debug!(
            entity_id = %peak.entity_id,
            velocity = peak.velocity,
            delta_views = peak.delta_views,
            delta_t_minutes = peak.delta_t_minutes,
            "Peak interval"
        );

        let first = group[0];
        results.push(EntityVelocity {
            entity_id: first.entity_id.clone(),
            title: first.title.clone(),
            channel: first.channel.clone(),
            views_per_min: peak.velocity,
            data_points: group.len(),
            valid_intervals: samples.len(),
        });
    }

    (results, stats)
}

/// Valid velocity samples between consecutive snapshots of one entity. `group`
/// must already be ordered by `captured_at`.
pub fn interval_samples(group: &[&WindowRow]) -> Vec<VelocitySample> {
    group
        .windows(2)
        .filter_map(|pair| sample_between(pair[0], pair[1]))
        .collect()
}

fn sample_between(prev: &WindowRow, next: &WindowRow) -> Option<VelocitySample> {
    let delta_t_minutes = (next.captured_at - prev.captured_at).num_milliseconds() as f64 / 60_000.0;
    if delta_t_minutes <= 0.0 {
        return None;
    }
    let delta_views = next.view_count?.checked_sub(prev.view_count?)?;
    if delta_views < 0 {
        return None;
    }
    let velocity = delta_views as f64 / delta_t_minutes;
    if !velocity.is_finite() {
        return None;
    }
    Some(VelocitySample {
        entity_id: next.entity_id.clone(),
        delta_t_minutes,
        delta_views,
        velocity,
    })
}

fn group_by_entity(rows: &[WindowRow]) -> Vec<Vec<&WindowRow>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&WindowRow>> = Vec::new();
    for row in rows {
        let slot = *index.entry(row.entity_id.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }
    groups
}
