use crate::types::EntityVelocity;

/// The `top_n` fastest entities, descending by `views_per_min`. The sort is stable,
/// so equal rates keep their encounter order. Fewer qualifiers than `top_n` returns
/// all of them.
pub fn select_top(mut results: Vec<EntityVelocity>, top_n: usize) -> Vec<EntityVelocity> {
    results.sort_by(|a, b| b.views_per_min.total_cmp(&a.views_per_min));
    results.truncate(top_n);
    results
}
