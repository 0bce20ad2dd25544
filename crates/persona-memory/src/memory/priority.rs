//! Slot priority.
//!
//! Priority is recomputed from slot state on demand rather than maintained
//! incrementally: the same slot and `now` always give the same value.

use chrono::{DateTime, Utc};

use super::MidTermSlot;

/// Upper bound on any computed priority.
pub const MAX_PRIORITY: f64 = 10.0;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;
const MILLIS_PER_DAY: f64 = 24.0 * MILLIS_PER_HOUR;

/// Compute the priority of a mid-term slot at `now`.
///
/// Frequent and recent access raise priority, a pin doubles it, and the
/// result is clamped to `[0, MAX_PRIORITY]`.
pub fn compute_priority(slot: &MidTermSlot, now: DateTime<Utc>) -> f64 {
    let age_ms = (now - slot.created_at).num_milliseconds() as f64;
    let age_days = (age_ms / MILLIS_PER_DAY).max(1.0);
    let access_freq = slot.access_count as f64 / age_days;

    let category_weight = slot.category.weight();
    let pin_boost = if slot.user_pinned { 2.0 } else { 1.0 };

    let idle_ms = (now - slot.last_accessed).num_milliseconds() as f64;
    let hours_idle = (idle_ms / MILLIS_PER_HOUR).max(1.0);
    let recency_boost = (1.5 - hours_idle / 72.0).clamp(0.5, 1.5);

    let cluster_boost = (1.0 + 0.1 * slot.cluster_size as f64).min(1.5);

    let priority = slot.base_relevance
        * (1.0 + access_freq)
        * category_weight
        * pin_boost
        * recency_boost
        * cluster_boost;

    if priority.is_nan() {
        return 0.0;
    }
    priority.clamp(0.0, MAX_PRIORITY)
}
