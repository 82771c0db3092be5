//! Season aggregate propagation.
//!
//! Point deltas from changed results are folded into per-participant season
//! stats with a zero floor. Each folded result leaves a marker keyed by result
//! id, so a rerun after a partially committed run does not count it twice.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use twox_hash::XxHash64;

use crate::constants::MARKER_SEED;
use crate::model::SeasonStats;
use crate::numbers::{round1, tenths};
use crate::rank::ResultChange;

/// A point change for one result, before season keys are checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointDelta {
    pub result_id: String,
    pub season_id: Option<String>,
    pub participant_id: Option<String>,
    pub slot_id: Option<String>,
    pub delta: f64,
    pub marker: String,
}

impl PointDelta {
    #[must_use]
    pub fn from_change(change: &ResultChange) -> Self {
        Self {
            result_id: change.result_id.clone(),
            season_id: change.season_id.clone(),
            participant_id: change.participant_id.clone(),
            slot_id: change.slot_id.clone(),
            delta: round1(change.patch.points - change.old_points),
            marker: revision_marker(&change.result_id, change.patch.points),
        }
    }

    /// Id of the season stats document this delta lands in, when keyed.
    #[must_use]
    pub fn stats_id(&self) -> Option<String> {
        let season = non_blank(self.season_id.as_ref())?;
        let participant = non_blank(self.participant_id.as_ref())?;
        Some(season_stats_id(season, participant))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationStats {
    pub deltas: usize,
    pub zero_skipped: usize,
    pub dropped_missing_keys: usize,
    pub already_applied: usize,
    pub floored: usize,
    pub upserts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Propagation {
    pub upserts: Vec<SeasonStats>,
    pub stats: PropagationStats,
}

/// Marker for "result `result_id` now holds `points`".
#[must_use]
pub fn revision_marker(result_id: &str, points: f64) -> String {
    let mut hasher = XxHash64::with_seed(MARKER_SEED);
    hasher.write(result_id.as_bytes());
    hasher.write(&tenths(points).to_le_bytes());
    format!("{:016x}", hasher.finish())
}

#[must_use]
pub fn season_stats_id(season_id: &str, participant_id: &str) -> String {
    format!("{season_id}_{participant_id}")
}

/// Apply one slot delta with the zero floor. Returns `true` when the floor
/// clipped either value.
pub fn apply_delta(stats: &mut SeasonStats, slot_id: &str, delta: f64) -> bool {
    apply_slot_deltas(stats, &BTreeMap::from([(slot_id.to_string(), delta)]), delta)
}

/// Apply accumulated slot deltas and their total, flooring each value once.
fn apply_slot_deltas(stats: &mut SeasonStats, by_slot: &BTreeMap<String, f64>, total: f64) -> bool {
    let mut floored = false;
    for (slot, delta) in by_slot {
        let value = stats.points_by_slot.entry(slot.clone()).or_insert(0.0);
        let raw = round1(*value + delta);
        floored |= raw < 0.0;
        *value = raw.max(0.0);
    }
    let raw_total = round1(stats.points_total + total);
    floored |= raw_total < 0.0;
    stats.points_total = raw_total.max(0.0);
    floored
}

#[derive(Debug, Default)]
struct Pending {
    season_id: String,
    participant_id: String,
    by_slot: BTreeMap<String, f64>,
    total: f64,
    markers: BTreeMap<String, String>,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Fold `deltas` into the current season stats.
///
/// Deltas for the same (season, participant) are accumulated first; each slot
/// and the total are then floored at 0 once.
#[must_use]
pub fn propagate(
    deltas: &[PointDelta],
    existing: &[SeasonStats],
    now: DateTime<Utc>,
) -> Propagation {
    let current: HashMap<&str, &SeasonStats> =
        existing.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut pending: BTreeMap<String, Pending> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut stats = PropagationStats::default();

    for delta in deltas {
        stats.deltas += 1;
        if tenths(delta.delta) == 0 {
            stats.zero_skipped += 1;
            continue;
        }
        let (Some(season), Some(participant), Some(slot)) = (
            non_blank(delta.season_id.as_ref()),
            non_blank(delta.participant_id.as_ref()),
            non_blank(delta.slot_id.as_ref()),
        ) else {
            warn!(
                "dropping delta {} for result {}: missing season, participant or slot id",
                delta.delta, delta.result_id
            );
            stats.dropped_missing_keys += 1;
            continue;
        };
        let id = season_stats_id(season, participant);
        let applied = current
            .get(id.as_str())
            .and_then(|s| s.applied.get(&delta.result_id))
            .is_some_and(|marker| marker == &delta.marker);
        if applied {
            debug!("result {} already folded into {id}", delta.result_id);
            stats.already_applied += 1;
            continue;
        }
        let entry = pending.entry(id.clone()).or_insert_with(|| {
            order.push(id.clone());
            Pending {
                season_id: season.to_string(),
                participant_id: participant.to_string(),
                ..Pending::default()
            }
        });
        *entry.by_slot.entry(slot.to_string()).or_insert(0.0) += delta.delta;
        entry.total += delta.delta;
        entry
            .markers
            .insert(delta.result_id.clone(), delta.marker.clone());
    }

    let mut upserts = Vec::with_capacity(order.len());
    for id in order {
        let Some(change) = pending.remove(&id) else {
            continue;
        };
        let mut next = current.get(id.as_str()).map_or_else(
            || SeasonStats {
                id: id.clone(),
                season_id: change.season_id.clone(),
                participant_id: change.participant_id.clone(),
                ..SeasonStats::default()
            },
            |s| (*s).clone(),
        );
        let floored = apply_slot_deltas(&mut next, &change.by_slot, change.total);
        if floored {
            warn!("season stats {id} clipped at zero");
            stats.floored += 1;
        }
        next.applied.extend(change.markers);
        next.updated_at = Some(now);
        upserts.push(next);
    }
    stats.upserts = upserts.len();
    Propagation { upserts, stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(result: &str, participant: &str, slot: &str, delta: f64) -> PointDelta {
        PointDelta {
            result_id: result.to_string(),
            season_id: Some("s24".to_string()),
            participant_id: Some(participant.to_string()),
            slot_id: Some(slot.to_string()),
            delta,
            marker: revision_marker(result, delta),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
    }

    #[test]
    fn negative_delta_floors_at_zero() {
        let mut stats = SeasonStats {
            points_total: 0.3,
            ..SeasonStats::default()
        };
        stats.points_by_slot.insert("week1".to_string(), 0.3);
        assert!(apply_delta(&mut stats, "week1", -0.6));
        assert!((stats.points_total - 0.0).abs() < f64::EPSILON);
        assert!((stats.points_by_slot["week1"] - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn propagation_floors_existing_totals() {
        let existing = SeasonStats {
            id: season_stats_id("s24", "p1"),
            season_id: "s24".to_string(),
            participant_id: "p1".to_string(),
            points_total: 0.3,
            points_by_slot: BTreeMap::from([("week1".to_string(), 0.3)]),
            ..SeasonStats::default()
        };
        let result = propagate(&[delta("r1", "p1", "week1", -0.6)], &[existing], now());
        assert_eq!(result.stats.floored, 1);
        let stats = &result.upserts[0];
        assert!((stats.points_total - 0.0).abs() < f64::EPSILON);
        assert!(stats.points_total.is_sign_positive());
    }

    #[test]
    fn deltas_accumulate_per_participant() {
        let deltas = vec![
            delta("r1", "p1", "week1", 1.3),
            delta("r2", "p1", "week2", 0.6),
            delta("r3", "p2", "week1", 1.0),
        ];
        let result = propagate(&deltas, &[], now());
        assert_eq!(result.upserts.len(), 2);
        let p1 = &result.upserts[0];
        assert_eq!(p1.id, "s24_p1");
        assert!((p1.points_total - 1.9).abs() < 1e-9);
        assert_eq!(p1.points_by_slot.len(), 2);
        assert_eq!(p1.applied.len(), 2);
    }

    #[test]
    fn zero_and_keyless_deltas_are_skipped() {
        let mut keyless = delta("r2", "p1", "week1", 1.0);
        keyless.slot_id = None;
        let deltas = vec![delta("r1", "p1", "week1", 0.0), keyless];
        let result = propagate(&deltas, &[], now());
        assert!(result.upserts.is_empty());
        assert_eq!(result.stats.zero_skipped, 1);
        assert_eq!(result.stats.dropped_missing_keys, 1);
    }

    #[test]
    fn applied_markers_prevent_double_counting() {
        let first = propagate(&[delta("r1", "p1", "week1", 1.3)], &[], now());
        let stored = first.upserts;
        let again = propagate(&[delta("r1", "p1", "week1", 1.3)], &stored, now());
        assert!(again.upserts.is_empty());
        assert_eq!(again.stats.already_applied, 1);
    }

    #[test]
    fn markers_track_points_revision() {
        assert_eq!(revision_marker("r1", 1.3), revision_marker("r1", 1.3));
        assert_ne!(revision_marker("r1", 1.3), revision_marker("r1", 1.6));
        assert_ne!(revision_marker("r1", 1.3), revision_marker("r2", 1.3));
    }
}
