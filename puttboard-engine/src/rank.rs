//! Cut-threshold rank scoring for ranked events.
//!
//! Every ranked participant earns [`BASE_PARTICIPATION_POINTS`]; ranks inside
//! the cut line also earn one bonus step per place from the line, so rank 1
//! earns the most.

use log::warn;
use serde::Serialize;

use crate::batch::{EventPatch, ResultPatch};
use crate::constants::BASE_PARTICIPATION_POINTS;
use crate::model::{RankEvent, ResultRecord};
use crate::numbers::{ceil_to_count, round1, sanitize};

const FIELD_EPSILON: f64 = 1e-9;

/// Scoring parameters resolved from config and operator flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringParams {
    pub default_cut_percent: f64,
    pub default_bonus_step: f64,
    pub bonus_step_override: Option<f64>,
    pub scoring_version: u32,
}

/// Event configuration after defaults and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEvent {
    pub participants_count: u32,
    pub cut_percent: f64,
    pub bonus_step: f64,
    pub scoring_version: u32,
    pub cut_count: u32,
}

/// Points for one ranked participant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankOutcome {
    pub qualifies: bool,
    pub cut_bonus: f64,
    pub points: f64,
}

/// A result whose stored points differ from the recomputed ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultChange {
    pub result_id: String,
    pub participant_id: Option<String>,
    pub season_id: Option<String>,
    pub slot_id: Option<String>,
    pub old_points: f64,
    pub patch: ResultPatch,
}

/// Everything scoring one event decided.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventScoring {
    pub event_id: String,
    /// `None` when the stored event already matches the resolved values.
    pub event_patch: Option<EventPatch>,
    pub changes: Vec<ResultChange>,
    pub unchanged: usize,
    pub skipped_unranked: usize,
    pub warnings: Vec<String>,
}

/// `ceil(participants * clamp(cut_percent, 0, 100) / 100)`.
#[must_use]
pub fn cut_count(participants_count: u32, cut_percent: f64) -> u32 {
    let pct = if cut_percent.is_finite() {
        cut_percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    if participants_count == 0 || pct == 0.0 {
        return 0;
    }
    let raw = f64::from(participants_count) * pct / 100.0;
    // Trim float noise so exact products (e.g. 10 * 30%) do not ceil upward.
    let trimmed = (raw * 1e9).round() / 1e9;
    ceil_to_count(trimmed)
}

/// Points for a present rank.
#[must_use]
pub fn score_rank(rank: u32, cut_count: u32, bonus_step: f64) -> RankOutcome {
    if rank >= 1 && rank <= cut_count {
        let step_count = cut_count - rank + 1;
        let cut_bonus = round1(f64::from(step_count) * sanitize(bonus_step));
        RankOutcome {
            qualifies: true,
            cut_bonus,
            points: round1(BASE_PARTICIPATION_POINTS + cut_bonus),
        }
    } else {
        RankOutcome {
            qualifies: false,
            cut_bonus: 0.0,
            points: BASE_PARTICIPATION_POINTS,
        }
    }
}

fn same(stored: Option<f64>, resolved: f64) -> bool {
    stored.is_some_and(|value| (value - resolved).abs() < FIELD_EPSILON)
}

/// Resolve an event's configuration against defaults.
///
/// `result_count` backs a missing participants count.
#[must_use]
pub fn resolve_event(event: &RankEvent, result_count: usize, params: &ScoringParams) -> ResolvedEvent {
    let participants_count = event
        .participants_count
        .unwrap_or_else(|| u32::try_from(result_count).unwrap_or(u32::MAX));
    let cut_percent = event
        .cut_percent
        .filter(|pct| pct.is_finite())
        .unwrap_or(params.default_cut_percent)
        .clamp(0.0, 100.0);
    let bonus_step = sanitize(
        params
            .bonus_step_override
            .or(event.bonus_step)
            .filter(|step| step.is_finite())
            .unwrap_or(params.default_bonus_step),
    );
    ResolvedEvent {
        participants_count,
        cut_percent,
        bonus_step,
        scoring_version: params.scoring_version,
        cut_count: cut_count(participants_count, cut_percent),
    }
}

fn event_patch(event: &RankEvent, resolved: &ResolvedEvent) -> Option<EventPatch> {
    let patch = EventPatch {
        participants_count: event
            .participants_count
            .is_none()
            .then_some(resolved.participants_count),
        cut_percent: (!same(event.cut_percent, resolved.cut_percent))
            .then_some(resolved.cut_percent),
        bonus_step: (!same(event.bonus_step, resolved.bonus_step)).then_some(resolved.bonus_step),
        scoring_version: (event.scoring_version != Some(resolved.scoring_version))
            .then_some(resolved.scoring_version),
    };
    (!patch.is_empty()).then_some(patch)
}

/// Score every result of `event`.
///
/// Results without a positive rank are left untouched. Results whose stored
/// values already match are counted as unchanged and produce no write.
#[must_use]
pub fn score_event(event: &RankEvent, results: &[&ResultRecord], params: &ScoringParams) -> EventScoring {
    let resolved = resolve_event(event, results.len(), params);
    let mut scoring = EventScoring {
        event_id: event.id.clone(),
        event_patch: event_patch(event, &resolved),
        ..EventScoring::default()
    };

    for result in results {
        let Some(rank) = result.rank() else {
            scoring.skipped_unranked += 1;
            continue;
        };
        if rank > resolved.participants_count {
            let message = format!(
                "event {}: result {} has rank {} beyond {} participants",
                event.id, result.id, rank, resolved.participants_count
            );
            warn!("{message}");
            scoring.warnings.push(message);
        }
        let outcome = score_rank(rank, resolved.cut_count, resolved.bonus_step);
        let unchanged = (result.points - outcome.points).abs() < FIELD_EPSILON
            && (result.cut_bonus - outcome.cut_bonus).abs() < FIELD_EPSILON
            && result.qualifies == Some(outcome.qualifies);
        if unchanged {
            scoring.unchanged += 1;
            continue;
        }
        scoring.changes.push(ResultChange {
            result_id: result.id.clone(),
            participant_id: result.participant_id.clone(),
            season_id: result.season_id.clone().or_else(|| event.season_id.clone()),
            slot_id: result.slot_id.clone().or_else(|| event.slot_id.clone()),
            old_points: sanitize(result.points),
            patch: ResultPatch {
                points: outcome.points,
                cut_bonus: outcome.cut_bonus,
                qualifies: outcome.qualifies,
            },
        });
    }
    scoring
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> ScoringParams {
        ScoringParams {
            default_cut_percent: 50.0,
            default_bonus_step: 0.1,
            bonus_step_override: None,
            scoring_version: 2,
        }
    }

    fn result(id: &str, rank: Option<i64>) -> ResultRecord {
        ResultRecord {
            id: id.to_string(),
            event_id: "e1".to_string(),
            participant_id: Some(format!("p-{id}")),
            rank: rank.map(|r| json!(r)),
            ..ResultRecord::default()
        }
    }

    #[test]
    fn cut_count_matches_formula() {
        assert_eq!(cut_count(8, 70.0), 6);
        assert_eq!(cut_count(10, 30.0), 3);
        assert_eq!(cut_count(0, 70.0), 0);
        assert_eq!(cut_count(8, 0.0), 0);
        assert_eq!(cut_count(8, 250.0), 8);
        assert_eq!(cut_count(8, -5.0), 0);
        assert_eq!(cut_count(8, f64::NAN), 0);
        assert_eq!(cut_count(3, 10.0), 1);
    }

    #[test]
    fn eight_players_seventy_percent() {
        let cut = cut_count(8, 70.0);
        let sixth = score_rank(6, cut, 0.3);
        assert!(sixth.qualifies);
        assert!((sixth.cut_bonus - 0.3).abs() < 1e-9);
        assert!((sixth.points - 1.3).abs() < 1e-9);

        let fifth = score_rank(5, cut, 0.3);
        assert!((fifth.cut_bonus - 0.6).abs() < 1e-9);
        assert!((fifth.points - 1.6).abs() < 1e-9);

        let seventh = score_rank(7, cut, 0.3);
        assert!(!seventh.qualifies);
        assert!((seventh.cut_bonus - 0.0).abs() < f64::EPSILON);
        assert!((seventh.points - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_bonus_step_earns_nothing_extra() {
        let outcome = score_rank(1, 4, -0.5);
        assert!(outcome.qualifies);
        assert!((outcome.points - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unranked_results_are_untouched() {
        let event = RankEvent {
            id: "e1".to_string(),
            ranked: true,
            participants_count: Some(4),
            cut_percent: Some(50.0),
            bonus_step: Some(0.2),
            scoring_version: Some(2),
            ..RankEvent::default()
        };
        let first = result("r1", Some(1));
        let missing = result("r2", None);
        let zero = result("r3", Some(0));
        let scoring = score_event(&event, &[&first, &missing, &zero], &params());
        assert_eq!(scoring.skipped_unranked, 2);
        assert_eq!(scoring.changes.len(), 1);
        assert!(scoring.event_patch.is_none());
        let change = &scoring.changes[0];
        assert!((change.patch.points - 1.4).abs() < 1e-9);
    }

    #[test]
    fn stamped_event_needs_no_field_updates() {
        let event = RankEvent {
            id: "e1".to_string(),
            ranked: true,
            participants_count: Some(8),
            cut_percent: Some(70.0),
            bonus_step: Some(0.3),
            scoring_version: Some(2),
            ..RankEvent::default()
        };
        let scoring = score_event(&event, &[], &params());
        assert!(scoring.event_patch.is_none());
    }

    #[test]
    fn unstamped_event_gets_only_differing_fields() {
        let event = RankEvent {
            id: "e1".to_string(),
            ranked: true,
            participants_count: Some(8),
            cut_percent: Some(70.0),
            bonus_step: None,
            scoring_version: Some(1),
            ..RankEvent::default()
        };
        let patch = score_event(&event, &[], &params()).event_patch.unwrap();
        assert_eq!(patch.participants_count, None);
        assert_eq!(patch.cut_percent, None);
        assert_eq!(patch.bonus_step, Some(0.1));
        assert_eq!(patch.scoring_version, Some(2));
    }

    #[test]
    fn missing_participants_count_falls_back_to_results() {
        let event = RankEvent {
            id: "e1".to_string(),
            ranked: true,
            ..RankEvent::default()
        };
        let results: Vec<ResultRecord> = (1..=4).map(|r| result(&format!("r{r}"), Some(r))).collect();
        let refs: Vec<&ResultRecord> = results.iter().collect();
        let scoring = score_event(&event, &refs, &params());
        let patch = scoring.event_patch.unwrap();
        assert_eq!(patch.participants_count, Some(4));
        assert_eq!(scoring.changes.len(), 4);
    }

    #[test]
    fn already_scored_results_are_unchanged() {
        let event = RankEvent {
            id: "e1".to_string(),
            ranked: true,
            participants_count: Some(2),
            cut_percent: Some(50.0),
            bonus_step: Some(0.5),
            scoring_version: Some(2),
            ..RankEvent::default()
        };
        let mut winner = result("r1", Some(1));
        winner.points = 1.5;
        winner.cut_bonus = 0.5;
        winner.qualifies = Some(true);
        let scoring = score_event(&event, &[&winner], &params());
        assert_eq!(scoring.unchanged, 1);
        assert!(scoring.changes.is_empty());
    }

    #[test]
    fn override_replaces_event_step() {
        let event = RankEvent {
            id: "e1".to_string(),
            ranked: true,
            participants_count: Some(2),
            cut_percent: Some(100.0),
            bonus_step: Some(0.5),
            scoring_version: Some(2),
            ..RankEvent::default()
        };
        let params = ScoringParams {
            bonus_step_override: Some(0.25),
            ..params()
        };
        let resolved = resolve_event(&event, 2, &params);
        assert!((resolved.bonus_step - 0.25).abs() < f64::EPSILON);
        let patch = score_event(&event, &[], &params).event_patch.unwrap();
        assert_eq!(patch.bonus_step, Some(0.25));
    }

    #[test]
    fn rank_beyond_field_warns_but_scores() {
        let event = RankEvent {
            id: "e1".to_string(),
            ranked: true,
            participants_count: Some(2),
            cut_percent: Some(50.0),
            bonus_step: Some(0.1),
            scoring_version: Some(2),
            ..RankEvent::default()
        };
        let straggler = result("r9", Some(9));
        let scoring = score_event(&event, &[&straggler], &params());
        assert_eq!(scoring.warnings.len(), 1);
        assert!((scoring.changes[0].patch.points - 1.0).abs() < f64::EPSILON);
    }
}
