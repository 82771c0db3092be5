//! Stored document shapes shared by every stage of a run.
//!
//! Raw sessions are authored by the gameplay client and arrive in several
//! legacy shapes, so their per-player structures stay loosely typed and are
//! only interpreted through [`crate::score`] and [`crate::presence`].
//! Everything the engine writes is strongly typed.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::numbers::count_u32;

/// Closed set of game families the engine distinguishes.
///
/// Unknown types are kept verbatim (normalized) so they still reconcile
/// under the default variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GameType {
    /// Distance ladder: climb after each made turn.
    Ladder,
    /// Consecutive makes from a fixed distance.
    Streak,
    /// Circuit or loop around fixed stations.
    Circuit,
    Other(String),
}

impl GameType {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "ladder" | "ladder_putt" | "ladder_putting" => Self::Ladder,
            "streak" | "streak_challenge" | "putting_streak" => Self::Streak,
            "circuit" | "loop" | "around_the_world" => Self::Circuit,
            "" => Self::Other("unknown".to_string()),
            _ => Self::Other(normalized),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ladder => "ladder",
            Self::Streak => "streak",
            Self::Circuit => "circuit",
            Self::Other(name) => name,
        }
    }
}

impl Default for GameType {
    fn default() -> Self {
        Self::Other("unknown".to_string())
    }
}

impl From<String> for GameType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<GameType> for String {
    fn from(value: GameType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One gameplay record with per-player raw statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSession {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub game_type: GameType,
    /// RFC 3339 string, epoch milliseconds or `{ seconds, nanoseconds }`.
    pub date_time: Option<Value>,
    /// Variant configuration (`discsPerTurn`, `distance`, ...).
    #[serde(deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,
    /// Roster list; non-string members are ignored.
    #[serde(deserialize_with = "lenient_names")]
    pub players: Vec<String>,
    #[serde(deserialize_with = "lenient_map")]
    pub player_uids: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_map")]
    pub player_emails: BTreeMap<String, String>,
    /// Total points per player; either a number or `{ "total": n }`.
    #[serde(deserialize_with = "null_as_default")]
    pub scores: BTreeMap<String, Value>,
    /// Putt lists per player.
    #[serde(deserialize_with = "lenient_map")]
    pub putts: BTreeMap<String, Vec<Value>>,
    /// Live aggregate counters per player.
    #[serde(deserialize_with = "lenient_map")]
    pub live_stats: BTreeMap<String, Map<String, Value>>,
    /// Cumulative per-type state snapshots per player.
    #[serde(deserialize_with = "lenient_map")]
    pub player_states: BTreeMap<String, Map<String, Value>>,
}

impl RawSession {
    /// Session timestamp, tolerating string and millisecond encodings.
    #[must_use]
    pub fn event_date(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.date_time.as_ref()?)
    }
}

/// Read an explicit `null` as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamp in any shape [`parse_timestamp`] understands; anything else is `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(parse_timestamp))
}

/// Keyed map whose `null` or mis-shaped values are dropped entry by entry.
fn lenient_map<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(player, value)| {
            T::deserialize(value).ok().map(|parsed| (player, parsed))
        })
        .collect())
}

fn lenient_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|value| match value {
            Value::String(name) => Some(name),
            _ => None,
        })
        .collect())
}

pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(obj) => {
            // Exported store timestamps: { "seconds": .., "nanoseconds": .. }
            let seconds = obj.get("seconds").and_then(Value::as_i64)?;
            let nanos = obj
                .get("nanoseconds")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, nanos).single()
        }
        _ => None,
    }
}

/// Canonical player identity from the identity directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIdentity {
    pub canonical_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl PlayerIdentity {
    #[must_use]
    pub fn unresolved(raw_name: &str) -> Self {
        Self {
            canonical_name: raw_name.trim().to_string(),
            ..Self::default()
        }
    }
}

/// Variant payload stored on a leaderboard entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discs_per_turn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak_distance: Option<f64>,
}

impl VariantFields {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.discs_per_turn.is_none() && self.streak_distance.is_none()
    }
}

/// A canonical leaderboard row owned by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaderboardEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub game_type: GameType,
    #[serde(deserialize_with = "null_as_default")]
    pub leaderboard_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_uid: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub player_email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub player_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_gender: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub score: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub accuracy: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub made_putts: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub total_putts: u32,
    #[serde(flatten)]
    pub variant: VariantFields,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A ranked competition event inside a season slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub season_id: Option<String>,
    pub slot_id: Option<String>,
    /// Only ranked events are scored.
    #[serde(deserialize_with = "null_as_default")]
    pub ranked: bool,
    pub participants_count: Option<u32>,
    pub cut_percent: Option<f64>,
    pub bonus_step: Option<f64>,
    pub scoring_version: Option<u32>,
}

/// One participant's result in a ranked event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResultRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub event_id: String,
    pub participant_id: Option<String>,
    /// Legacy rows carry ranks as floats or strings.
    pub rank: Option<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub points: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub cut_bonus: f64,
    pub qualifies: Option<bool>,
    pub season_id: Option<String>,
    pub slot_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub player_name: String,
}

impl ResultRecord {
    /// Positive integral rank, or `None` when absent or unusable.
    #[must_use]
    pub fn rank(&self) -> Option<u32> {
        let raw = match self.rank.as_ref()? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if !raw.is_finite() || raw < 1.0 || raw.fract() != 0.0 {
            return None;
        }
        Some(count_u32(raw)).filter(|rank| *rank >= 1)
    }
}

/// Season aggregate per participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeasonStats {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub season_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub participant_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub points_total: f64,
    #[serde(deserialize_with = "lenient_map")]
    pub points_by_slot: BTreeMap<String, f64>,
    /// Result id -> marker of the points revision already folded in.
    #[serde(deserialize_with = "lenient_map")]
    pub applied: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn game_type_parses_aliases() {
        assert_eq!(GameType::parse(" Ladder-Putt "), GameType::Ladder);
        assert_eq!(GameType::parse("loop"), GameType::Circuit);
        assert_eq!(GameType::parse("Streak Challenge"), GameType::Streak);
        assert_eq!(
            GameType::parse("Twenty One"),
            GameType::Other("twenty_one".to_string())
        );
        assert_eq!(GameType::parse("  ").as_str(), "unknown");
    }

    #[test]
    fn session_tolerates_legacy_shapes() {
        let session: RawSession = serde_json::from_value(json!({
            "id": "s1",
            "gameType": "around-the-world",
            "dateTime": 1_700_000_000_000_i64,
            "liveStats": { "Ana": { "madePutts": 3 } }
        }))
        .unwrap();
        assert_eq!(session.game_type, GameType::Circuit);
        assert!(session.players.is_empty());
        assert_eq!(
            session.event_date().map(|d| d.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn timestamps_accept_exported_objects() {
        let parsed = parse_timestamp(&json!({ "seconds": 60, "nanoseconds": 0 }));
        assert_eq!(parsed.map(|d| d.timestamp()), Some(60));
        assert!(parse_timestamp(&json!("not a date")).is_none());
    }

    #[test]
    fn result_rank_rejects_unusable_values() {
        let mut record = ResultRecord {
            rank: Some(json!(3)),
            ..ResultRecord::default()
        };
        assert_eq!(record.rank(), Some(3));
        record.rank = Some(json!("4"));
        assert_eq!(record.rank(), Some(4));
        record.rank = Some(json!(0));
        assert_eq!(record.rank(), None);
        record.rank = Some(json!(2.5));
        assert_eq!(record.rank(), None);
        record.rank = None;
        assert_eq!(record.rank(), None);
    }

    #[test]
    fn entry_flattens_variant_fields() {
        let entry = LeaderboardEntry {
            id: "lb_1".to_string(),
            game_type: GameType::Ladder,
            variant: VariantFields {
                discs_per_turn: Some(3),
                streak_distance: None,
            },
            ..LeaderboardEntry::default()
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["discsPerTurn"], json!(3));
        assert_eq!(value["gameType"], json!("ladder"));
        assert!(value.get("streakDistance").is_none());
    }

    #[test]
    fn entry_timestamps_accept_every_stored_shape() {
        let entry: LeaderboardEntry = serde_json::from_value(json!({
            "id": "lb_1",
            "eventDate": { "seconds": 1_717_264_800, "nanoseconds": 0 },
            "updatedAt": 1_717_264_800_000_i64
        }))
        .unwrap();
        assert_eq!(entry.event_date.map(|d| d.timestamp()), Some(1_717_264_800));
        assert_eq!(entry.updated_at.map(|d| d.timestamp()), Some(1_717_264_800));

        let garbled: LeaderboardEntry =
            serde_json::from_value(json!({ "id": "lb_2", "eventDate": "yesterday" })).unwrap();
        assert!(garbled.event_date.is_none());

        let stats: SeasonStats = serde_json::from_value(json!({
            "id": "s24_p1",
            "updatedAt": { "seconds": 60, "nanoseconds": 5 }
        }))
        .unwrap();
        assert_eq!(stats.updated_at.map(|d| d.timestamp()), Some(60));
    }

    #[test]
    fn session_reads_null_collections_as_empty() {
        let session: RawSession = serde_json::from_value(json!({
            "id": "s1",
            "gameType": null,
            "config": null,
            "players": null,
            "playerUids": { "Ana": "u-ana", "Ben": null },
            "putts": { "Ben": null, "Ana": [true, false] },
            "liveStats": { "Cleo": null, "Ana": "broken" },
            "playerStates": null
        }))
        .unwrap();
        assert!(session.players.is_empty());
        assert!(session.config.is_empty());
        assert_eq!(session.game_type.as_str(), "unknown");
        assert_eq!(session.player_uids.len(), 1);
        assert_eq!(session.putts.keys().collect::<Vec<_>>(), vec!["Ana"]);
        assert!(session.live_stats.is_empty());
        assert!(session.player_states.is_empty());
    }

    #[test]
    fn roster_ignores_non_string_members() {
        let session: RawSession =
            serde_json::from_value(json!({ "players": ["Ana", null, 7, "Ben"] })).unwrap();
        assert_eq!(session.players, vec!["Ana", "Ben"]);
    }

    #[test]
    fn result_reads_null_points_as_zero() {
        let record: ResultRecord = serde_json::from_value(json!({
            "id": "r1",
            "eventId": "e1",
            "rank": 2,
            "points": null,
            "cutBonus": null,
            "playerName": null
        }))
        .unwrap();
        assert!(record.points.abs() < f64::EPSILON);
        assert!(record.cut_bonus.abs() < f64::EPSILON);
        assert_eq!(record.rank(), Some(2));
    }

    #[test]
    fn stats_drop_null_slot_values() {
        let stats: SeasonStats = serde_json::from_value(json!({
            "id": "s24_p1",
            "pointsTotal": null,
            "pointsBySlot": { "week1": 1.5, "week2": null },
            "applied": null
        }))
        .unwrap();
        assert!(stats.points_total.abs() < f64::EPSILON);
        assert_eq!(stats.points_by_slot.len(), 1);
        assert!(stats.applied.is_empty());
    }
}
