//! Per-player score extraction from raw session structures.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::{GameType, RawSession};
use crate::numbers::{accuracy_pct, count_u32, finite_non_negative, round1, sanitize};
use crate::presence::find_player;

/// Extracted numbers for one player in one session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    pub score: f64,
    pub made_putts: u32,
    pub total_putts: u32,
    pub accuracy: f64,
}

/// Score inputs per game family, built by [`score_source`].
#[derive(Debug, Clone, Copy, PartialEq)]
enum ScoreSource {
    /// A running best may exceed the live total.
    Circuit { best: f64, current: f64 },
    Streak { total: f64, longest_streak: f64 },
    Points { total: f64 },
}

impl ScoreSource {
    fn score(self) -> f64 {
        match self {
            Self::Circuit { best, current } => best.max(current),
            Self::Streak {
                total,
                longest_streak,
            } => total.max(longest_streak),
            Self::Points { total } => total,
        }
    }
}

/// Borrowed view of every structure that may describe one player.
struct PlayerView<'s> {
    score: Option<&'s Value>,
    putts: Option<&'s Vec<Value>>,
    live: Option<&'s Map<String, Value>>,
    state: Option<&'s Map<String, Value>>,
}

impl<'s> PlayerView<'s> {
    fn new(session: &'s RawSession, player: &str) -> Self {
        Self {
            score: find_player(&session.scores, player),
            putts: find_player(&session.putts, player),
            live: find_player(&session.live_stats, player),
            state: find_player(&session.player_states, player),
        }
    }

    /// The total points field; `None` when the session never recorded one.
    fn total_points(&self) -> Option<f64> {
        let value = self.score?;
        let raw = match value {
            Value::Object(obj) => ["total", "points", "score"]
                .iter()
                .find_map(|key| obj.get(*key))?,
            other => other,
        };
        Some(finite_non_negative(Some(raw)))
    }

    fn live_points(&self) -> f64 {
        read_first(self.live, &["points", "totalPoints", "score"])
    }

    fn state_field(&self, keys: &[&str]) -> f64 {
        read_first(self.state, keys)
    }

    fn putt_counts(&self) -> (u32, u32) {
        if let Some(putts) = self.putts.filter(|putts| !putts.is_empty()) {
            let made = putts.iter().filter(|putt| putt_made(putt)).count();
            let made = u32::try_from(made).unwrap_or(u32::MAX);
            let total = u32::try_from(putts.len()).unwrap_or(u32::MAX);
            return (made, total);
        }
        let made_keys = ["madePutts", "made"];
        let total_keys = ["totalPutts", "attempts", "total"];
        for source in [self.live, self.state] {
            let total = count_u32(read_first(source, &total_keys));
            let made = count_u32(read_first(source, &made_keys));
            if total > 0 || made > 0 {
                return (made, total);
            }
        }
        (0, 0)
    }
}

fn read_first(map: Option<&Map<String, Value>>, keys: &[&str]) -> f64 {
    let Some(map) = map else {
        return 0.0;
    };
    finite_non_negative(keys.iter().find_map(|key| map.get(*key)))
}

/// Interpret one putt record across the shapes the client has written.
fn putt_made(putt: &Value) -> bool {
    match putt {
        Value::Bool(made) => *made,
        Value::String(result) => result.eq_ignore_ascii_case("made"),
        Value::Object(obj) => match (obj.get("made"), obj.get("result")) {
            (Some(Value::Bool(made)), _) => *made,
            (_, Some(Value::String(result))) => result.eq_ignore_ascii_case("made"),
            _ => false,
        },
        _ => false,
    }
}

fn score_source(game_type: &GameType, view: &PlayerView<'_>) -> ScoreSource {
    match game_type {
        GameType::Circuit => {
            let current = if view.state.is_some_and(|s| s.contains_key("currentScore")) {
                view.state_field(&["currentScore"])
            } else {
                view.total_points().unwrap_or_else(|| view.live_points())
            };
            ScoreSource::Circuit {
                best: view.state_field(&["bestScore", "best"]),
                current,
            }
        }
        GameType::Streak => ScoreSource::Streak {
            total: view.total_points().unwrap_or_else(|| view.live_points()),
            longest_streak: view
                .state_field(&["longestStreak", "bestStreak"])
                .max(read_first(view.live, &["longestStreak"])),
        },
        GameType::Ladder | GameType::Other(_) => ScoreSource::Points {
            total: view.total_points().unwrap_or_else(|| view.live_points()),
        },
    }
}

/// Extract score, putt counts and accuracy for `player` in `session`.
///
/// Every read defaults to 0 and is coerced to a finite value.
#[must_use]
pub fn extract(session: &RawSession, player: &str) -> PlayerScore {
    let view = PlayerView::new(session, player);
    let (made_putts, total_putts) = view.putt_counts();
    let score = round1(sanitize(score_source(&session.game_type, &view).score()));
    PlayerScore {
        score,
        made_putts,
        total_putts,
        accuracy: accuracy_pct(made_putts, total_putts),
    }
}
