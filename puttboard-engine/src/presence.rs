//! Player presence: one normalization pass over every structure that can name
//! a participant.
//!
//! Spelling precedence: the roster list wins, then the first spelling seen in
//! structure order (scores, putts, live stats, state snapshots, uid map,
//! email map). Names compare case-insensitively after whitespace collapse.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::RawSession;

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Trim and collapse internal whitespace, preserving case.
#[must_use]
pub fn clean_name(raw: &str) -> String {
    WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

/// Case-folded comparison key for a player name.
#[must_use]
pub fn fold_name(raw: &str) -> String {
    clean_name(raw).to_lowercase()
}

/// Look a player up in a name-keyed map: exact key first, then folded match.
pub fn find_player<'m, V>(map: &'m BTreeMap<String, V>, name: &str) -> Option<&'m V> {
    if let Some(value) = map.get(name) {
        return Some(value);
    }
    let folded = fold_name(name);
    map.iter()
        .find(|(key, _)| fold_name(key) == folded)
        .map(|(_, value)| value)
}

/// Canonical presence set for one session, in discovery order.
#[must_use]
pub fn presence(session: &RawSession) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::new();
    let mut admit = |raw: &str| {
        let cleaned = clean_name(raw);
        if cleaned.is_empty() {
            return;
        }
        if seen.insert(cleaned.to_lowercase()) {
            names.push(cleaned);
        }
    };

    for name in &session.players {
        admit(name);
    }
    session.scores.keys().for_each(|k| admit(k));
    session.putts.keys().for_each(|k| admit(k));
    session.live_stats.keys().for_each(|k| admit(k));
    session.player_states.keys().for_each(|k| admit(k));
    session.player_uids.keys().for_each(|k| admit(k));
    session.player_emails.keys().for_each(|k| admit(k));
    names
}

/// Whether any structure keys a record under a blank name.
///
/// Such records never appear in [`presence`]; they are still candidates and
/// only resolve through a uid or email mapped under the same blank key.
#[must_use]
pub fn has_unnamed_reference(session: &RawSession) -> bool {
    let blank = |raw: &String| clean_name(raw).is_empty();
    session.players.iter().any(blank)
        || session.scores.keys().any(blank)
        || session.putts.keys().any(blank)
        || session.live_stats.keys().any(blank)
        || session.player_states.keys().any(blank)
}
