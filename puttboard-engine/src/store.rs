//! Document store seam plus the in-memory implementation.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use log::warn;
use serde::de::DeserializeOwned;
use serde::ser::{SerializeSeq, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::batch::Mutation;
use crate::model::{
    GameType, LeaderboardEntry, PlayerIdentity, RankEvent, RawSession, ResultRecord, SeasonStats,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} document {id} does not exist")]
    MissingDocument { collection: &'static str, id: String },
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store data is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Collection names as they appear in a persisted document set.
pub mod collections {
    pub const SESSIONS: &str = "sessions";
    pub const IDENTITIES: &str = "identities";
    pub const LEADERBOARD_ENTRIES: &str = "leaderboardEntries";
    pub const RANK_EVENTS: &str = "rankEvents";
    pub const RESULTS: &str = "results";
    pub const SEASON_STATS: &str = "seasonStats";
}

/// A stored document that could not be read into its typed shape.
///
/// The raw value is kept so stores can write it back untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedDocument {
    pub collection: &'static str,
    pub id: Option<String>,
    pub reason: String,
    #[serde(skip)]
    pub raw: Value,
}

/// Which ranked events a scoring run reads. Empty lists mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventFilter {
    pub event_ids: Vec<String>,
    pub season_ids: Vec<String>,
}

impl EventFilter {
    #[must_use]
    pub fn matches(&self, event: &RankEvent) -> bool {
        if !event.ranked {
            return false;
        }
        let id_ok = self.event_ids.is_empty() || self.event_ids.contains(&event.id);
        let season_ok = self.season_ids.is_empty()
            || event
                .season_id
                .as_ref()
                .is_some_and(|season| self.season_ids.contains(season));
        id_ok && season_ok
    }
}

/// Bulk reads plus atomic group commits.
///
/// Platform-specific implementations provide this; the engine only reads in
/// bulk up front and writes through [`crate::batch::BatchWriter`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Sessions of the given types; an empty slice means every type.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn load_sessions(&self, game_types: &[GameType]) -> Result<Vec<RawSession>, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn load_identities(&self) -> Result<Vec<PlayerIdentity>, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn load_entries(
        &self,
        leaderboard_type: &str,
        game_types: &[GameType],
    ) -> Result<Vec<LeaderboardEntry>, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn load_events(&self, filter: &EventFilter) -> Result<Vec<RankEvent>, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn load_results(&self, event_ids: &[String]) -> Result<Vec<ResultRecord>, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn load_season_stats(&self, ids: &[String]) -> Result<Vec<SeasonStats>, StoreError>;

    /// Documents of `collections` that were skipped on read.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn load_rejected(
        &self,
        collections: &[&str],
    ) -> Result<Vec<RejectedDocument>, StoreError>;

    /// Apply every mutation in `group` or none of them.
    ///
    /// # Errors
    ///
    /// Returns an error if any mutation is rejected; nothing is written then.
    async fn commit_group(&self, group: &[Mutation]) -> Result<(), StoreError>;
}

/// Full document set, as persisted by file-backed stores.
///
/// Reading is per document: one that fails to parse lands in `rejected`
/// instead of failing the whole set, and is serialized back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawSnapshot")]
pub struct Snapshot {
    pub sessions: Vec<RawSession>,
    pub identities: Vec<PlayerIdentity>,
    pub leaderboard_entries: Vec<LeaderboardEntry>,
    pub rank_events: Vec<RankEvent>,
    pub results: Vec<ResultRecord>,
    pub season_stats: Vec<SeasonStats>,
    pub rejected: Vec<RejectedDocument>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSnapshot {
    #[serde(deserialize_with = "null_as_empty")]
    sessions: Vec<Value>,
    #[serde(deserialize_with = "null_as_empty")]
    identities: Vec<Value>,
    #[serde(deserialize_with = "null_as_empty")]
    leaderboard_entries: Vec<Value>,
    #[serde(deserialize_with = "null_as_empty")]
    rank_events: Vec<Value>,
    #[serde(deserialize_with = "null_as_empty")]
    results: Vec<Value>,
    #[serde(deserialize_with = "null_as_empty")]
    season_stats: Vec<Value>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

fn read_documents<T: DeserializeOwned>(
    collection: &'static str,
    raw: Vec<Value>,
    rejected: &mut Vec<RejectedDocument>,
) -> Vec<T> {
    let mut documents = Vec::with_capacity(raw.len());
    for value in raw {
        match T::deserialize(&value) {
            Ok(document) => documents.push(document),
            Err(err) => {
                let id = value.get("id").and_then(Value::as_str).map(str::to_string);
                warn!(
                    "skipping unreadable {collection} document {}: {err}",
                    id.as_deref().unwrap_or("<no id>")
                );
                rejected.push(RejectedDocument {
                    collection,
                    id,
                    reason: err.to_string(),
                    raw: value,
                });
            }
        }
    }
    documents
}

impl From<RawSnapshot> for Snapshot {
    fn from(raw: RawSnapshot) -> Self {
        let mut rejected = Vec::new();
        Self {
            sessions: read_documents(collections::SESSIONS, raw.sessions, &mut rejected),
            identities: read_documents(collections::IDENTITIES, raw.identities, &mut rejected),
            leaderboard_entries: read_documents(
                collections::LEADERBOARD_ENTRIES,
                raw.leaderboard_entries,
                &mut rejected,
            ),
            rank_events: read_documents(collections::RANK_EVENTS, raw.rank_events, &mut rejected),
            results: read_documents(collections::RESULTS, raw.results, &mut rejected),
            season_stats: read_documents(
                collections::SEASON_STATS,
                raw.season_stats,
                &mut rejected,
            ),
            rejected,
        }
    }
}

/// Typed documents followed by the raw ones that were rejected on read.
struct Collection<'a, T> {
    documents: &'a [T],
    passthrough: Vec<&'a Value>,
}

impl<T: Serialize> Serialize for Collection<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.documents.len() + self.passthrough.len()))?;
        for document in self.documents {
            seq.serialize_element(document)?;
        }
        for raw in &self.passthrough {
            seq.serialize_element(raw)?;
        }
        seq.end()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Snapshot", 6)?;
        state.serialize_field(
            collections::SESSIONS,
            &self.collection(collections::SESSIONS, &self.sessions),
        )?;
        state.serialize_field(
            collections::IDENTITIES,
            &self.collection(collections::IDENTITIES, &self.identities),
        )?;
        state.serialize_field(
            collections::LEADERBOARD_ENTRIES,
            &self.collection(collections::LEADERBOARD_ENTRIES, &self.leaderboard_entries),
        )?;
        state.serialize_field(
            collections::RANK_EVENTS,
            &self.collection(collections::RANK_EVENTS, &self.rank_events),
        )?;
        state.serialize_field(
            collections::RESULTS,
            &self.collection(collections::RESULTS, &self.results),
        )?;
        state.serialize_field(
            collections::SEASON_STATS,
            &self.collection(collections::SEASON_STATS, &self.season_stats),
        )?;
        state.end()
    }
}

fn type_allowed(game_types: &[GameType], game_type: &GameType) -> bool {
    game_types.is_empty() || game_types.contains(game_type)
}

impl Snapshot {
    fn collection<'a, T>(&'a self, name: &str, documents: &'a [T]) -> Collection<'a, T> {
        Collection {
            documents,
            passthrough: self
                .rejected
                .iter()
                .filter(|doc| doc.collection == name)
                .map(|doc| &doc.raw)
                .collect(),
        }
    }

    #[must_use]
    pub fn rejected_in(&self, names: &[&str]) -> Vec<RejectedDocument> {
        self.rejected
            .iter()
            .filter(|doc| names.contains(&doc.collection))
            .cloned()
            .collect()
    }

    /// A typed write supersedes an unreadable document with the same id.
    fn supersede(&mut self, collection: &str, id: &str) {
        self.rejected
            .retain(|doc| !(doc.collection == collection && doc.id.as_deref() == Some(id)));
    }

    #[must_use]
    pub fn sessions_of(&self, game_types: &[GameType]) -> Vec<RawSession> {
        self.sessions
            .iter()
            .filter(|session| type_allowed(game_types, &session.game_type))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn entries_of(&self, leaderboard_type: &str, game_types: &[GameType]) -> Vec<LeaderboardEntry> {
        self.leaderboard_entries
            .iter()
            .filter(|entry| entry.leaderboard_type == leaderboard_type)
            .filter(|entry| type_allowed(game_types, &entry.game_type))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn events_matching(&self, filter: &EventFilter) -> Vec<RankEvent> {
        self.rank_events
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn results_for(&self, event_ids: &[String]) -> Vec<ResultRecord> {
        let wanted: BTreeSet<&str> = event_ids.iter().map(String::as_str).collect();
        self.results
            .iter()
            .filter(|result| wanted.contains(result.event_id.as_str()))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn season_stats_for(&self, ids: &[String]) -> Vec<SeasonStats> {
        let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        self.season_stats
            .iter()
            .filter(|stats| wanted.contains(stats.id.as_str()))
            .cloned()
            .collect()
    }

    /// Apply a group atomically: on error `self` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingDocument`] when an update or patch targets a
    /// document that does not exist.
    pub fn apply_group(&mut self, group: &[Mutation]) -> Result<(), StoreError> {
        let mut staged = self.clone();
        for mutation in group {
            staged.apply(mutation)?;
        }
        *self = staged;
        Ok(())
    }

    fn apply(&mut self, mutation: &Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::CreateEntry(entry) => {
                self.supersede(collections::LEADERBOARD_ENTRIES, &entry.id);
                match self.leaderboard_entries.iter_mut().find(|e| e.id == entry.id) {
                    Some(existing) => *existing = entry.clone(),
                    None => self.leaderboard_entries.push(entry.clone()),
                }
            }
            Mutation::UpdateEntry(entry) => {
                let existing = self
                    .leaderboard_entries
                    .iter_mut()
                    .find(|e| e.id == entry.id)
                    .ok_or_else(|| missing("leaderboard", &entry.id))?;
                *existing = entry.clone();
            }
            Mutation::DeleteEntry { id } => {
                self.supersede(collections::LEADERBOARD_ENTRIES, id);
                self.leaderboard_entries.retain(|e| &e.id != id);
            }
            Mutation::PatchEvent { id, patch } => {
                let event = self
                    .rank_events
                    .iter_mut()
                    .find(|e| &e.id == id)
                    .ok_or_else(|| missing("events", id))?;
                if let Some(count) = patch.participants_count {
                    event.participants_count = Some(count);
                }
                if let Some(cut) = patch.cut_percent {
                    event.cut_percent = Some(cut);
                }
                if let Some(step) = patch.bonus_step {
                    event.bonus_step = Some(step);
                }
                if let Some(version) = patch.scoring_version {
                    event.scoring_version = Some(version);
                }
            }
            Mutation::PatchResult { id, patch } => {
                let result = self
                    .results
                    .iter_mut()
                    .find(|r| &r.id == id)
                    .ok_or_else(|| missing("results", id))?;
                result.points = patch.points;
                result.cut_bonus = patch.cut_bonus;
                result.qualifies = Some(patch.qualifies);
            }
            Mutation::MergeSeasonStats(stats) => {
                self.supersede(collections::SEASON_STATS, &stats.id);
                match self.season_stats.iter_mut().find(|s| s.id == stats.id) {
                    Some(existing) => merge_stats(existing, stats),
                    None => self.season_stats.push(stats.clone()),
                }
            }
        }
        Ok(())
    }
}

fn missing(collection: &'static str, id: &str) -> StoreError {
    StoreError::MissingDocument {
        collection,
        id: id.to_string(),
    }
}

/// Merge semantics: scalar fields overwrite, map entries overwrite per key.
fn merge_stats(existing: &mut SeasonStats, incoming: &SeasonStats) {
    existing.season_id.clone_from(&incoming.season_id);
    existing.participant_id.clone_from(&incoming.participant_id);
    existing.points_total = incoming.points_total;
    for (slot, points) in &incoming.points_by_slot {
        existing.points_by_slot.insert(slot.clone(), *points);
    }
    for (result_id, marker) in &incoming.applied {
        existing.applied.insert(result_id.clone(), marker.clone());
    }
    if incoming.updated_at.is_some() {
        existing.updated_at = incoming.updated_at;
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Snapshot>,
    groups: Mutex<GroupLog>,
}

#[derive(Debug, Default)]
struct GroupLog {
    attempts: usize,
    committed: Vec<usize>,
    fail_on: Option<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            groups: Mutex::new(GroupLog::default()),
        }
    }

    /// Make the `attempt`-th commit (1-based) fail without writing.
    pub fn fail_on_group(&self, attempt: usize) {
        if let Ok(mut log) = self.groups.lock() {
            log.fail_on = Some(attempt);
        }
    }

    /// Sizes of the groups committed so far.
    #[must_use]
    pub fn committed_groups(&self) -> Vec<usize> {
        self.groups
            .lock()
            .map(|log| log.committed.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
            .lock()
            .map(|snapshot| snapshot.clone())
            .unwrap_or_default()
    }

    fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> Result<T, StoreError> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        Ok(f(&guard))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_sessions(&self, game_types: &[GameType]) -> Result<Vec<RawSession>, StoreError> {
        self.read(|s| s.sessions_of(game_types))
    }

    async fn load_identities(&self) -> Result<Vec<PlayerIdentity>, StoreError> {
        self.read(|s| s.identities.clone())
    }

    async fn load_entries(
        &self,
        leaderboard_type: &str,
        game_types: &[GameType],
    ) -> Result<Vec<LeaderboardEntry>, StoreError> {
        self.read(|s| s.entries_of(leaderboard_type, game_types))
    }

    async fn load_events(&self, filter: &EventFilter) -> Result<Vec<RankEvent>, StoreError> {
        self.read(|s| s.events_matching(filter))
    }

    async fn load_results(&self, event_ids: &[String]) -> Result<Vec<ResultRecord>, StoreError> {
        self.read(|s| s.results_for(event_ids))
    }

    async fn load_season_stats(&self, ids: &[String]) -> Result<Vec<SeasonStats>, StoreError> {
        self.read(|s| s.season_stats_for(ids))
    }

    async fn load_rejected(
        &self,
        collections: &[&str],
    ) -> Result<Vec<RejectedDocument>, StoreError> {
        self.read(|s| s.rejected_in(collections))
    }

    async fn commit_group(&self, group: &[Mutation]) -> Result<(), StoreError> {
        let mut log = self
            .groups
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        log.attempts += 1;
        if log.fail_on == Some(log.attempts) {
            return Err(StoreError::Backend(format!(
                "injected failure on group {}",
                log.attempts
            )));
        }
        let mut snapshot = self
            .snapshot
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        snapshot.apply_group(group)?;
        log.committed.push(group.len());
        Ok(())
    }
}
