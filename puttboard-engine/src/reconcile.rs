//! Leaderboard reconciliation: raw sessions in, create/update/delete plans out.
//!
//! Every (session, player) pair with a positive score maps to exactly one
//! entry signature. Existing entries are grouped by the same signature first,
//! so stale duplicates are queued for deletion before anything is written.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use twox_hash::XxHash64;

use crate::batch::Mutation;
use crate::constants::{ENTRY_ID_PREFIX, ENTRY_ID_SEED};
use crate::identity::{IdentityResolver, identity_key};
use crate::model::{LeaderboardEntry, RawSession, VariantFields};
use crate::numbers::tenths;
use crate::presence::{has_unnamed_reference, presence};
use crate::score::extract;
use crate::variant::{Variant, build_variant_key};

/// Counters reported after a reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    pub sessions_scanned: usize,
    pub entries_scanned: usize,
    pub players_seen: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_score: usize,
    pub skipped_identity: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePlan {
    pub to_create: Vec<LeaderboardEntry>,
    pub to_update: Vec<LeaderboardEntry>,
    pub to_delete: Vec<String>,
    pub stats: ReconcileStats,
}

impl ReconcilePlan {
    /// Deletes first, then creates, then updates.
    #[must_use]
    pub fn mutations(&self) -> Vec<Mutation> {
        let deletes = self
            .to_delete
            .iter()
            .map(|id| Mutation::DeleteEntry { id: id.clone() });
        let creates = self.to_create.iter().cloned().map(Mutation::CreateEntry);
        let updates = self.to_update.iter().cloned().map(Mutation::UpdateEntry);
        deletes.chain(creates).chain(updates).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Deterministic document id for a signature.
#[must_use]
pub fn entry_id(signature: &str) -> String {
    let mut hasher = XxHash64::with_seed(ENTRY_ID_SEED);
    hasher.write(signature.as_bytes());
    format!("{ENTRY_ID_PREFIX}{:016x}", hasher.finish())
}

fn signature(identity: &str, session_id: &str, game_type: &str, variant_key: &str) -> String {
    format!("{identity}|{session_id}|{game_type}|{variant_key}")
}

/// Better entry first: higher score, then more recent event, then smaller id.
fn rank_entries(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    tenths(b.score)
        .cmp(&tenths(a.score))
        .then_with(|| b.event_date.cmp(&a.event_date))
        .then_with(|| a.id.cmp(&b.id))
}

/// Fields that decide whether a stored entry needs rewriting.
#[derive(Debug, PartialEq, Eq)]
struct Projection<'e> {
    session_id: &'e str,
    identity: Option<String>,
    player_name: &'e str,
    player_gender: Option<&'e str>,
    game_type: &'e str,
    score: i64,
    accuracy: i64,
    made_putts: u32,
    total_putts: u32,
    discs_per_turn: Option<u32>,
    streak_distance: Option<i64>,
    event_date: Option<i64>,
}

impl<'e> Projection<'e> {
    fn of(entry: &'e LeaderboardEntry) -> Self {
        let VariantFields {
            discs_per_turn,
            streak_distance,
        } = entry.variant;
        Self {
            session_id: &entry.session_id,
            identity: identity_key(
                entry.player_uid.as_deref(),
                &entry.player_email,
                &entry.player_name,
            ),
            player_name: &entry.player_name,
            player_gender: entry.player_gender.as_deref(),
            game_type: entry.game_type.as_str(),
            score: tenths(entry.score),
            accuracy: tenths(entry.accuracy),
            made_putts: entry.made_putts,
            total_putts: entry.total_putts,
            discs_per_turn,
            streak_distance: streak_distance.map(tenths),
            event_date: entry.event_date.map(|d| d.timestamp_millis()),
        }
    }
}

/// One reconcile pass. Holds the per-run identity resolver.
#[derive(Debug)]
pub struct Reconciler<'d> {
    resolver: IdentityResolver<'d>,
    leaderboard_type: String,
    now: DateTime<Utc>,
}

impl<'d> Reconciler<'d> {
    #[must_use]
    pub fn new(
        resolver: IdentityResolver<'d>,
        leaderboard_type: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            resolver,
            leaderboard_type: leaderboard_type.into(),
            now,
        }
    }

    #[must_use]
    pub const fn resolver(&self) -> &IdentityResolver<'d> {
        &self.resolver
    }

    /// Signature of a stored entry, or `None` when it carries no usable identity.
    fn existing_signature(
        entry: &LeaderboardEntry,
        sessions: &HashMap<&str, &RawSession>,
    ) -> Option<String> {
        let identity = identity_key(
            entry.player_uid.as_deref(),
            &entry.player_email,
            &entry.player_name,
        )?;
        let variant = Variant::from_fields(&entry.game_type, &entry.variant).unwrap_or_else(|| {
            let config = sessions
                .get(entry.session_id.as_str())
                .map(|session| session.config.clone())
                .unwrap_or_default();
            Variant::from_config(&entry.game_type, &config)
        });
        Some(signature(
            &identity,
            &entry.session_id,
            entry.game_type.as_str(),
            &variant.key(),
        ))
    }

    /// Build the canonical entry for one present player, or count why not.
    fn candidate(
        &mut self,
        session: &RawSession,
        player: &str,
        stats: &mut ReconcileStats,
    ) -> Option<(String, LeaderboardEntry)> {
        let extracted = extract(session, player);
        if !(extracted.score.is_finite() && extracted.score > 0.0) {
            debug!("session {}: {player} has no positive score", session.id);
            stats.skipped_score += 1;
            return None;
        }
        let identity = self.resolver.resolve(player, session);
        let email = identity.email.clone().unwrap_or_default();
        let Some(key) = identity_key(identity.uid.as_deref(), &email, &identity.canonical_name)
        else {
            warn!("session {}: no usable identity for {player:?}", session.id);
            stats.skipped_identity += 1;
            return None;
        };
        let variant = build_variant_key(session);
        let signature = signature(&key, &session.id, session.game_type.as_str(), &variant.key);
        let entry = LeaderboardEntry {
            id: entry_id(&signature),
            session_id: session.id.clone(),
            game_type: session.game_type.clone(),
            leaderboard_type: self.leaderboard_type.clone(),
            player_uid: identity.uid,
            player_email: email,
            player_name: identity.canonical_name,
            player_gender: identity.gender,
            score: extracted.score,
            accuracy: extracted.accuracy,
            made_putts: extracted.made_putts,
            total_putts: extracted.total_putts,
            variant: variant.fields,
            event_date: session.event_date(),
            updated_at: Some(self.now),
        };
        Some((signature, entry))
    }

    /// Plan the writes that bring `existing` in line with `sessions`.
    pub fn reconcile(
        &mut self,
        sessions: &[RawSession],
        existing: &[LeaderboardEntry],
    ) -> ReconcilePlan {
        let mut plan = ReconcilePlan::default();
        plan.stats.sessions_scanned = sessions.len();
        plan.stats.entries_scanned = existing.len();
        let by_id: HashMap<&str, &RawSession> =
            sessions.iter().map(|s| (s.id.as_str(), s)).collect();

        // Existing entries: one survivor per signature.
        let mut survivors: HashMap<String, &LeaderboardEntry> = HashMap::new();
        for entry in existing {
            let Some(signature) = Self::existing_signature(entry, &by_id) else {
                debug!("entry {} has no identity; leaving it alone", entry.id);
                continue;
            };
            match survivors.get(&signature).copied() {
                Some(kept) if rank_entries(entry, kept) == Ordering::Less => {
                    plan.to_delete.push(kept.id.clone());
                    survivors.insert(signature, entry);
                }
                Some(_) => plan.to_delete.push(entry.id.clone()),
                None => {
                    survivors.insert(signature, entry);
                }
            }
        }

        // Candidates: one per signature, in discovery order.
        let mut candidates: BTreeMap<String, usize> = BTreeMap::new();
        let mut ordered: Vec<(String, LeaderboardEntry)> = Vec::new();
        for session in sessions {
            let unnamed = has_unnamed_reference(session).then(String::new);
            for player in presence(session).into_iter().chain(unnamed) {
                plan.stats.players_seen += 1;
                let Some((signature, entry)) = self.candidate(session, &player, &mut plan.stats)
                else {
                    continue;
                };
                match candidates.get(&signature) {
                    Some(&slot) => {
                        plan.stats.duplicates += 1;
                        if rank_entries(&entry, &ordered[slot].1) == Ordering::Less {
                            ordered[slot].1 = entry;
                        }
                    }
                    None => {
                        candidates.insert(signature.clone(), ordered.len());
                        ordered.push((signature, entry));
                    }
                }
            }
        }

        for (signature, mut entry) in ordered {
            match survivors.get(&signature) {
                None => plan.to_create.push(entry),
                Some(stored) if Projection::of(stored) == Projection::of(&entry) => {
                    plan.stats.unchanged += 1;
                }
                Some(stored) => {
                    entry.id.clone_from(&stored.id);
                    plan.to_update.push(entry);
                }
            }
        }

        plan.stats.duplicates += plan.to_delete.len();
        plan.stats.created = plan.to_create.len();
        plan.stats.updated = plan.to_update.len();
        info!(
            "reconciled {} sessions: {} create, {} update, {} delete, {} unchanged",
            plan.stats.sessions_scanned,
            plan.stats.created,
            plan.stats.updated,
            plan.to_delete.len(),
            plan.stats.unchanged
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityDirectory;
    use crate::model::{GameType, PlayerIdentity};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
    }

    fn ladder_session(id: &str) -> RawSession {
        let mut session = RawSession {
            id: id.to_string(),
            game_type: GameType::Ladder,
            date_time: Some(json!("2024-05-01T10:00:00Z")),
            players: vec!["Ana".to_string(), "Ben".to_string()],
            ..RawSession::default()
        };
        session.config.insert("discsPerTurn".to_string(), json!(3));
        session.scores.insert("Ana".to_string(), json!(42));
        session.scores.insert("Ben".to_string(), json!(0));
        session
            .player_uids
            .insert("Ana".to_string(), "u-ana".to_string());
        session
    }

    fn directory() -> IdentityDirectory {
        IdentityDirectory::new(vec![PlayerIdentity {
            canonical_name: "Ana Lopez".to_string(),
            uid: Some("u-ana".to_string()),
            email: Some("ana@example.com".to_string()),
            gender: Some("f".to_string()),
        }])
    }

    #[test]
    fn creates_entries_for_scoring_players_only() {
        let directory = directory();
        let mut reconciler = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let plan = reconciler.reconcile(&[ladder_session("s1")], &[]);
        assert_eq!(plan.to_create.len(), 1);
        assert_eq!(plan.stats.skipped_score, 1);
        assert_eq!(plan.stats.players_seen, 2);
        let entry = &plan.to_create[0];
        assert_eq!(entry.player_name, "Ana Lopez");
        assert_eq!(entry.variant.discs_per_turn, Some(3));
        assert!(entry.id.starts_with(ENTRY_ID_PREFIX));
        assert_eq!(entry.id.len(), ENTRY_ID_PREFIX.len() + 16);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let directory = directory();
        let sessions = vec![ladder_session("s1"), ladder_session("s2")];
        let mut first = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let plan = first.reconcile(&sessions, &[]);
        assert_eq!(plan.to_create.len(), 2);

        let mut second = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let again = second.reconcile(&sessions, &plan.to_create);
        assert!(again.is_empty());
        assert_eq!(again.stats.unchanged, 2);
    }

    #[test]
    fn changed_score_updates_in_place() {
        let directory = directory();
        let mut session = ladder_session("s1");
        let mut reconciler = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let stored = reconciler.reconcile(std::slice::from_ref(&session), &[]).to_create;

        session.scores.insert("Ana".to_string(), json!(44.5));
        let mut reconciler = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let plan = reconciler.reconcile(&[session], &stored);
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].id, stored[0].id);
        assert!((plan.to_update[0].score - 44.5).abs() < f64::EPSILON);
    }

    #[test]
    fn duplicate_existing_entries_keep_better_score() {
        let directory = directory();
        let session = ladder_session("s1");
        let mut reconciler = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let template = reconciler
            .reconcile(std::slice::from_ref(&session), &[])
            .to_create
            .remove(0);
        let earlier = DateTime::parse_from_rfc3339("2024-04-01T00:00:00Z")
            .map(|d| d.with_timezone(&Utc))
            .ok();
        let high = LeaderboardEntry {
            id: "old-150".to_string(),
            score: 150.0,
            event_date: earlier,
            ..template.clone()
        };
        let low = LeaderboardEntry {
            id: "new-120".to_string(),
            score: 120.0,
            ..template
        };

        let mut reconciler = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let plan = reconciler.reconcile(&[session], &[low, high]);
        assert_eq!(plan.to_delete, vec!["new-120".to_string()]);
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].id, "old-150");
    }

    #[test]
    fn equal_scores_keep_more_recent_entry() {
        let older = LeaderboardEntry {
            id: "a".to_string(),
            score: 10.0,
            event_date: DateTime::from_timestamp(100, 0),
            ..LeaderboardEntry::default()
        };
        let newer = LeaderboardEntry {
            id: "b".to_string(),
            event_date: DateTime::from_timestamp(200, 0),
            ..older.clone()
        };
        assert_eq!(rank_entries(&newer, &older), Ordering::Less);
    }

    #[test]
    fn entry_without_variant_fields_uses_session_config() {
        let directory = directory();
        let session = ladder_session("s1");
        let mut reconciler = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let mut legacy = reconciler
            .reconcile(std::slice::from_ref(&session), &[])
            .to_create
            .remove(0);
        legacy.id = "legacy".to_string();
        legacy.variant = VariantFields::default();

        let mut reconciler = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let plan = reconciler.reconcile(&[session], &[legacy]);
        assert!(plan.to_create.is_empty());
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].id, "legacy");
        assert_eq!(plan.to_update[0].variant.discs_per_turn, Some(3));
    }

    #[test]
    fn mutations_order_deletes_first() {
        let plan = ReconcilePlan {
            to_create: vec![LeaderboardEntry {
                id: "c".to_string(),
                ..LeaderboardEntry::default()
            }],
            to_update: vec![LeaderboardEntry {
                id: "u".to_string(),
                ..LeaderboardEntry::default()
            }],
            to_delete: vec!["d".to_string()],
            stats: ReconcileStats::default(),
        };
        let ids: Vec<String> = plan
            .mutations()
            .iter()
            .map(|m| m.target_id().to_string())
            .collect();
        assert_eq!(ids, vec!["d", "c", "u"]);
    }

    #[test]
    fn blank_keyed_score_without_identity_is_skipped() {
        let directory = directory();
        let mut session = ladder_session("s1");
        session.scores.insert("  ".to_string(), json!(30));
        let mut reconciler = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let plan = reconciler.reconcile(&[session], &[]);
        assert_eq!(plan.stats.skipped_identity, 1);
        assert_eq!(plan.stats.players_seen, 3);
        assert_eq!(plan.to_create.len(), 1);
    }

    #[test]
    fn blank_keyed_score_resolves_through_its_uid() {
        let directory = directory();
        let mut session = RawSession {
            id: "s2".to_string(),
            game_type: GameType::Ladder,
            ..RawSession::default()
        };
        session.scores.insert(" ".to_string(), json!(30));
        session
            .player_uids
            .insert(" ".to_string(), "u-ana".to_string());
        let mut reconciler = Reconciler::new(IdentityResolver::new(&directory), "putting", now());
        let plan = reconciler.reconcile(&[session], &[]);
        assert_eq!(plan.stats.skipped_identity, 0);
        assert_eq!(plan.to_create.len(), 1);
        assert_eq!(plan.to_create[0].player_name, "Ana Lopez");
        assert_eq!(plan.to_create[0].player_uid.as_deref(), Some("u-ana"));
    }
}
