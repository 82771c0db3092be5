//! The two batch jobs: read everything, plan in memory, then commit in chunks.
//!
//! Callers pass the run mode after the safety gate has cleared it. Dry runs
//! return the exact mutation list an apply run would commit.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::aggregate::{PointDelta, PropagationStats, propagate};
use crate::batch::{BatchError, BatchWriter, CommitReport, Mutation};
use crate::config::{ConfigError, EngineConfig, RunFilters};
use crate::gate::RunMode;
use crate::identity::{IdentityDirectory, IdentityResolver};
use crate::model::ResultRecord;
use crate::rank::score_event;
use crate::reconcile::{ReconcileStats, Reconciler};
use crate::store::{RejectedDocument, Store, StoreError, collections};

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub mode: RunMode,
    pub stats: ReconcileStats,
    pub identity_lookups: usize,
    /// Sessions, identities and entries that could not be read.
    pub rejected: Vec<RejectedDocument>,
    pub mutations: Vec<Mutation>,
    /// Present only for apply runs.
    pub commit: Option<CommitReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringStats {
    pub events_scanned: usize,
    pub results_scanned: usize,
    pub results_changed: usize,
    pub results_unchanged: usize,
    pub skipped_unranked: usize,
    pub events_patched: usize,
    /// Changes not written because their season stats document is unreadable.
    pub held_back: usize,
    pub aggregates: PropagationStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringReport {
    pub mode: RunMode,
    pub stats: ScoringStats,
    pub warnings: Vec<String>,
    /// Events, results and season stats that could not be read.
    pub rejected: Vec<RejectedDocument>,
    pub mutations: Vec<Mutation>,
    pub commit: Option<CommitReport>,
}

async fn commit_if_applied<S: Store + ?Sized>(
    writer: &BatchWriter<'_, S>,
    mode: RunMode,
    mutations: &[Mutation],
) -> Result<Option<CommitReport>, BatchError> {
    if !mode.is_apply() {
        info!(
            "dry run: {} mutations in {} chunks would be written",
            mutations.len(),
            writer.chunk_count(mutations)
        );
        return Ok(None);
    }
    writer.commit(mutations).await.map(Some)
}

/// Reconcile leaderboard entries against raw sessions.
///
/// # Errors
///
/// Returns [`JobError`] for invalid configuration, failed reads, or the first
/// rejected write chunk.
pub async fn run_reconcile<S: Store + ?Sized>(
    store: &S,
    config: &EngineConfig,
    filters: &RunFilters,
    mode: RunMode,
    now: DateTime<Utc>,
) -> Result<ReconcileReport, JobError> {
    config.validate()?;
    let writer = BatchWriter::new(store, config.chunk_size)?;

    let sessions = store.load_sessions(&filters.game_types).await?;
    let directory = IdentityDirectory::new(store.load_identities().await?);
    let existing = store
        .load_entries(&config.leaderboard_type, &filters.game_types)
        .await?;
    let rejected = store
        .load_rejected(&[
            collections::SESSIONS,
            collections::IDENTITIES,
            collections::LEADERBOARD_ENTRIES,
        ])
        .await?;
    info!(
        "loaded {} sessions, {} identities, {} entries ({} unreadable documents skipped)",
        sessions.len(),
        directory.len(),
        existing.len(),
        rejected.len()
    );

    let mut reconciler = Reconciler::new(
        IdentityResolver::new(&directory),
        config.leaderboard_type.clone(),
        now,
    );
    let plan = reconciler.reconcile(&sessions, &existing);
    let identity_lookups = reconciler.resolver().directory_reads();
    let mutations = plan.mutations();
    let commit = commit_if_applied(&writer, mode, &mutations).await?;

    Ok(ReconcileReport {
        mode,
        stats: plan.stats,
        identity_lookups,
        rejected,
        mutations,
        commit,
    })
}

/// Score ranked events and fold point changes into season stats.
///
/// Season stats are written before results and events, so a rerun after a
/// failed chunk finds the applied markers and does not count a delta twice.
///
/// # Errors
///
/// Returns [`JobError`] for invalid configuration, failed reads, or the first
/// rejected write chunk.
pub async fn run_event_scoring<S: Store + ?Sized>(
    store: &S,
    config: &EngineConfig,
    filters: &RunFilters,
    bonus_step_override: Option<f64>,
    mode: RunMode,
    now: DateTime<Utc>,
) -> Result<ScoringReport, JobError> {
    config.validate()?;
    let params = config.scoring_params(bonus_step_override)?;
    let writer = BatchWriter::new(store, config.chunk_size)?;

    let events = store.load_events(&filters.event_filter()).await?;
    let event_ids: Vec<String> = events.iter().map(|event| event.id.clone()).collect();
    let results = store.load_results(&event_ids).await?;
    let rejected = store
        .load_rejected(&[
            collections::RANK_EVENTS,
            collections::RESULTS,
            collections::SEASON_STATS,
        ])
        .await?;
    info!(
        "loaded {} ranked events, {} results ({} unreadable documents skipped)",
        events.len(),
        results.len(),
        rejected.len()
    );
    // Folding into an unreadable stats document would overwrite its totals.
    let unreadable_stats: BTreeSet<&str> = rejected
        .iter()
        .filter(|doc| doc.collection == collections::SEASON_STATS)
        .filter_map(|doc| doc.id.as_deref())
        .collect();

    let mut by_event: BTreeMap<&str, Vec<&ResultRecord>> = BTreeMap::new();
    for result in &results {
        by_event.entry(result.event_id.as_str()).or_default().push(result);
    }

    let mut stats = ScoringStats {
        events_scanned: events.len(),
        results_scanned: results.len(),
        ..ScoringStats::default()
    };
    let mut warnings = Vec::new();
    let mut result_writes = Vec::new();
    let mut event_writes = Vec::new();
    let mut deltas = Vec::new();

    for event in &events {
        let event_results = by_event.get(event.id.as_str()).map_or(&[][..], Vec::as_slice);
        let scoring = score_event(event, event_results, &params);
        stats.results_unchanged += scoring.unchanged;
        stats.skipped_unranked += scoring.skipped_unranked;
        warnings.extend(scoring.warnings);
        for change in &scoring.changes {
            let delta = PointDelta::from_change(change);
            if let Some(id) = delta
                .stats_id()
                .filter(|id| unreadable_stats.contains(id.as_str()))
            {
                let message = format!(
                    "result {} held back: season stats {id} is unreadable",
                    change.result_id
                );
                warn!("{message}");
                warnings.push(message);
                stats.held_back += 1;
                continue;
            }
            stats.results_changed += 1;
            deltas.push(delta);
            result_writes.push(Mutation::PatchResult {
                id: change.result_id.clone(),
                patch: change.patch,
            });
        }
        if let Some(patch) = scoring.event_patch {
            stats.events_patched += 1;
            event_writes.push(Mutation::PatchEvent {
                id: scoring.event_id,
                patch,
            });
        }
    }

    let stats_ids: Vec<String> = deltas
        .iter()
        .filter_map(PointDelta::stats_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let existing = store.load_season_stats(&stats_ids).await?;
    let propagation = propagate(&deltas, &existing, now);
    stats.aggregates = propagation.stats;

    let mutations: Vec<Mutation> = propagation
        .upserts
        .into_iter()
        .map(Mutation::MergeSeasonStats)
        .chain(result_writes)
        .chain(event_writes)
        .collect();
    let commit = commit_if_applied(&writer, mode, &mutations).await?;

    Ok(ScoringReport {
        mode,
        stats,
        warnings,
        rejected,
        mutations,
        commit,
    })
}
