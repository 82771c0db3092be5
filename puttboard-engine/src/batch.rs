//! Deferred mutations and the chunked sequential writer.

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::constants::MAX_GROUP_WRITES;
use crate::model::{LeaderboardEntry, SeasonStats};
use crate::store::{Store, StoreError};

/// Field-level event update; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cut_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_version: Option<u32>,
}

impl EventPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.participants_count.is_none()
            && self.cut_percent.is_none()
            && self.bonus_step.is_none()
            && self.scoring_version.is_none()
    }
}

/// Field-level result update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPatch {
    pub points: f64,
    pub cut_bonus: f64,
    pub qualifies: bool,
}

/// One pending write. Nothing touches the store until [`BatchWriter::commit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    CreateEntry(LeaderboardEntry),
    UpdateEntry(LeaderboardEntry),
    DeleteEntry { id: String },
    PatchEvent { id: String, patch: EventPatch },
    PatchResult { id: String, patch: ResultPatch },
    MergeSeasonStats(SeasonStats),
}

impl Mutation {
    /// Document id the mutation targets.
    #[must_use]
    pub fn target_id(&self) -> &str {
        match self {
            Self::CreateEntry(entry) | Self::UpdateEntry(entry) => &entry.id,
            Self::DeleteEntry { id } | Self::PatchEvent { id, .. } | Self::PatchResult { id, .. } => {
                id
            }
            Self::MergeSeasonStats(stats) => &stats.id,
        }
    }
}

/// Outcome of a fully successful commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub chunks: usize,
    pub writes: usize,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("chunk size must be between 1 and {MAX_GROUP_WRITES} (got {0})")]
    InvalidChunkSize(usize),
    #[error(
        "chunk {chunk} of {total_chunks} failed after {committed_writes} committed writes: {source}"
    )]
    ChunkFailed {
        chunk: usize,
        total_chunks: usize,
        committed_chunks: usize,
        committed_writes: usize,
        #[source]
        source: StoreError,
    },
}

/// Sequential chunked committer.
///
/// Each chunk is one atomic group. A failing chunk stops the run; chunks
/// already committed stay committed.
#[derive(Debug)]
pub struct BatchWriter<'s, S: Store + ?Sized> {
    store: &'s S,
    chunk_size: usize,
}

impl<'s, S: Store + ?Sized> BatchWriter<'s, S> {
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidChunkSize`] when `chunk_size` is 0 or above
    /// the store's group ceiling.
    pub fn new(store: &'s S, chunk_size: usize) -> Result<Self, BatchError> {
        if chunk_size == 0 || chunk_size > MAX_GROUP_WRITES {
            return Err(BatchError::InvalidChunkSize(chunk_size));
        }
        Ok(Self { store, chunk_size })
    }

    #[must_use]
    pub fn chunk_count(&self, mutations: &[Mutation]) -> usize {
        mutations.len().div_ceil(self.chunk_size)
    }

    /// Commit `mutations` in order, one chunk at a time.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::ChunkFailed`] for the first chunk the store rejects.
    pub async fn commit(&self, mutations: &[Mutation]) -> Result<CommitReport, BatchError> {
        let total_chunks = self.chunk_count(mutations);
        let mut report = CommitReport::default();
        for (index, chunk) in mutations.chunks(self.chunk_size).enumerate() {
            if let Err(source) = self.store.commit_group(chunk).await {
                warn!(
                    "chunk {}/{} failed; {} earlier chunks stay committed",
                    index + 1,
                    total_chunks,
                    report.chunks
                );
                return Err(BatchError::ChunkFailed {
                    chunk: index + 1,
                    total_chunks,
                    committed_chunks: report.chunks,
                    committed_writes: report.writes,
                    source,
                });
            }
            report.chunks += 1;
            report.writes += chunk.len();
            info!(
                "committed chunk {}/{} ({} writes)",
                index + 1,
                total_chunks,
                chunk.len()
            );
        }
        Ok(report)
    }
}
