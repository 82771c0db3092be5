//! Puttboard Engine
//!
//! Platform-agnostic leaderboard reconciliation and rank scoring for putting
//! league data. This crate reads through the [`Store`] trait, plans every write
//! in memory, and commits through the chunked [`BatchWriter`]; it has no CLI or
//! storage-backend dependencies of its own.

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod constants;
pub mod gate;
pub mod identity;
pub mod jobs;
pub mod model;
pub mod numbers;
pub mod presence;
pub mod rank;
pub mod reconcile;
pub mod score;
pub mod store;
pub mod variant;

// Re-export commonly used types
pub use aggregate::{PointDelta, Propagation, PropagationStats, apply_delta, propagate};
pub use batch::{BatchError, BatchWriter, CommitReport, EventPatch, Mutation, ResultPatch};
pub use config::{ConfigError, EngineConfig, RunFilters};
pub use gate::{GateError, RunMode, guard};
pub use identity::{IdentityDirectory, IdentityResolver};
pub use jobs::{
    JobError, ReconcileReport, ScoringReport, ScoringStats, run_event_scoring, run_reconcile,
};
pub use model::{
    GameType, LeaderboardEntry, PlayerIdentity, RankEvent, RawSession, ResultRecord, SeasonStats,
    VariantFields,
};
pub use rank::{EventScoring, RankOutcome, ScoringParams, cut_count, score_event, score_rank};
pub use reconcile::{ReconcilePlan, ReconcileStats, Reconciler, entry_id};
pub use score::{PlayerScore, extract};
pub use store::{EventFilter, MemoryStore, RejectedDocument, Snapshot, Store, StoreError};
pub use variant::{Variant, VariantKey, build_variant_key};
