//! Centralized limits and scoring constants for puttboard runs.
//!
//! Values that change stored numbers (scoring version, base points) live here so
//! a scoring change is always a reviewed code change.

// Store limits -------------------------------------------------------------
/// Hard ceiling on writes in one atomic group imposed by the document store.
pub const MAX_GROUP_WRITES: usize = 400;
/// Writes per chunk unless the config says otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 350;

// Leaderboard --------------------------------------------------------------
pub const DEFAULT_LEADERBOARD_TYPE: &str = "putting";
pub const ENTRY_ID_PREFIX: &str = "lb_";
/// Largest discs-per-turn value accepted as a real configuration.
pub const MAX_DISCS_PER_TURN: u32 = 50;

// Rank scoring -------------------------------------------------------------
pub const DEFAULT_CUT_PERCENT: f64 = 50.0;
pub const DEFAULT_BONUS_STEP: f64 = 0.1;
pub const SCORING_VERSION: u32 = 2;
/// Points every ranked participant earns before any cut bonus.
pub const BASE_PARTICIPATION_POINTS: f64 = 1.0;

// Filters ------------------------------------------------------------------
pub const MAX_GAME_TYPE_FILTERS: usize = 10;

// Hash seeds ---------------------------------------------------------------
pub(crate) const ENTRY_ID_SEED: u64 = 0x5055_5454_424f_4152;
pub(crate) const MARKER_SEED: u64 = 0x5345_4153_4f4e_0001;
