//! Run configuration and operator filters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_BONUS_STEP, DEFAULT_CHUNK_SIZE, DEFAULT_CUT_PERCENT, DEFAULT_LEADERBOARD_TYPE,
    MAX_GAME_TYPE_FILTERS, MAX_GROUP_WRITES, SCORING_VERSION,
};
use crate::model::GameType;
use crate::rank::ScoringParams;
use crate::store::EventFilter;

/// Engine settings, loadable from JSON with every field optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "EngineConfig::default_leaderboard_type")]
    pub leaderboard_type: String,
    #[serde(default = "EngineConfig::default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "EngineConfig::default_cut_percent")]
    pub default_cut_percent: f64,
    #[serde(default = "EngineConfig::default_bonus_step")]
    pub default_bonus_step: f64,
    #[serde(default = "EngineConfig::default_scoring_version")]
    pub scoring_version: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            leaderboard_type: Self::default_leaderboard_type(),
            chunk_size: Self::default_chunk_size(),
            default_cut_percent: Self::default_cut_percent(),
            default_bonus_step: Self::default_bonus_step(),
            scoring_version: Self::default_scoring_version(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn default_leaderboard_type() -> String {
        DEFAULT_LEADERBOARD_TYPE.to_string()
    }

    #[must_use]
    pub const fn default_chunk_size() -> usize {
        DEFAULT_CHUNK_SIZE
    }

    #[must_use]
    pub const fn default_cut_percent() -> f64 {
        DEFAULT_CUT_PERCENT
    }

    #[must_use]
    pub const fn default_bonus_step() -> f64 {
        DEFAULT_BONUS_STEP
    }

    #[must_use]
    pub const fn default_scoring_version() -> u32 {
        SCORING_VERSION
    }

    /// Parse a JSON config document and validate it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the document is malformed or out of bounds.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when any field violates its bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.leaderboard_type.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "leaderboard_type",
            });
        }
        if !(1..=MAX_GROUP_WRITES).contains(&self.chunk_size) {
            return Err(ConfigError::ChunkSize {
                max: MAX_GROUP_WRITES,
                value: self.chunk_size,
            });
        }
        if !(0.0..=100.0).contains(&self.default_cut_percent) {
            return Err(ConfigError::RangeViolation {
                field: "default_cut_percent",
                min: 0.0,
                max: 100.0,
                value: self.default_cut_percent,
            });
        }
        validate_bonus_step("default_bonus_step", self.default_bonus_step)?;
        Ok(())
    }

    /// Scoring parameters for this config, with an optional operator override.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the override is negative or not finite.
    pub fn scoring_params(&self, bonus_step_override: Option<f64>) -> Result<ScoringParams, ConfigError> {
        if let Some(step) = bonus_step_override {
            validate_bonus_step("bonus_step", step)?;
        }
        Ok(ScoringParams {
            default_cut_percent: self.default_cut_percent,
            default_bonus_step: self.default_bonus_step,
            bonus_step_override,
            scoring_version: self.scoring_version,
        })
    }
}

fn validate_bonus_step(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::MinViolation {
            field,
            min: 0.0,
            value,
        });
    }
    Ok(())
}

/// Operator-supplied read filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFilters {
    pub game_types: Vec<GameType>,
    pub event_ids: Vec<String>,
    pub season_ids: Vec<String>,
}

impl RunFilters {
    /// Build filters from raw flag values, dropping blanks and repeats.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::GameTypeCount`] when more game types are named
    /// than a single store query accepts.
    pub fn new(
        game_types: &[String],
        event_ids: &[String],
        season_ids: &[String],
    ) -> Result<Self, ConfigError> {
        let mut types: Vec<GameType> = Vec::new();
        for raw in game_types.iter().filter(|raw| !raw.trim().is_empty()) {
            let parsed = GameType::parse(raw);
            if !types.contains(&parsed) {
                types.push(parsed);
            }
        }
        if types.len() > MAX_GAME_TYPE_FILTERS {
            return Err(ConfigError::GameTypeCount {
                max: MAX_GAME_TYPE_FILTERS,
                value: types.len(),
            });
        }
        Ok(Self {
            game_types: types,
            event_ids: distinct(event_ids),
            season_ids: distinct(season_ids),
        })
    }

    #[must_use]
    pub fn event_filter(&self) -> EventFilter {
        EventFilter {
            event_ids: self.event_ids.clone(),
            season_ids: self.season_ids.clone(),
        }
    }
}

fn distinct(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if !out.iter().any(|seen| seen == value) {
            out.push(value.to_string());
        }
    }
    out
}

/// Errors raised before any store read.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(String),
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("chunk_size must be between 1 and {max} (got {value})")]
    ChunkSize { max: usize, value: usize },
    #[error("{field} must be at least {min:.2} (got {value})")]
    MinViolation {
        field: &'static str,
        min: f64,
        value: f64,
    },
    #[error("{field} must be between {min:.2} and {max:.2} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("between 1 and {max} game types may be filtered on (got {value})")]
    GameTypeCount { max: usize, value: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.chunk_size, 350);
        assert_eq!(config.leaderboard_type, "putting");
    }

    #[test]
    fn chunk_size_is_bounded() {
        let err = EngineConfig::from_json(r#"{"chunk_size": 401}"#).unwrap_err();
        assert_eq!(err, ConfigError::ChunkSize { max: 400, value: 401 });
        assert!(EngineConfig::from_json(r#"{"chunk_size": 0}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"chunk_size": 400}"#).is_ok());
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        assert!(matches!(
            EngineConfig::from_json("{chunk_size"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn negative_override_is_rejected() {
        let config = EngineConfig::default();
        assert!(config.scoring_params(Some(-0.1)).is_err());
        assert!(config.scoring_params(Some(f64::NAN)).is_err());
        let params = config.scoring_params(Some(0.3)).unwrap();
        assert_eq!(params.bonus_step_override, Some(0.3));
    }

    #[test]
    fn game_type_filter_cardinality() {
        let many: Vec<String> = (0..11).map(|i| format!("type{i}")).collect();
        assert!(matches!(
            RunFilters::new(&many, &[], &[]),
            Err(ConfigError::GameTypeCount { value: 11, .. })
        ));
        let filters = RunFilters::new(&strings(&["ladder", "Ladder", " "]), &[], &[]).unwrap();
        assert_eq!(filters.game_types, vec![GameType::Ladder]);
    }

    #[test]
    fn event_filter_drops_blank_and_repeated_ids() {
        let filters = RunFilters::new(&[], &strings(&["e1", " e1", ""]), &strings(&["s1"])).unwrap();
        let filter = filters.event_filter();
        assert_eq!(filter.event_ids, vec!["e1".to_string()]);
        assert_eq!(filter.season_ids, vec!["s1".to_string()]);
    }
}
