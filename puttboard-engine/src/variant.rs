//! Variant signatures: the configuration dimension that must match before two
//! results are comparable.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::MAX_DISCS_PER_TURN;
use crate::model::{GameType, RawSession, VariantFields};
use crate::numbers::{count_u32, finite_non_negative, sanitize};

/// Per-type variant configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Variant {
    /// `None` means the configured value was missing or invalid.
    Ladder { discs_per_turn: Option<u32> },
    Streak { distance: f64 },
    Circuit { discs_per_turn: Option<u32> },
    Default,
}

/// Signature string plus the fields persisted alongside the entry.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantKey {
    pub key: String,
    pub fields: VariantFields,
}

impl Variant {
    /// Read the variant from a session's configuration.
    #[must_use]
    pub fn from_session(session: &RawSession) -> Self {
        Self::from_config(&session.game_type, &session.config)
    }

    /// Read the variant for `game_type` from a raw configuration map.
    #[must_use]
    pub fn from_config(game_type: &GameType, config: &Map<String, Value>) -> Self {
        match game_type {
            GameType::Ladder => Self::Ladder {
                discs_per_turn: discs_from_config(config),
            },
            GameType::Streak => Self::Streak {
                distance: distance_from_config(config),
            },
            GameType::Circuit => Self::Circuit {
                discs_per_turn: discs_from_config(config),
            },
            GameType::Other(_) => Self::Default,
        }
    }

    /// Rebuild the variant from stored entry fields.
    ///
    /// Returns `None` when the type needs fields the entry does not carry, so
    /// the caller can fall back to the parent session.
    #[must_use]
    pub fn from_fields(game_type: &GameType, fields: &VariantFields) -> Option<Self> {
        match game_type {
            GameType::Ladder => fields.discs_per_turn.map(|discs| Self::Ladder {
                discs_per_turn: valid_discs(f64::from(discs)),
            }),
            GameType::Streak => fields.streak_distance.map(|distance| Self::Streak {
                distance: sanitize(distance),
            }),
            GameType::Circuit => fields.discs_per_turn.map(|discs| Self::Circuit {
                discs_per_turn: valid_discs(f64::from(discs)),
            }),
            GameType::Other(_) => Some(Self::Default),
        }
    }

    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Ladder { discs_per_turn } => {
                format!("ladder_discs:{}", discs_label(*discs_per_turn))
            }
            Self::Streak { distance } => format!("streak_distance:{distance}"),
            Self::Circuit { discs_per_turn } => {
                format!("circuit_discs:{}", discs_label(*discs_per_turn))
            }
            Self::Default => "default".to_string(),
        }
    }

    #[must_use]
    pub fn fields(&self) -> VariantFields {
        match *self {
            Self::Ladder { discs_per_turn } | Self::Circuit { discs_per_turn } => VariantFields {
                discs_per_turn,
                streak_distance: None,
            },
            Self::Streak { distance } => VariantFields {
                discs_per_turn: None,
                streak_distance: Some(distance),
            },
            Self::Default => VariantFields {
                discs_per_turn: None,
                streak_distance: None,
            },
        }
    }

    #[must_use]
    pub fn variant_key(&self) -> VariantKey {
        VariantKey {
            key: self.key(),
            fields: self.fields(),
        }
    }
}

/// Signature and payload fields for a session's variant.
#[must_use]
pub fn build_variant_key(session: &RawSession) -> VariantKey {
    Variant::from_session(session).variant_key()
}

fn discs_label(discs: Option<u32>) -> String {
    discs.map_or_else(|| "unknown".to_string(), |d| d.to_string())
}

fn discs_from_config(config: &Map<String, Value>) -> Option<u32> {
    let raw = ["discsPerTurn", "discs_per_turn", "discs"]
        .iter()
        .find_map(|key| config.get(*key))?;
    let value = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    valid_discs(value)
}

fn valid_discs(value: f64) -> Option<u32> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    if value < 1.0 || value > f64::from(MAX_DISCS_PER_TURN) {
        return None;
    }
    Some(count_u32(value))
}

fn distance_from_config(config: &Map<String, Value>) -> f64 {
    let raw = ["distance", "streakDistance", "streak_distance"]
        .iter()
        .find_map(|key| config.get(*key));
    finite_non_negative(raw)
}
