//! Dry-run-by-default guard in front of every mutating run.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    DryRun,
    Apply,
}

impl RunMode {
    /// Mode requested by the operator flags.
    ///
    /// # Errors
    ///
    /// `--apply` without `--confirm` is refused.
    pub const fn from_flags(apply: bool, confirm: bool) -> Result<Self, GateError> {
        match (apply, confirm) {
            (true, true) => Ok(Self::Apply),
            (true, false) => Err(GateError::Unconfirmed),
            (false, _) => Ok(Self::DryRun),
        }
    }

    #[must_use]
    pub const fn is_apply(self) -> bool {
        matches!(self, Self::Apply)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DryRun => "dry-run",
            Self::Apply => "apply",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("--apply requires --confirm")]
    Unconfirmed,
    #[error("--apply requires --project naming the target")]
    MissingTarget,
    #[error("target mismatch: expected {expected:?}, credentials point at {actual:?}")]
    TargetMismatch { expected: String, actual: String },
}

/// Check the run may proceed against `actual`.
///
/// A supplied `expected` target must always match, even for dry runs. Apply
/// runs must name their target.
///
/// # Errors
///
/// Returns the first [`GateError`] that blocks the run.
pub fn guard(mode: RunMode, expected: Option<&str>, actual: &str) -> Result<RunMode, GateError> {
    let actual = actual.trim();
    match expected.map(str::trim).filter(|e| !e.is_empty()) {
        Some(expected) if expected != actual => Err(GateError::TargetMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        Some(_) => Ok(mode),
        None if mode.is_apply() => Err(GateError::MissingTarget),
        None => Ok(mode),
    }
}
