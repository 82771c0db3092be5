//! Numeric coercion helpers centralizing finite reads and safe casts.

use num_traits::cast::cast;
use serde_json::Value;

/// Coerce a loosely-typed JSON value into a finite, non-negative `f64`.
///
/// Numbers and numeric strings are accepted; everything else reads as 0.
#[must_use]
pub fn finite_non_negative(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };
    sanitize(raw)
}

/// Replace non-finite or negative values with 0.
#[must_use]
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Round to one decimal place, mapping non-finite input to 0.
#[must_use]
pub fn round1(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 10.0).round() / 10.0;
    // Normalize negative zero so equality and formatting stay stable.
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Express a one-decimal value as an integer count of tenths.
#[must_use]
pub fn tenths(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let min = cast::<i64, f64>(i64::MIN).unwrap_or(f64::MIN);
    let max = cast::<i64, f64>(i64::MAX).unwrap_or(f64::MAX);
    cast::<f64, i64>((value * 10.0).round().clamp(min, max)).unwrap_or(0)
}

/// Ceil a f64 into a `u32` count, returning 0 for non-finite or negative values.
#[must_use]
pub fn ceil_to_count(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let max = f64::from(u32::MAX);
    cast::<f64, u32>(value.ceil().min(max)).unwrap_or(0)
}

/// Truncate a finite count read into a `u32`, returning 0 for anything else.
#[must_use]
pub fn count_u32(value: f64) -> u32 {
    let value = sanitize(value);
    let max = f64::from(u32::MAX);
    cast::<f64, u32>(value.trunc().min(max)).unwrap_or(0)
}

/// Percentage with one decimal; 0 when the denominator is 0.
#[must_use]
pub fn accuracy_pct(made: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let made = made.min(total);
    round1(100.0 * f64::from(made) / f64::from(total))
}
