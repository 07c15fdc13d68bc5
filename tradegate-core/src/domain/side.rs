//! Trade direction.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Regime;

/// Position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Determine side from a signed direction value.
    pub fn from_sign(direction: i32) -> Option<Self> {
        match direction {
            d if d > 0 => Some(Side::Long),
            d if d < 0 => Some(Side::Short),
            _ => None,
        }
    }

    /// True if `price` is at or beyond `level` in the favorable direction.
    pub fn reached(self, price: f64, level: f64) -> bool {
        match self {
            Side::Long => price >= level,
            Side::Short => price <= level,
        }
    }

    /// True if `price` is at or beyond `stop` in the adverse direction.
    pub fn stop_hit(self, price: f64, stop: f64) -> bool {
        match self {
            Side::Long => price <= stop,
            Side::Short => price >= stop,
        }
    }

    /// Favorable excursion of `price` relative to `reference` (positive = in profit).
    pub fn favorable_move(self, reference: f64, price: f64) -> f64 {
        (price - reference) * self.sign()
    }

    /// The more favorable of two prices (higher for long, lower for short).
    pub fn better(self, a: f64, b: f64) -> f64 {
        match self {
            Side::Long => a.max(b),
            Side::Short => a.min(b),
        }
    }

    /// True if the regime tag points against this side.
    pub fn opposed_by(self, regime: Regime) -> bool {
        matches!(
            (self, regime),
            (Side::Long, Regime::TrendingDown) | (Side::Short, Regime::TrendingUp)
        )
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}
