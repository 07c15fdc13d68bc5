//! Target calculator: three ordered profit targets derived from entry, stop and side.
//!
//! `risk_unit = |entry - stop|` and `target_n = entry + sign * r_n * risk_unit`.
//! A target set is either fully valid or not produced at all: the ordering
//! invariant (t1 < t2 < t3 beyond entry for longs, mirrored for shorts) is
//! checked on construction and again on deserialization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TargetConfig;
use crate::domain::Side;

/// Errors that block position creation outright.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum TargetError {
    #[error("non-finite target input: entry={entry} stop={stop} size={size}")]
    NonFinite { entry: f64, stop: f64, size: f64 },

    #[error("degenerate risk unit {risk_unit} (entry={entry}, stop={stop})")]
    ZeroRisk {
        entry: f64,
        stop: f64,
        risk_unit: f64,
    },

    #[error("{side} stop {stop} is not on the protective side of entry {entry}")]
    StopOnWrongSide { side: Side, entry: f64, stop: f64 },

    #[error("position size must be positive, got {size}")]
    InvalidSize { size: f64 },

    #[error(
        "{side} targets out of order: expected {expected}, got [{}, {}, {}] from entry {entry}",
        .prices[0], .prices[1], .prices[2]
    )]
    NotMonotonic {
        side: Side,
        entry: f64,
        prices: [f64; 3],
        expected: &'static str,
    },
}

/// Target level keyed 1-3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetLevel {
    Tp1,
    Tp2,
    Tp3,
}

impl TargetLevel {
    pub const ALL: [TargetLevel; 3] = [TargetLevel::Tp1, TargetLevel::Tp2, TargetLevel::Tp3];

    /// 1-based target number.
    pub fn number(self) -> u8 {
        match self {
            TargetLevel::Tp1 => 1,
            TargetLevel::Tp2 => 2,
            TargetLevel::Tp3 => 3,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(TargetLevel::Tp1),
            2 => Some(TargetLevel::Tp2),
            3 => Some(TargetLevel::Tp3),
            _ => None,
        }
    }

    fn index(self) -> usize {
        usize::from(self.number() - 1)
    }
}

/// A validated set of three profit targets plus their monetary equivalents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TargetSetRecord")]
pub struct TargetSet {
    side: Side,
    entry: f64,
    stop: f64,
    risk_unit: f64,
    prices: [f64; 3],
    monetary: [f64; 3],
    risk_amount: f64,
}

/// Unvalidated wire shape of a [`TargetSet`].
#[derive(Deserialize)]
struct TargetSetRecord {
    side: Side,
    entry: f64,
    stop: f64,
    risk_unit: f64,
    prices: [f64; 3],
    monetary: [f64; 3],
    risk_amount: f64,
}

impl TryFrom<TargetSetRecord> for TargetSet {
    type Error = TargetError;

    fn try_from(raw: TargetSetRecord) -> Result<Self, Self::Error> {
        if raw.risk_unit.is_nan() || raw.risk_unit <= 0.0 {
            return Err(TargetError::ZeroRisk {
                entry: raw.entry,
                stop: raw.stop,
                risk_unit: raw.risk_unit,
            });
        }
        check_ordering(raw.side, raw.entry, raw.prices)?;
        Ok(Self {
            side: raw.side,
            entry: raw.entry,
            stop: raw.stop,
            risk_unit: raw.risk_unit,
            prices: raw.prices,
            monetary: raw.monetary,
            risk_amount: raw.risk_amount,
        })
    }
}

impl TargetSet {
    pub fn side(&self) -> Side {
        self.side
    }

    pub fn entry(&self) -> f64 {
        self.entry
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn risk_unit(&self) -> f64 {
        self.risk_unit
    }

    /// Price of the given target.
    pub fn price(&self, level: TargetLevel) -> f64 {
        self.prices[level.index()]
    }

    pub fn prices(&self) -> [f64; 3] {
        self.prices
    }

    /// Money gained if the given target is reached (size x point value x distance).
    pub fn monetary(&self, level: TargetLevel) -> f64 {
        self.monetary[level.index()]
    }

    /// Money lost if the original stop is hit.
    pub fn risk_amount(&self) -> f64 {
        self.risk_amount
    }
}

/// Checks direction-aware strict ordering: entry < t1 < t2 < t3 (long), mirrored for short.
fn check_ordering(side: Side, entry: f64, prices: [f64; 3]) -> Result<(), TargetError> {
    let ordered = match side {
        Side::Long => entry < prices[0] && prices[0] < prices[1] && prices[1] < prices[2],
        Side::Short => entry > prices[0] && prices[0] > prices[1] && prices[1] > prices[2],
    };
    if ordered {
        Ok(())
    } else {
        Err(TargetError::NotMonotonic {
            side,
            entry,
            prices,
            expected: match side {
                Side::Long => "entry < t1 < t2 < t3",
                Side::Short => "entry > t1 > t2 > t3",
            },
        })
    }
}

/// Computes target sets from the configured risk-multiple triple.
#[derive(Debug, Clone)]
pub struct TargetCalculator {
    multiples: [f64; 3],
    point_value: f64,
}

impl TargetCalculator {
    pub fn new(config: &TargetConfig) -> Self {
        Self {
            multiples: config.risk_multiples,
            point_value: config.point_value,
        }
    }

    /// Compute the target set for a prospective position.
    ///
    /// Every failure is logged with full numeric context and no partial set is returned.
    pub fn compute(
        &self,
        side: Side,
        entry: f64,
        stop: f64,
        size: f64,
    ) -> Result<TargetSet, TargetError> {
        let result = self.try_compute(side, entry, stop, size);
        if let Err(err) = &result {
            tracing::error!(
                %side,
                entry,
                stop,
                size,
                r1 = self.multiples[0],
                r2 = self.multiples[1],
                r3 = self.multiples[2],
                error = %err,
                "target set rejected; position will not open"
            );
        }
        result
    }

    fn try_compute(
        &self,
        side: Side,
        entry: f64,
        stop: f64,
        size: f64,
    ) -> Result<TargetSet, TargetError> {
        if !entry.is_finite() || !stop.is_finite() || !size.is_finite() {
            return Err(TargetError::NonFinite { entry, stop, size });
        }
        if size <= 0.0 {
            return Err(TargetError::InvalidSize { size });
        }

        let risk_unit = (entry - stop).abs();
        if risk_unit <= 0.0 {
            return Err(TargetError::ZeroRisk {
                entry,
                stop,
                risk_unit,
            });
        }
        if side.favorable_move(entry, stop) > 0.0 {
            return Err(TargetError::StopOnWrongSide { side, entry, stop });
        }

        let prices = self
            .multiples
            .map(|r| entry + side.sign() * r * risk_unit);
        check_ordering(side, entry, prices)?;

        let monetary = prices.map(|p| (p - entry).abs() * size * self.point_value);
        Ok(TargetSet {
            side,
            entry,
            stop,
            risk_unit,
            prices,
            monetary,
            risk_amount: risk_unit * size * self.point_value,
        })
    }
}
