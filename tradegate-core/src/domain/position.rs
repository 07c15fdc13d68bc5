//! Position: the unit of decision state while a trade is open.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{PositionId, Side};
use crate::exit::ExitReason;
use crate::targets::TargetSet;

/// Progress of a position through its profit targets.
///
/// Transitions only move forward: `InTrade -> Tp1Reached -> Tp2Reached -> Exited`.
/// Each state carries exactly the counters that are meaningful in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TpState {
    InTrade,
    Tp1Reached {
        /// Best close observed since target 1 was reached.
        peak: f64,
        bars_since_tp1: u32,
    },
    Tp2Reached {
        peak: f64,
        bars_since_tp1: u32,
        bars_since_tp2: u32,
    },
    Exited,
}

impl TpState {
    /// Ordinal used to check forward-only progress.
    pub fn rank(&self) -> u8 {
        match self {
            TpState::InTrade => 0,
            TpState::Tp1Reached { .. } => 1,
            TpState::Tp2Reached { .. } => 2,
            TpState::Exited => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TpState::InTrade => "IN_TRADE",
            TpState::Tp1Reached { .. } => "TP1_REACHED",
            TpState::Tp2Reached { .. } => "TP2_REACHED",
            TpState::Exited => "EXITED",
        }
    }

    pub fn peak(&self) -> Option<f64> {
        match self {
            TpState::Tp1Reached { peak, .. } | TpState::Tp2Reached { peak, .. } => Some(*peak),
            _ => None,
        }
    }

    pub fn is_exited(&self) -> bool {
        matches!(self, TpState::Exited)
    }

    /// Advance per-bar counters and the rolling peak for one closed bar.
    ///
    /// Called once per closed-bar evaluation, before any transition for that bar.
    pub(crate) fn tick(&mut self, side: Side, close: f64) {
        match self {
            TpState::Tp1Reached {
                peak,
                bars_since_tp1,
            } => {
                *peak = side.better(*peak, close);
                *bars_since_tp1 = bars_since_tp1.saturating_add(1);
            }
            TpState::Tp2Reached {
                peak,
                bars_since_tp1,
                bars_since_tp2,
            } => {
                *peak = side.better(*peak, close);
                *bars_since_tp1 = bars_since_tp1.saturating_add(1);
                *bars_since_tp2 = bars_since_tp2.saturating_add(1);
            }
            TpState::InTrade | TpState::Exited => {}
        }
    }
}

impl fmt::Display for TpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An open position as tracked by the exit state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub original_stop: f64,
    pub current_stop: f64,
    /// Full target set. `None` for positions opened under the legacy single-target setup.
    pub targets: Option<TargetSet>,
    /// Single take-profit used by legacy positions.
    #[serde(default)]
    pub legacy_take_profit: Option<f64>,
    pub state: TpState,
    pub opened_at: DateTime<Utc>,
    pub opened_bar: usize,
    /// Closed bars evaluated since the position opened.
    #[serde(default)]
    pub bars_held: u32,
    #[serde(default)]
    pub last_exit_reason: Option<ExitReason>,
    /// State the position was in when the exit fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_at_exit: Option<TpState>,
}

impl Position {
    /// Open a multi-level position from a validated target set.
    pub fn open(
        id: PositionId,
        targets: TargetSet,
        size: f64,
        opened_at: DateTime<Utc>,
        opened_bar: usize,
    ) -> Self {
        Self {
            id,
            side: targets.side(),
            size,
            entry_price: targets.entry(),
            original_stop: targets.stop(),
            current_stop: targets.stop(),
            targets: Some(targets),
            legacy_take_profit: None,
            state: TpState::InTrade,
            opened_at,
            opened_bar,
            bars_held: 0,
            last_exit_reason: None,
            state_at_exit: None,
        }
    }

    /// Open a legacy position with a plain stop-loss / take-profit pair.
    #[allow(clippy::too_many_arguments)]
    pub fn legacy(
        id: PositionId,
        side: Side,
        entry_price: f64,
        stop: f64,
        take_profit: Option<f64>,
        size: f64,
        opened_at: DateTime<Utc>,
        opened_bar: usize,
    ) -> Self {
        Self {
            id,
            side,
            size,
            entry_price,
            original_stop: stop,
            current_stop: stop,
            targets: None,
            legacy_take_profit: take_profit,
            state: TpState::InTrade,
            opened_at,
            opened_bar,
            bars_held: 0,
            last_exit_reason: None,
            state_at_exit: None,
        }
    }

    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == Side::Short
    }

    /// Profit in price points at `price` (positive = favorable).
    pub fn points_at(&self, price: f64) -> f64 {
        self.side.favorable_move(self.entry_price, price)
    }

    /// True once the stop sits at or beyond entry (breakeven locked).
    pub fn is_breakeven_locked(&self) -> bool {
        self.side.favorable_move(self.entry_price, self.current_stop) >= -1e-10
    }
}
