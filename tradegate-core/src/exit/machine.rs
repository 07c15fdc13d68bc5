//! Multi-level take-profit exit state machine.
//!
//! Per closed bar, in this fixed order:
//! 1. stop-loss against the current stop,
//! 2. forward transitions in target order (1, 2, 3),
//! 3. retracement failure, only when no forward transition happened.
//!
//! Positions without a target set take the legacy stop-loss / take-profit path.

use chrono::{DateTime, Utc};

use super::{ExitDecision, ExitReason, RatchetState};
use crate::config::ExitConfig;
use crate::domain::{Bar, Indicators, Position, Regime, Side, TpState};
use crate::targets::{TargetLevel, TargetSet};

/// Market inputs for one exit evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ExitInput<'a> {
    pub bar: &'a Bar,
    pub indicators: &'a Indicators,
    pub regime: Regime,
    /// Instant the evaluation runs; the bar must be closed by then.
    pub evaluated_at: DateTime<Utc>,
}

/// Drives a position through `IN_TRADE -> TP1_REACHED -> TP2_REACHED -> EXITED`.
#[derive(Debug, Clone)]
pub struct ExitStateMachine {
    config: ExitConfig,
}

impl ExitStateMachine {
    pub fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    /// Evaluate one closed bar, mutating the position in place.
    ///
    /// Counters advance exactly once per call that sees a closed bar. An
    /// unclosed bar leaves the position untouched.
    pub fn evaluate(&self, position: &mut Position, input: &ExitInput<'_>) -> ExitDecision {
        if !input.bar.is_closed_at(input.evaluated_at) {
            tracing::debug!(
                id = %position.id,
                bar = input.bar.index,
                close_time = %input.bar.close_time,
                evaluated_at = %input.evaluated_at,
                "bar not closed; exit evaluation skipped"
            );
            return hold(position, "bar not closed");
        }

        if position.state.is_exited() {
            tracing::warn!(
                id = %position.id,
                bar = input.bar.index,
                "exit evaluation requested for a position that already exited"
            );
            return hold(position, "position already exited");
        }

        match position.targets.clone() {
            Some(targets) => self.evaluate_multi_level(position, &targets, input),
            None => {
                if position.state.rank() > 0 {
                    tracing::warn!(
                        id = %position.id,
                        state = %position.state,
                        "target set missing; using stop-loss/take-profit fallback"
                    );
                }
                evaluate_simple(position, input)
            }
        }
    }

    fn evaluate_multi_level(
        &self,
        position: &mut Position,
        targets: &TargetSet,
        input: &ExitInput<'_>,
    ) -> ExitDecision {
        let side = position.side;
        let close = input.bar.close;

        position.bars_held = position.bars_held.saturating_add(1);
        position.state.tick(side, close);

        if side.stop_hit(close, position.current_stop) {
            let summary = format!(
                "stop loss: close {close} crossed stop {} in {}",
                position.current_stop, position.state
            );
            return exit(position, ExitReason::StopLoss, summary, input.bar.index);
        }

        let mut ratchet = RatchetState::with_initial_level(side, position.current_stop);
        let mut notes = Vec::new();

        if position.state == TpState::InTrade
            && side.reached(close, targets.price(TargetLevel::Tp1))
        {
            position.state = TpState::Tp1Reached {
                peak: close,
                bars_since_tp1: 0,
            };
            let stop = ratchet.apply(position.entry_price);
            tracing::info!(
                id = %position.id,
                bar = input.bar.index,
                close,
                target = targets.price(TargetLevel::Tp1),
                new_stop = stop,
                "target 1 reached; stop locked at breakeven"
            );
            notes.push(format!("target 1 reached at {close}, stop to breakeven {stop}"));
        }

        if let TpState::Tp1Reached {
            peak,
            bars_since_tp1,
        } = position.state
        {
            if side.reached(close, targets.price(TargetLevel::Tp2)) {
                let peak = side.better(peak, close);
                position.state = TpState::Tp2Reached {
                    peak,
                    bars_since_tp1,
                    bars_since_tp2: 0,
                };
                let stop = ratchet.apply(self.trailing_stop(side, peak));
                tracing::info!(
                    id = %position.id,
                    bar = input.bar.index,
                    close,
                    peak,
                    target = targets.price(TargetLevel::Tp2),
                    new_stop = stop,
                    "target 2 reached; stop trails peak"
                );
                notes.push(format!("target 2 reached at {close}, stop trails to {stop}"));
            }
        }

        position.current_stop = ratchet.current_level();

        if matches!(position.state, TpState::Tp2Reached { .. })
            && side.reached(close, targets.price(TargetLevel::Tp3))
        {
            let summary = format!(
                "target 3 reached: close {close} at or beyond {}",
                targets.price(TargetLevel::Tp3)
            );
            return exit(
                position,
                ExitReason::TargetReached(TargetLevel::Tp3),
                summary,
                input.bar.index,
            );
        }

        if !notes.is_empty() {
            return ExitDecision::multi_hold(
                position.state,
                position.current_stop,
                notes.join("; "),
            );
        }

        if let Some(summary) = self.retracement_failure(position, close, input) {
            return exit(position, ExitReason::RetracementFailure, summary, input.bar.index);
        }

        if let TpState::Tp2Reached { peak, .. } = position.state {
            position.current_stop = ratchet.apply(self.trailing_stop(side, peak));
        }

        ExitDecision::multi_hold(
            position.state,
            position.current_stop,
            format!("hold in {}", position.state),
        )
    }

    fn trailing_stop(&self, side: Side, peak: f64) -> f64 {
        peak - side.sign() * self.config.trailing_offset
    }

    /// Returns a summary when the retracement-failure rule fires.
    fn retracement_failure(
        &self,
        position: &Position,
        close: f64,
        input: &ExitInput<'_>,
    ) -> Option<String> {
        let (peak, bars_since, min_bars, multiple, stage) = match position.state {
            TpState::Tp1Reached {
                peak,
                bars_since_tp1,
            } => (
                peak,
                bars_since_tp1,
                self.config.min_bars_after_tp1,
                self.config.tp1_retrace_atr,
                "target 1",
            ),
            TpState::Tp2Reached {
                peak,
                bars_since_tp2,
                ..
            } => (
                peak,
                bars_since_tp2,
                self.config.min_bars_after_tp2,
                self.config.tp2_retrace_atr,
                "target 2",
            ),
            TpState::InTrade | TpState::Exited => return None,
        };

        if bars_since < min_bars.max(1) {
            return None;
        }

        let atr = input.indicators.volatility;
        if !atr.is_finite() || atr < 0.0 {
            tracing::warn!(
                id = %position.id,
                bar = input.bar.index,
                volatility = atr,
                "volatility unavailable; retracement rule skipped"
            );
            return None;
        }

        let side = position.side;
        let retrace = side.favorable_move(close, peak);
        let threshold = multiple * atr;
        if retrace <= threshold {
            return None;
        }

        if continuation_supported(side, close, input) {
            tracing::debug!(
                id = %position.id,
                bar = input.bar.index,
                retrace,
                threshold,
                "retracement exceeded threshold but continuation still supported"
            );
            return None;
        }

        Some(format!(
            "retracement after {stage}: {retrace:.5} from peak {peak} exceeds {threshold:.5} \
             after {bars_since} bars without continuation support"
        ))
    }
}

/// Momentum supports continuation while close holds the favorable side of the fast
/// trend; regime supports it while it does not point against the position.
fn continuation_supported(side: Side, close: f64, input: &ExitInput<'_>) -> bool {
    let trend_fast = input.indicators.trend_fast;
    let momentum_ok = trend_fast.is_finite() && side.reached(close, trend_fast);
    let regime_ok = !side.opposed_by(input.regime);
    momentum_ok && regime_ok
}

/// Legacy two-outcome evaluation.
fn evaluate_simple(position: &mut Position, input: &ExitInput<'_>) -> ExitDecision {
    let side = position.side;
    let close = input.bar.close;
    position.bars_held = position.bars_held.saturating_add(1);

    if side.stop_hit(close, position.current_stop) {
        let summary = format!("stop loss: close {close} crossed stop {}", position.current_stop);
        return exit(position, ExitReason::StopLoss, summary, input.bar.index);
    }

    if let Some(take_profit) = position.legacy_take_profit {
        if side.reached(close, take_profit) {
            let summary = format!("take profit: close {close} at or beyond {take_profit}");
            return exit(position, ExitReason::TakeProfit, summary, input.bar.index);
        }
    }

    ExitDecision::simple_hold(position.current_stop, "hold")
}

fn hold(position: &Position, summary: &str) -> ExitDecision {
    if position.targets.is_some() {
        ExitDecision::multi_hold(position.state, position.current_stop, summary)
    } else {
        ExitDecision::simple_hold(position.current_stop, summary)
    }
}

fn exit(position: &mut Position, reason: ExitReason, summary: String, bar: usize) -> ExitDecision {
    tracing::info!(
        id = %position.id,
        bar,
        state = %position.state,
        stop = position.current_stop,
        reason = %reason,
        "{summary}"
    );
    let multi_level = position.targets.is_some();
    position.state_at_exit = Some(position.state);
    position.state = TpState::Exited;
    position.last_exit_reason = Some(reason.clone());
    if multi_level {
        ExitDecision::multi_exit(reason, position.current_stop, summary)
    } else {
        ExitDecision::simple_exit(reason, position.current_stop, summary)
    }
}
