//! Concrete entry gates, in pipeline order.

use super::{EntryContext, EntryGate, FailureCode, GateVerdict, PatternSignal};
use crate::config::EntryConfig;
use crate::domain::{Regime, Side};

/// Refuses to evaluate a bar that has not completed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BarClosedGate;

impl EntryGate for BarClosedGate {
    fn name(&self) -> &'static str {
        "bar_closed"
    }

    fn check(&self, ctx: &EntryContext<'_>, _config: &EntryConfig) -> GateVerdict {
        if ctx.bar.is_closed_at(ctx.evaluated_at) {
            GateVerdict::Pass
        } else {
            GateVerdict::reject(
                FailureCode::BarNotClosed,
                format!(
                    "bar {} closes at {}, evaluated at {}",
                    ctx.bar.index, ctx.bar.close_time, ctx.evaluated_at
                ),
            )
        }
    }
}

/// Requires a structurally complete, recently formed pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternGate;

impl PatternGate {
    pub const NAME: &'static str = "pattern";
}

impl EntryGate for PatternGate {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check(&self, ctx: &EntryContext<'_>, config: &EntryConfig) -> GateVerdict {
        let Some(pattern) = ctx.pattern else {
            return GateVerdict::reject(FailureCode::InvalidPatternStructure, "no pattern supplied");
        };
        if !pattern.is_valid {
            return GateVerdict::reject(
                FailureCode::InvalidPatternStructure,
                "pattern structure incomplete",
            );
        }
        if !pattern.structural_level.is_finite() || pattern.structural_level <= 0.0 {
            return GateVerdict::reject_with(
                FailureCode::InvalidPatternStructure,
                "structural level unusable",
                [("structural_level", pattern.structural_level)],
            );
        }
        match pattern.age_at(ctx.bar.index) {
            None => GateVerdict::reject_with(
                FailureCode::InvalidPatternStructure,
                "pattern formed after the candidate bar",
                [
                    ("formed_at_bar_index", pattern.formed_at_bar_index as f64),
                    ("bar_index", ctx.bar.index as f64),
                ],
            ),
            Some(age) if age > config.max_pattern_age_bars => GateVerdict::reject_with(
                FailureCode::InvalidPatternStructure,
                format!(
                    "pattern is {age} bars old, limit {}",
                    config.max_pattern_age_bars
                ),
                [
                    ("age_bars", age as f64),
                    ("max_pattern_age_bars", config.max_pattern_age_bars as f64),
                ],
            ),
            Some(_) => GateVerdict::Pass,
        }
    }
}

/// Pattern required by gates that run after [`PatternGate`].
fn pattern<'a>(ctx: &EntryContext<'a>) -> Result<&'a PatternSignal, GateVerdict> {
    ctx.pattern.ok_or_else(|| {
        GateVerdict::reject(FailureCode::InvalidPatternStructure, "no pattern supplied")
    })
}

/// Requires the close to have broken the structural level in the trade direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakoutGate;

impl EntryGate for BreakoutGate {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn check(&self, ctx: &EntryContext<'_>, _config: &EntryConfig) -> GateVerdict {
        let pattern = match pattern(ctx) {
            Ok(p) => p,
            Err(verdict) => return verdict,
        };
        let close = ctx.bar.close;
        let level = pattern.structural_level;
        if pattern.side.favorable_move(level, close) > 0.0 {
            GateVerdict::Pass
        } else {
            GateVerdict::reject_with(
                FailureCode::NoNecklineBreak,
                format!("{} close {close} has not broken {level}", pattern.side),
                [("close", close), ("structural_level", level)],
            )
        }
    }
}

/// Requires the close to sit on the trade's side of the long-horizon trend filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendAlignmentGate;

impl EntryGate for TrendAlignmentGate {
    fn name(&self) -> &'static str {
        "trend_alignment"
    }

    fn check(&self, ctx: &EntryContext<'_>, _config: &EntryConfig) -> GateVerdict {
        let pattern = match pattern(ctx) {
            Ok(p) => p,
            Err(verdict) => return verdict,
        };
        let close = ctx.bar.close;
        let trend = ctx.indicators.trend_slow;
        if trend.is_finite() && pattern.side.favorable_move(trend, close) > 0.0 {
            GateVerdict::Pass
        } else {
            GateVerdict::reject_with(
                FailureCode::ContextNotAligned,
                format!("{} entry against slow trend {trend}", pattern.side),
                [("close", close), ("trend_slow", trend)],
            )
        }
    }
}

/// Rejects entries the regime tag argues against.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegimeGate;

impl EntryGate for RegimeGate {
    fn name(&self) -> &'static str {
        "regime"
    }

    fn check(&self, ctx: &EntryContext<'_>, config: &EntryConfig) -> GateVerdict {
        let pattern = match pattern(ctx) {
            Ok(p) => p,
            Err(verdict) => return verdict,
        };
        let side: Side = pattern.side;
        if side.opposed_by(ctx.regime) {
            return GateVerdict::reject(
                FailureCode::RegimeConflict,
                format!("{side} entry in {:?} regime", ctx.regime),
            );
        }
        if config.block_volatile_regime && ctx.regime == Regime::Volatile {
            return GateVerdict::reject(
                FailureCode::RegimeConflict,
                "entries blocked in volatile regime",
            );
        }
        GateVerdict::Pass
    }
}

/// Requires the bar range to exceed a volatility-scaled threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentumGate;

impl EntryGate for MomentumGate {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn check(&self, ctx: &EntryContext<'_>, config: &EntryConfig) -> GateVerdict {
        let range = ctx.bar.range();
        let volatility = ctx.indicators.volatility;
        let threshold = config.min_range_atr_multiple * volatility;
        if volatility.is_finite() && range > threshold {
            GateVerdict::Pass
        } else {
            GateVerdict::reject_with(
                FailureCode::InsufficientMomentum,
                format!("bar range {range} does not exceed {threshold}"),
                [
                    ("range", range),
                    ("volatility", volatility),
                    ("threshold", threshold),
                ],
            )
        }
    }
}

/// Flags signals that are old relative to pattern formation. Never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct StalenessCheck;

impl StalenessCheck {
    pub const NAME: &'static str = "staleness";
}

impl EntryGate for StalenessCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check(&self, ctx: &EntryContext<'_>, config: &EntryConfig) -> GateVerdict {
        let age = ctx
            .pattern
            .and_then(|p| p.age_at(ctx.bar.index))
            .unwrap_or(0);
        if age > config.stale_after_bars {
            GateVerdict::Advisory(format!(
                "signal is {age} bars past pattern formation (stale after {})",
                config.stale_after_bars
            ))
        } else {
            GateVerdict::Pass
        }
    }
}

/// Requires a minimum number of bars and minutes since the last losing trade.
#[derive(Debug, Clone, Copy, Default)]
pub struct CooldownGate;

impl EntryGate for CooldownGate {
    fn name(&self) -> &'static str {
        "cooldown"
    }

    fn check(&self, ctx: &EntryContext<'_>, config: &EntryConfig) -> GateVerdict {
        let Some(last) = ctx.last_loss else {
            return GateVerdict::Pass;
        };
        let bars = ctx.bar.index.saturating_sub(last.bar_index);
        let minutes = (ctx.evaluated_at - last.closed_at).num_minutes();
        if bars < config.cooldown_bars || minutes < config.cooldown_minutes {
            GateVerdict::reject_with(
                FailureCode::CooldownActive,
                format!(
                    "{bars} bars / {minutes} min since last loss, need {} bars / {} min",
                    config.cooldown_bars, config.cooldown_minutes
                ),
                [
                    ("bars_since_loss", bars as f64),
                    ("minutes_since_loss", minutes as f64),
                ],
            )
        } else {
            GateVerdict::Pass
        }
    }
}
