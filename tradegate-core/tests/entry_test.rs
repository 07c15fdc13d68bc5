//! Integration tests for the entry qualifier.
//!
//! Tests:
//! 1. Bar-close guard runs first and short-circuits everything else
//! 2. Each blocking gate produces its own failure code
//! 3. Gate order decides which code wins when several gates would fail
//! 4. Staleness annotates but never blocks
//! 5. Cooldown counts both bars and minutes since the last loss
//! 6. Short entries mirror long entries

use chrono::{DateTime, Duration, TimeZone, Utc};
use tradegate_core::config::EntryConfig;
use tradegate_core::domain::{Bar, Indicators, Regime, Side};
use tradegate_core::entry::{
    EntryContext, EntryDecision, EntryQualifier, FailureCode, LastLoss, PatternSignal,
};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 13, 0, 0).unwrap()
}

/// 15-minute bar at `index` with a 4-point range below/above close.
fn make_bar(index: usize, close: f64) -> Bar {
    let open_time = t0() + Duration::minutes(15 * index as i64);
    Bar {
        index,
        open_time,
        close_time: open_time + Duration::minutes(15),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 3.0,
        close,
    }
}

fn long_pattern(level: f64, formed_at: usize) -> PatternSignal {
    PatternSignal {
        is_valid: true,
        side: Side::Long,
        structural_level: level,
        formed_at_bar_index: formed_at,
    }
}

fn short_pattern(level: f64, formed_at: usize) -> PatternSignal {
    PatternSignal {
        is_valid: true,
        side: Side::Short,
        structural_level: level,
        formed_at_bar_index: formed_at,
    }
}

/// Indicators that support a long at `close`.
fn bullish(close: f64) -> Indicators {
    Indicators {
        trend_fast: close - 4.0,
        trend_slow: close - 25.0,
        volatility: 4.0,
    }
}

struct Case {
    bar: Bar,
    indicators: Indicators,
    pattern: Option<PatternSignal>,
    regime: Regime,
    evaluated_at: DateTime<Utc>,
    last_loss: Option<LastLoss>,
}

impl Case {
    /// A long setup that passes every gate.
    fn passing_long() -> Self {
        let bar = make_bar(30, 2000.0);
        let evaluated_at = bar.close_time;
        Self {
            bar,
            indicators: bullish(2000.0),
            pattern: Some(long_pattern(1995.0, 27)),
            regime: Regime::TrendingUp,
            evaluated_at,
            last_loss: None,
        }
    }

    fn qualify_with(&self, config: EntryConfig) -> EntryDecision {
        let ctx = EntryContext {
            bar: &self.bar,
            indicators: &self.indicators,
            pattern: self.pattern.as_ref(),
            regime: self.regime,
            evaluated_at: self.evaluated_at,
            last_loss: self.last_loss,
        };
        EntryQualifier::new(config).qualify(&ctx)
    }

    fn qualify(&self) -> EntryDecision {
        self.qualify_with(EntryConfig::default())
    }
}

fn code(decision: &EntryDecision) -> Option<FailureCode> {
    decision.failure_code()
}

// ──────────────────────────────────────────────
// Bar-close guard
// ──────────────────────────────────────────────

#[test]
fn unclosed_bar_rejected_before_any_other_gate() {
    let mut case = Case::passing_long();
    case.evaluated_at = case.bar.close_time - Duration::seconds(1);
    // Would also fail the pattern gate; the bar-close guard must win.
    case.pattern = None;

    let decision = case.qualify();
    assert_eq!(code(&decision), Some(FailureCode::BarNotClosed));
    match decision {
        EntryDecision::Rejected(r) => assert_eq!(r.gate, "bar_closed"),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn bar_closing_exactly_at_evaluation_counts_as_closed() {
    let case = Case::passing_long();
    assert_eq!(case.evaluated_at, case.bar.close_time);
    assert!(case.qualify().is_authorized());
}

// ──────────────────────────────────────────────
// Pattern gate
// ──────────────────────────────────────────────

#[test]
fn missing_or_incomplete_pattern_rejected() {
    let mut case = Case::passing_long();
    case.pattern = None;
    assert_eq!(code(&case.qualify()), Some(FailureCode::InvalidPatternStructure));

    let mut case = Case::passing_long();
    case.pattern = Some(PatternSignal {
        is_valid: false,
        ..long_pattern(1995.0, 27)
    });
    assert_eq!(code(&case.qualify()), Some(FailureCode::InvalidPatternStructure));
}

#[test]
fn old_or_future_pattern_rejected() {
    let mut case = Case::passing_long();
    case.pattern = Some(long_pattern(1995.0, 9)); // 21 bars old
    assert_eq!(code(&case.qualify()), Some(FailureCode::InvalidPatternStructure));

    case.pattern = Some(long_pattern(1995.0, 10)); // exactly at the limit
    assert!(case.qualify().is_authorized());

    case.pattern = Some(long_pattern(1995.0, 31));
    assert_eq!(code(&case.qualify()), Some(FailureCode::InvalidPatternStructure));
}

// ──────────────────────────────────────────────
// Breakout, trend, regime, momentum
// ──────────────────────────────────────────────

#[test]
fn close_at_level_is_not_a_breakout() {
    let mut case = Case::passing_long();
    case.pattern = Some(long_pattern(2000.0, 27));
    let decision = case.qualify();
    assert_eq!(code(&decision), Some(FailureCode::NoNecklineBreak));
    if let EntryDecision::Rejected(r) = decision {
        assert_eq!(r.snapshot.get("close"), Some(&2000.0));
        assert_eq!(r.snapshot.get("structural_level"), Some(&2000.0));
    }
}

#[test]
fn breakout_checked_before_trend_alignment() {
    let mut case = Case::passing_long();
    case.pattern = Some(long_pattern(2005.0, 27));
    case.indicators.trend_slow = 2050.0;
    assert_eq!(code(&case.qualify()), Some(FailureCode::NoNecklineBreak));
}

#[test]
fn long_below_slow_trend_not_aligned() {
    let mut case = Case::passing_long();
    case.indicators.trend_slow = 2010.0;
    assert_eq!(code(&case.qualify()), Some(FailureCode::ContextNotAligned));

    case.indicators.trend_slow = f64::NAN;
    assert_eq!(code(&case.qualify()), Some(FailureCode::ContextNotAligned));
}

#[test]
fn opposing_regime_conflicts() {
    let mut case = Case::passing_long();
    case.regime = Regime::TrendingDown;
    assert_eq!(code(&case.qualify()), Some(FailureCode::RegimeConflict));

    case.regime = Regime::Ranging;
    assert!(case.qualify().is_authorized());
}

#[test]
fn volatile_regime_blocks_only_when_configured() {
    let mut case = Case::passing_long();
    case.regime = Regime::Volatile;
    assert_eq!(code(&case.qualify()), Some(FailureCode::RegimeConflict));

    let relaxed = EntryConfig {
        block_volatile_regime: false,
        ..EntryConfig::default()
    };
    assert!(case.qualify_with(relaxed).is_authorized());
}

#[test]
fn narrow_bar_lacks_momentum() {
    let mut case = Case::passing_long();
    // Range 1.5 against threshold 0.5 * 4 = 2
    case.bar.high = 2000.5;
    case.bar.low = 1999.0;
    assert_eq!(code(&case.qualify()), Some(FailureCode::InsufficientMomentum));

    let mut case = Case::passing_long();
    case.indicators.volatility = f64::NAN;
    assert_eq!(code(&case.qualify()), Some(FailureCode::InsufficientMomentum));
}

// ──────────────────────────────────────────────
// Staleness (advisory)
// ──────────────────────────────────────────────

#[test]
fn stale_signal_is_flagged_not_blocked() {
    let mut case = Case::passing_long();
    case.pattern = Some(long_pattern(1995.0, 18)); // 12 bars old, stale after 10
    match case.qualify() {
        EntryDecision::Authorized(entry) => {
            assert!(entry.is_stale());
            assert_eq!(entry.advisories.len(), 1);
            assert_eq!(entry.advisories[0].gate, "staleness");
        }
        other => panic!("expected authorization, got {other:?}"),
    }

    let fresh = Case::passing_long();
    match fresh.qualify() {
        EntryDecision::Authorized(entry) => assert!(!entry.is_stale()),
        other => panic!("expected authorization, got {other:?}"),
    }
}

// ──────────────────────────────────────────────
// Cooldown
// ──────────────────────────────────────────────

#[test]
fn cooldown_requires_bars_and_minutes() {
    let mut case = Case::passing_long();

    // Two bars ago: too few bars.
    case.last_loss = Some(LastLoss {
        bar_index: 28,
        closed_at: case.evaluated_at - Duration::minutes(120),
    });
    assert_eq!(code(&case.qualify()), Some(FailureCode::CooldownActive));

    // Enough bars but only 45 minutes.
    case.last_loss = Some(LastLoss {
        bar_index: 26,
        closed_at: case.evaluated_at - Duration::minutes(45),
    });
    assert_eq!(code(&case.qualify()), Some(FailureCode::CooldownActive));

    // Both satisfied.
    case.last_loss = Some(LastLoss {
        bar_index: 26,
        closed_at: case.evaluated_at - Duration::minutes(60),
    });
    assert!(case.qualify().is_authorized());
}

// ──────────────────────────────────────────────
// Short mirroring
// ──────────────────────────────────────────────

#[test]
fn short_entry_mirrors_long() {
    let bar = make_bar(30, 2000.0);
    let case = Case {
        evaluated_at: bar.close_time,
        bar,
        indicators: Indicators {
            trend_fast: 2004.0,
            trend_slow: 2025.0,
            volatility: 4.0,
        },
        pattern: Some(short_pattern(2003.0, 27)),
        regime: Regime::TrendingDown,
        last_loss: None,
    };
    match case.qualify() {
        EntryDecision::Authorized(entry) => {
            assert_eq!(entry.side, Side::Short);
            assert_eq!(entry.entry_price, 2000.0);
            assert_eq!(entry.structural_level, 2003.0);
        }
        other => panic!("expected authorization, got {other:?}"),
    }

    let mut up = case;
    up.regime = Regime::TrendingUp;
    assert_eq!(code(&up.qualify()), Some(FailureCode::RegimeConflict));
}

#[test]
fn rejection_serializes_with_code() {
    let mut case = Case::passing_long();
    case.indicators.trend_slow = 2010.0;
    let json = serde_json::to_value(case.qualify()).unwrap();
    assert_eq!(json["outcome"], "rejected");
    assert_eq!(json["code"], "CONTEXT_NOT_ALIGNED");
}
