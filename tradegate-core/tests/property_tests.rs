//! Property tests for decision engine invariants.
//!
//! Uses proptest to verify:
//! 1. Target ordering: computed targets are strictly monotonic beyond entry
//! 2. No backward transitions: TP state rank never decreases
//! 3. Ratchet monotonicity: the stop only tightens while a position is open
//! 4. Stop-loss precedence: a crossed stop always exits as "stop loss"
//! 5. No retracement exit on the bar that reaches a target
//! 6. Auditor idempotence: a finalized reason is never corrected again

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tradegate_core::audit::ExitReasonAuditor;
use tradegate_core::config::{AuditConfig, ExitConfig, TargetConfig};
use tradegate_core::domain::{Bar, Indicators, Position, PositionId, Regime, Side};
use tradegate_core::exit::{ExitInput, ExitReason, ExitStateMachine};
use tradegate_core::targets::{TargetCalculator, TargetLevel};

// ── Helpers ──────────────────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()
}

fn make_bar(index: usize, close: f64) -> Bar {
    let open_time = t0() + Duration::minutes(index as i64);
    Bar {
        index,
        open_time,
        close_time: open_time + Duration::minutes(1),
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
    }
}

fn open_position(side: Side) -> Position {
    let stop = 2000.0 - side.sign() * 10.0;
    let targets = TargetCalculator::new(&TargetConfig::default())
        .compute(side, 2000.0, stop, 1.0)
        .unwrap();
    Position::open(PositionId(1), targets, 1.0, t0(), 0)
}

fn evaluate(
    machine: &ExitStateMachine,
    pos: &mut Position,
    index: usize,
    close: f64,
    indicators: &Indicators,
) -> tradegate_core::exit::ExitDecision {
    let bar = make_bar(index, close);
    let input = ExitInput {
        bar: &bar,
        indicators,
        regime: Regime::Unknown,
        evaluated_at: bar.close_time,
    };
    machine.evaluate(pos, &input)
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

/// Increasing risk multiples.
fn arb_multiples() -> impl Strategy<Value = [f64; 3]> {
    (0.1..3.0_f64, 0.01..2.0_f64, 0.01..2.0_f64)
        .prop_map(|(r1, g1, g2)| [r1, r1 + g1, r1 + g1 + g2])
}

/// A path of closes around entry 2000, reaching past every target.
fn arb_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1980.0..2025.0_f64, 1..40)
}

fn arb_indicators() -> impl Strategy<Value = Indicators> {
    (1990.0..2030.0_f64, 0.5..10.0_f64).prop_map(|(trend_fast, volatility)| Indicators {
        trend_fast,
        trend_slow: 2000.0,
        volatility,
    })
}

// ── 1. Target ordering ───────────────────────────────────────────────

proptest! {
    #[test]
    fn targets_strictly_ordered_beyond_entry(
        side in arb_side(),
        entry in 100.0..5000.0_f64,
        risk in 0.1..100.0_f64,
        multiples in arb_multiples(),
    ) {
        let calc = TargetCalculator::new(&TargetConfig {
            risk_multiples: multiples,
            point_value: 1.0,
        });
        let stop = entry - side.sign() * risk;
        let set = calc.compute(side, entry, stop, 1.0).unwrap();
        let [t1, t2, t3] = set.prices();
        match side {
            Side::Long => prop_assert!(entry < t1 && t1 < t2 && t2 < t3),
            Side::Short => prop_assert!(entry > t1 && t1 > t2 && t2 > t3),
        }
    }
}

// ── 2-5. State machine walks ─────────────────────────────────────────

proptest! {
    /// TP state rank never decreases, and the stop never loosens.
    #[test]
    fn forward_only_and_stop_ratchets(
        side in arb_side(),
        path in arb_path(),
        indicators in arb_indicators(),
    ) {
        let machine = ExitStateMachine::new(ExitConfig::default());
        let mut pos = open_position(side);
        // Mirror the long path for shorts around entry.
        let path: Vec<f64> = path.iter().map(|c| 2000.0 + side.sign() * (c - 2000.0)).collect();

        let mut rank = pos.state.rank();
        let mut stop = pos.current_stop;
        for (i, close) in path.into_iter().enumerate() {
            let decision = evaluate(&machine, &mut pos, i + 1, close, &indicators);
            prop_assert!(pos.state.rank() >= rank, "state moved backward");
            prop_assert!(
                side.favorable_move(stop, pos.current_stop) >= -1e-9,
                "stop loosened from {} to {}", stop, pos.current_stop
            );
            rank = pos.state.rank();
            stop = pos.current_stop;
            if decision.should_exit() {
                prop_assert!(pos.state.is_exited());
                // Further bars are no-ops.
                let after = evaluate(&machine, &mut pos, i + 2, close, &indicators);
                prop_assert!(!after.should_exit());
                prop_assert!(pos.state.is_exited());
                break;
            }
        }
    }

    /// A close through the current stop exits as a stop loss whatever the state.
    #[test]
    fn crossed_stop_always_exits_as_stop_loss(
        side in arb_side(),
        path in arb_path(),
        indicators in arb_indicators(),
        overshoot in 0.0..5.0_f64,
    ) {
        let machine = ExitStateMachine::new(ExitConfig::default());
        let mut pos = open_position(side);
        let path: Vec<f64> = path.iter().map(|c| 2000.0 + side.sign() * (c - 2000.0)).collect();
        let mut index = 1;
        for close in path {
            if evaluate(&machine, &mut pos, index, close, &indicators).should_exit() {
                return Ok(());
            }
            index += 1;
        }

        let close = pos.current_stop - side.sign() * overshoot;
        let decision = evaluate(&machine, &mut pos, index, close, &indicators);
        prop_assert!(decision.should_exit());
        prop_assert_eq!(decision.reason(), Some(&ExitReason::StopLoss));
    }

    /// The bar that first reaches target 1 never exits as a retracement.
    #[test]
    fn no_retracement_on_target_bar(
        side in arb_side(),
        beyond in 0.0..3.9_f64,
        indicators in arb_indicators(),
    ) {
        let machine = ExitStateMachine::new(ExitConfig::default());
        let mut pos = open_position(side);
        let close = 2014.0 + beyond;
        let close = 2000.0 + side.sign() * (close - 2000.0);
        let decision = evaluate(&machine, &mut pos, 1, close, &indicators);
        prop_assert!(!decision.should_exit());
        prop_assert!(pos.state.rank() >= 1);
    }
}

// ── 6. Auditor idempotence ───────────────────────────────────────────

fn arb_reason() -> impl Strategy<Value = ExitReason> {
    prop_oneof![
        Just(ExitReason::StopLoss),
        Just(ExitReason::RetracementFailure),
        Just(ExitReason::TakeProfit),
        Just(ExitReason::TargetReached(TargetLevel::Tp1)),
        Just(ExitReason::TargetReached(TargetLevel::Tp2)),
        Just(ExitReason::TargetReached(TargetLevel::Tp3)),
        Just(ExitReason::External("manual close".into())),
    ]
}

proptest! {
    #[test]
    fn audit_is_idempotent(
        side in arb_side(),
        reason in arb_reason(),
        fill in 1970.0..2030.0_f64,
    ) {
        let auditor = ExitReasonAuditor::new(&AuditConfig::default());
        let pos = open_position(side);
        let trade = auditor.finalize(pos.clone(), reason.clone(), fill, t0(), 5, 1.0);

        prop_assert!(auditor.check(&pos, trade.reason(), fill).is_none());
        if trade.audit().is_none() {
            prop_assert_eq!(trade.reason(), &reason);
        } else {
            prop_assert_eq!(trade.reason(), &ExitReason::RetracementFailure);
        }
    }
}
