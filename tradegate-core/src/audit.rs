//! Exit reason auditor: reconciles the reported close reason with the fill price.
//!
//! Runs exactly once per closed position, immediately before the record is
//! persisted. A reason that claims a profit threshold the fill does not satisfy
//! is rewritten to the protective-exit reason and the correction is recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AuditConfig;
use crate::domain::{ClosedTrade, Position, PositionId, Side};
use crate::exit::ExitReason;
use crate::targets::TargetLevel;

/// Record of a rewritten exit reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditCorrection {
    pub position_id: PositionId,
    pub side: Side,
    pub original_reason: ExitReason,
    pub corrected_reason: ExitReason,
    /// Threshold the original reason claimed; `None` if the position has no such level.
    pub claimed_price: Option<f64>,
    pub close_price: f64,
    /// Shortfall of the close against the claimed threshold, in price units.
    pub discrepancy: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ExitReasonAuditor {
    tolerance: f64,
}

impl ExitReasonAuditor {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            tolerance: config.tolerance,
        }
    }

    /// Check a reported reason against the close price.
    ///
    /// Returns the correction when the reason must be rewritten. A reason that
    /// makes no price claim is never corrected, which makes the check idempotent.
    pub fn check(
        &self,
        position: &Position,
        reported: &ExitReason,
        close_price: f64,
    ) -> Option<AuditCorrection> {
        if !reported.claims_price_level() {
            return None;
        }

        let claimed_price = claimed_threshold(position, reported);
        let side = position.side;
        if let Some(threshold) = claimed_price {
            if close_price.is_finite()
                && side.reached(close_price + side.sign() * self.tolerance, threshold)
            {
                return None;
            }
        }

        let correction = AuditCorrection {
            position_id: position.id,
            side,
            original_reason: reported.clone(),
            corrected_reason: ExitReason::RetracementFailure,
            claimed_price,
            close_price,
            discrepancy: claimed_price.map(|threshold| side.favorable_move(close_price, threshold)),
        };

        tracing::info!(
            target: "tradegate::audit",
            id = %correction.position_id,
            side = %side,
            original = %correction.original_reason,
            corrected = %correction.corrected_reason,
            claimed_price = ?correction.claimed_price,
            close_price,
            discrepancy = ?correction.discrepancy,
            tolerance = self.tolerance,
            "exit reason corrected"
        );
        Some(correction)
    }

    /// Audit `reported` and convert the position into its permanent closed record.
    pub fn finalize(
        &self,
        mut position: Position,
        reported: ExitReason,
        fill_price: f64,
        closed_at: DateTime<Utc>,
        closed_bar: usize,
        point_value: f64,
    ) -> ClosedTrade {
        let correction = self.check(&position, &reported, fill_price);
        let reason = correction
            .as_ref()
            .map(|c| c.corrected_reason.clone())
            .unwrap_or(reported);
        position.last_exit_reason = Some(reason.clone());
        ClosedTrade::new(
            position,
            fill_price,
            closed_at,
            closed_bar,
            reason,
            correction,
            point_value,
        )
    }
}

/// Price level a reason claims was reached.
///
/// "take profit" refers to the legacy single target, or the final target on a
/// multi-level position.
fn claimed_threshold(position: &Position, reason: &ExitReason) -> Option<f64> {
    match reason {
        ExitReason::TargetReached(level) => position.targets.as_ref().map(|t| t.price(*level)),
        ExitReason::TakeProfit => position.legacy_take_profit.or_else(|| {
            position
                .targets
                .as_ref()
                .map(|t| t.price(TargetLevel::Tp3))
        }),
        _ => None,
    }
}
