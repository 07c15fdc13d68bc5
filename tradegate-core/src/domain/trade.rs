//! ClosedTrade: the immutable record a position becomes once it exits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Position, PositionId, Side, TpState};
use crate::audit::AuditCorrection;
use crate::exit::ExitReason;
use crate::targets::TargetSet;

/// A completed trade, finalized through the exit reason auditor.
///
/// New records are only built by the auditor (see
/// [`crate::audit::ExitReasonAuditor::finalize`]), so every record the engine persists
/// has had its reason checked against the fill price. `Deserialize` exists to load
/// those already-audited records back from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    id: PositionId,
    side: Side,
    size: f64,

    entry_price: f64,
    opened_at: DateTime<Utc>,
    opened_bar: usize,

    exit_price: f64,
    closed_at: DateTime<Utc>,
    closed_bar: usize,

    original_stop: f64,
    final_stop: f64,
    targets: Option<TargetSet>,
    /// Furthest TP state reached before the exit.
    state_at_exit: TpState,

    reason: ExitReason,
    audit: Option<AuditCorrection>,

    bars_held: u32,
    points: f64,
    pnl: f64,
}

impl ClosedTrade {
    pub(crate) fn new(
        position: Position,
        exit_price: f64,
        closed_at: DateTime<Utc>,
        closed_bar: usize,
        reason: ExitReason,
        audit: Option<AuditCorrection>,
        point_value: f64,
    ) -> Self {
        let points = position.points_at(exit_price);
        Self {
            id: position.id,
            side: position.side,
            size: position.size,
            entry_price: position.entry_price,
            opened_at: position.opened_at,
            opened_bar: position.opened_bar,
            exit_price,
            closed_at,
            closed_bar,
            original_stop: position.original_stop,
            final_stop: position.current_stop,
            state_at_exit: position.state_at_exit.unwrap_or(position.state),
            targets: position.targets,
            reason,
            audit,
            bars_held: position.bars_held,
            points,
            pnl: points * position.size * point_value,
        }
    }

    pub fn id(&self) -> PositionId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn exit_price(&self) -> f64 {
        self.exit_price
    }

    pub fn closed_at(&self) -> DateTime<Utc> {
        self.closed_at
    }

    pub fn closed_bar(&self) -> usize {
        self.closed_bar
    }

    pub fn original_stop(&self) -> f64 {
        self.original_stop
    }

    pub fn final_stop(&self) -> f64 {
        self.final_stop
    }

    pub fn targets(&self) -> Option<&TargetSet> {
        self.targets.as_ref()
    }

    pub fn state_at_exit(&self) -> TpState {
        self.state_at_exit
    }

    /// Final exit reason, after any audit correction.
    pub fn reason(&self) -> &ExitReason {
        &self.reason
    }

    /// The correction applied by the auditor, if the reported reason was rewritten.
    pub fn audit(&self) -> Option<&AuditCorrection> {
        self.audit.as_ref()
    }

    pub fn bars_held(&self) -> u32 {
        self.bars_held
    }

    /// Result in price points (positive = profit).
    pub fn points(&self) -> f64 {
        self.points
    }

    /// Result in money.
    pub fn pnl(&self) -> f64 {
        self.pnl
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.pnl < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn legacy_position() -> Position {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        Position::legacy(PositionId(7), Side::Short, 2000.0, 2010.0, Some(1980.0), 2.0, at, 4)
    }

    #[test]
    fn pnl_is_signed_by_side() {
        let closed_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let trade = ClosedTrade::new(
            legacy_position(),
            1990.0,
            closed_at,
            12,
            ExitReason::TakeProfit,
            None,
            10.0,
        );
        assert_eq!(trade.points(), 10.0);
        assert_eq!(trade.pnl(), 200.0);
        assert!(trade.is_winner());
        assert_eq!(trade.final_stop(), 2010.0);
    }

    #[test]
    fn trade_serialization_roundtrip() {
        let closed_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let trade = ClosedTrade::new(
            legacy_position(),
            2010.0,
            closed_at,
            12,
            ExitReason::StopLoss,
            None,
            1.0,
        );
        let json = serde_json::to_string(&trade).unwrap();
        let back: ClosedTrade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, back);
        assert!(back.is_loser());
    }
}
