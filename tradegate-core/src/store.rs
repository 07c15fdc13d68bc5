//! Persistence seam for open positions and closed trades.
//!
//! The engine only hands records to a [`PositionStore`]; it never reads back
//! mid-evaluation. Failures are reported to the caller, which logs them and
//! keeps monitoring.

use thiserror::Error;

use crate::domain::{ClosedTrade, Position};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable home for the tracked position and the closed-trade history.
pub trait PositionStore: Send {
    /// Persist the current state of the open position, replacing any earlier copy.
    fn save_open(&mut self, position: &Position) -> Result<(), StoreError>;

    /// Persist a finalized trade and forget the open position it came from.
    fn save_closed(&mut self, trade: &ClosedTrade) -> Result<(), StoreError>;

    /// The open position left by a previous session, if any.
    fn load_open(&self) -> Result<Option<Position>, StoreError>;

    /// Every finalized trade, oldest first.
    fn load_closed(&self) -> Result<Vec<ClosedTrade>, StoreError>;
}

/// Store that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    open: Option<Position>,
    closed: Vec<ClosedTrade>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a position, as if left open by an earlier session.
    pub fn with_open(position: Position) -> Self {
        Self {
            open: Some(position),
            closed: Vec::new(),
        }
    }

    pub fn open(&self) -> Option<&Position> {
        self.open.as_ref()
    }

    pub fn closed(&self) -> &[ClosedTrade] {
        &self.closed
    }
}

impl PositionStore for MemoryStore {
    fn save_open(&mut self, position: &Position) -> Result<(), StoreError> {
        self.open = Some(position.clone());
        Ok(())
    }

    fn save_closed(&mut self, trade: &ClosedTrade) -> Result<(), StoreError> {
        if self.open.as_ref().is_some_and(|p| p.id == trade.id()) {
            self.open = None;
        }
        self.closed.push(trade.clone());
        Ok(())
    }

    fn load_open(&self) -> Result<Option<Position>, StoreError> {
        Ok(self.open.clone())
    }

    fn load_closed(&self) -> Result<Vec<ClosedTrade>, StoreError> {
        Ok(self.closed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::ExitReasonAuditor;
    use crate::config::{AuditConfig, TargetConfig};
    use crate::domain::{PositionId, Side};
    use crate::exit::ExitReason;
    use crate::targets::TargetCalculator;
    use chrono::{TimeZone, Utc};

    fn position(id: u64) -> Position {
        let targets = TargetCalculator::new(&TargetConfig::default())
            .compute(Side::Long, 2000.0, 1990.0, 1.0)
            .unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        Position::open(PositionId(id), targets, 1.0, at, 0)
    }

    #[test]
    fn save_closed_clears_matching_open() {
        let mut store = MemoryStore::new();
        let pos = position(1);
        store.save_open(&pos).unwrap();
        assert_eq!(store.load_open().unwrap().map(|p| p.id), Some(PositionId(1)));

        let trade = ExitReasonAuditor::new(&AuditConfig::default()).finalize(
            pos.clone(),
            ExitReason::StopLoss,
            1989.0,
            pos.opened_at,
            3,
            1.0,
        );
        store.save_closed(&trade).unwrap();
        assert!(store.load_open().unwrap().is_none());
        assert_eq!(store.closed().len(), 1);
        assert_eq!(
            store.load_closed().unwrap().iter().map(|t| t.id()).collect::<Vec<_>>(),
            vec![PositionId(1)]
        );
    }

    #[test]
    fn save_open_replaces_previous_copy() {
        let mut store = MemoryStore::new();
        let mut pos = position(2);
        store.save_open(&pos).unwrap();
        pos.current_stop = 2000.0;
        store.save_open(&pos).unwrap();
        assert_eq!(store.open().map(|p| p.current_stop), Some(2000.0));
    }
}
