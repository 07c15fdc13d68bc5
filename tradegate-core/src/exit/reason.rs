//! Exit reasons and their persisted text form.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::targets::TargetLevel;

const STOP_LOSS: &str = "stop loss";
const PROTECTIVE_EXIT: &str = "protective exit — retracement failure";
const TAKE_PROFIT: &str = "take profit";

/// Why a position closed.
///
/// Persisted as its human-readable text, so records written by other tools
/// (manual closes, venue-side liquidations) round-trip as [`ExitReason::External`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExitReason {
    /// Close crossed the current stop (original, breakeven or trailing).
    StopLoss,
    /// Close reached the given target.
    TargetReached(TargetLevel),
    /// Pulled back after a target without continuation support.
    RetracementFailure,
    /// Legacy single take-profit reached.
    TakeProfit,
    /// Any other reason reported by an external collaborator.
    External(String),
}

impl ExitReason {
    /// The target this reason claims was reached, if any.
    pub fn claimed_target(&self) -> Option<TargetLevel> {
        match self {
            ExitReason::TargetReached(level) => Some(*level),
            _ => None,
        }
    }

    /// True if the reason asserts a profit threshold was met at the fill.
    pub fn claims_price_level(&self) -> bool {
        matches!(self, ExitReason::TargetReached(_) | ExitReason::TakeProfit)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => f.write_str(STOP_LOSS),
            ExitReason::TargetReached(level) => write!(f, "target {} reached", level.number()),
            ExitReason::RetracementFailure => f.write_str(PROTECTIVE_EXIT),
            ExitReason::TakeProfit => f.write_str(TAKE_PROFIT),
            ExitReason::External(text) => f.write_str(text),
        }
    }
}

impl From<String> for ExitReason {
    fn from(text: String) -> Self {
        let normalized = text.trim().to_lowercase();
        match normalized.as_str() {
            STOP_LOSS => return ExitReason::StopLoss,
            PROTECTIVE_EXIT => return ExitReason::RetracementFailure,
            TAKE_PROFIT => return ExitReason::TakeProfit,
            _ => {}
        }
        let level = normalized
            .strip_prefix("target ")
            .and_then(|rest| rest.strip_suffix(" reached"))
            .and_then(|n| n.parse::<u8>().ok())
            .and_then(TargetLevel::from_number);
        match level {
            Some(level) => ExitReason::TargetReached(level),
            None => ExitReason::External(text),
        }
    }
}

impl From<&str> for ExitReason {
    fn from(text: &str) -> Self {
        ExitReason::from(text.to_string())
    }
}

impl From<ExitReason> for String {
    fn from(reason: ExitReason) -> Self {
        reason.to_string()
    }
}
