//! Exit decisions, one per closed bar per open position.

use serde::{Deserialize, Serialize};

use super::ExitReason;
use crate::domain::TpState;

/// Outcome of the legacy two-outcome (stop-loss / take-profit) evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleExit {
    pub should_exit: bool,
    /// Set exactly when `should_exit` is true.
    pub reason: Option<ExitReason>,
    pub summary: String,
    pub new_stop_loss: f64,
}

/// Outcome of the multi-level take-profit evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLevelExit {
    pub should_exit: bool,
    /// Set exactly when `should_exit` is true.
    pub reason: Option<ExitReason>,
    pub summary: String,
    pub new_tp_state: TpState,
    pub new_stop_loss: f64,
}

/// Exit decision, tagged by the evaluation path that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitDecision {
    Simple(SimpleExit),
    MultiLevel(MultiLevelExit),
}

impl ExitDecision {
    pub(crate) fn simple_hold(stop: f64, summary: impl Into<String>) -> Self {
        ExitDecision::Simple(SimpleExit {
            should_exit: false,
            reason: None,
            summary: summary.into(),
            new_stop_loss: stop,
        })
    }

    pub(crate) fn simple_exit(reason: ExitReason, stop: f64, summary: impl Into<String>) -> Self {
        ExitDecision::Simple(SimpleExit {
            should_exit: true,
            reason: Some(reason),
            summary: summary.into(),
            new_stop_loss: stop,
        })
    }

    pub(crate) fn multi_hold(state: TpState, stop: f64, summary: impl Into<String>) -> Self {
        ExitDecision::MultiLevel(MultiLevelExit {
            should_exit: false,
            reason: None,
            summary: summary.into(),
            new_tp_state: state,
            new_stop_loss: stop,
        })
    }

    pub(crate) fn multi_exit(reason: ExitReason, stop: f64, summary: impl Into<String>) -> Self {
        ExitDecision::MultiLevel(MultiLevelExit {
            should_exit: true,
            reason: Some(reason),
            summary: summary.into(),
            new_tp_state: TpState::Exited,
            new_stop_loss: stop,
        })
    }

    pub fn should_exit(&self) -> bool {
        match self {
            ExitDecision::Simple(d) => d.should_exit,
            ExitDecision::MultiLevel(d) => d.should_exit,
        }
    }

    pub fn reason(&self) -> Option<&ExitReason> {
        match self {
            ExitDecision::Simple(d) => d.reason.as_ref(),
            ExitDecision::MultiLevel(d) => d.reason.as_ref(),
        }
    }

    /// Human-readable description of what happened on this bar.
    pub fn summary(&self) -> &str {
        match self {
            ExitDecision::Simple(d) => &d.summary,
            ExitDecision::MultiLevel(d) => &d.summary,
        }
    }

    pub fn new_stop_loss(&self) -> f64 {
        match self {
            ExitDecision::Simple(d) => d.new_stop_loss,
            ExitDecision::MultiLevel(d) => d.new_stop_loss,
        }
    }

    /// New TP state; `None` on the legacy path.
    pub fn new_tp_state(&self) -> Option<TpState> {
        match self {
            ExitDecision::Simple(_) => None,
            ExitDecision::MultiLevel(d) => Some(d.new_tp_state),
        }
    }

    pub fn is_multi_level(&self) -> bool {
        matches!(self, ExitDecision::MultiLevel(_))
    }
}
