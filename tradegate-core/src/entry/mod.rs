//! Entry qualifier: fixed, ordered pipeline of gates over one candidate bar.
//!
//! Evaluation stops at the first blocking failure. Rejections are ordinary data
//! carrying exactly one [`FailureCode`] plus a snapshot of the values the gate
//! inspected. The staleness gate is advisory: it annotates but never blocks.

pub mod gates;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::EntryConfig;
use crate::domain::{Bar, Indicators, Regime, Side};

pub use gates::{
    BarClosedGate, BreakoutGate, CooldownGate, MomentumGate, PatternGate, RegimeGate,
    StalenessCheck, TrendAlignmentGate,
};

/// Which gate rejected an entry.
///
/// Closed and additive-only: the meaning of an existing code never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    BarNotClosed,
    InvalidPatternStructure,
    NoNecklineBreak,
    ContextNotAligned,
    CooldownActive,
    RegimeConflict,
    InsufficientMomentum,
}

impl FailureCode {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCode::BarNotClosed => "BAR_NOT_CLOSED",
            FailureCode::InvalidPatternStructure => "INVALID_PATTERN_STRUCTURE",
            FailureCode::NoNecklineBreak => "NO_NECKLINE_BREAK",
            FailureCode::ContextNotAligned => "CONTEXT_NOT_ALIGNED",
            FailureCode::CooldownActive => "COOLDOWN_ACTIVE",
            FailureCode::RegimeConflict => "REGIME_CONFLICT",
            FailureCode::InsufficientMomentum => "INSUFFICIENT_MOMENTUM",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pattern-recognition result supplied by the pattern collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSignal {
    pub is_valid: bool,
    pub side: Side,
    /// Structural level the breakout must clear (e.g. the neckline).
    pub structural_level: f64,
    pub formed_at_bar_index: usize,
}

impl PatternSignal {
    /// Bars elapsed between pattern formation and `bar_index`, or `None` if formed later.
    pub fn age_at(&self, bar_index: usize) -> Option<usize> {
        bar_index.checked_sub(self.formed_at_bar_index)
    }
}

/// The most recent losing trade, as tracked for the cooldown gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastLoss {
    pub bar_index: usize,
    pub closed_at: DateTime<Utc>,
}

/// Snapshot of every gate input for one candidate bar.
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    pub bar: &'a Bar,
    pub indicators: &'a Indicators,
    pub pattern: Option<&'a PatternSignal>,
    pub regime: Regime,
    pub evaluated_at: DateTime<Utc>,
    pub last_loss: Option<LastLoss>,
}

/// Verdict of a single gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Pass,
    /// Non-blocking warning.
    Advisory(String),
    Reject {
        code: FailureCode,
        detail: String,
        snapshot: BTreeMap<String, f64>,
    },
}

impl GateVerdict {
    pub fn reject(code: FailureCode, detail: impl Into<String>) -> Self {
        GateVerdict::Reject {
            code,
            detail: detail.into(),
            snapshot: BTreeMap::new(),
        }
    }

    pub fn reject_with(
        code: FailureCode,
        detail: impl Into<String>,
        snapshot: impl IntoIterator<Item = (&'static str, f64)>,
    ) -> Self {
        GateVerdict::Reject {
            code,
            detail: detail.into(),
            snapshot: snapshot
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

/// A single qualification gate.
///
/// Gates see only the market-side entry context, never an open position.
pub trait EntryGate: Send + Sync {
    /// Human-readable name (e.g., "breakout", "cooldown").
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &EntryContext<'_>, config: &EntryConfig) -> GateVerdict;
}

/// Record of a rejected entry attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: FailureCode,
    pub gate: String,
    pub bar_index: usize,
    pub detail: String,
    /// Values the gate inspected when it rejected.
    pub snapshot: BTreeMap<String, f64>,
}

/// Non-blocking note raised during qualification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub gate: String,
    pub message: String,
}

/// An entry that passed every blocking gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizedEntry {
    pub side: Side,
    pub structural_level: f64,
    /// Close of the qualifying bar, used as the entry reference price.
    pub entry_price: f64,
    pub bar_index: usize,
    pub advisories: Vec<Advisory>,
}

impl AuthorizedEntry {
    /// True if the staleness check flagged the signal.
    pub fn is_stale(&self) -> bool {
        self.advisories
            .iter()
            .any(|a| a.gate == StalenessCheck::NAME)
    }
}

/// Result of one qualification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryDecision {
    Authorized(AuthorizedEntry),
    Rejected(Rejection),
}

impl EntryDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, EntryDecision::Authorized(_))
    }

    pub fn failure_code(&self) -> Option<FailureCode> {
        match self {
            EntryDecision::Authorized(_) => None,
            EntryDecision::Rejected(r) => Some(r.code),
        }
    }
}

/// Runs the gates in canonical order.
pub struct EntryQualifier {
    config: EntryConfig,
    gates: Vec<Box<dyn EntryGate>>,
}

impl EntryQualifier {
    pub fn new(config: EntryConfig) -> Self {
        let gates: Vec<Box<dyn EntryGate>> = vec![
            Box::new(BarClosedGate),
            Box::new(PatternGate),
            Box::new(BreakoutGate),
            Box::new(TrendAlignmentGate),
            Box::new(RegimeGate),
            Box::new(MomentumGate),
            Box::new(StalenessCheck),
            Box::new(CooldownGate),
        ];
        Self { config, gates }
    }

    /// Gate names in evaluation order.
    pub fn gate_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    pub fn qualify(&self, ctx: &EntryContext<'_>) -> EntryDecision {
        let mut advisories = Vec::new();

        for gate in &self.gates {
            match gate.check(ctx, &self.config) {
                GateVerdict::Pass => {}
                GateVerdict::Advisory(message) => {
                    tracing::warn!(
                        gate = gate.name(),
                        bar = ctx.bar.index,
                        "{message}"
                    );
                    advisories.push(Advisory {
                        gate: gate.name().to_string(),
                        message,
                    });
                }
                GateVerdict::Reject {
                    code,
                    detail,
                    snapshot,
                } => {
                    tracing::debug!(
                        gate = gate.name(),
                        bar = ctx.bar.index,
                        code = %code,
                        ?snapshot,
                        "entry rejected: {detail}"
                    );
                    return EntryDecision::Rejected(Rejection {
                        code,
                        gate: gate.name().to_string(),
                        bar_index: ctx.bar.index,
                        detail,
                        snapshot,
                    });
                }
            }
        }

        // Every gate past PatternGate requires a pattern, so this only fails
        // if the pipeline order is broken.
        let Some(pattern) = ctx.pattern else {
            return EntryDecision::Rejected(Rejection {
                code: FailureCode::InvalidPatternStructure,
                gate: PatternGate::NAME.to_string(),
                bar_index: ctx.bar.index,
                detail: "no pattern supplied".into(),
                snapshot: BTreeMap::new(),
            });
        };

        tracing::info!(
            side = %pattern.side,
            bar = ctx.bar.index,
            close = ctx.bar.close,
            structural_level = pattern.structural_level,
            advisories = advisories.len(),
            "entry authorized"
        );
        EntryDecision::Authorized(AuthorizedEntry {
            side: pattern.side,
            structural_level: pattern.structural_level,
            entry_price: ctx.bar.close,
            bar_index: ctx.bar.index,
            advisories,
        })
    }
}
