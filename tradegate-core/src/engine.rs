//! Decision engine facade: routes each closed bar to entry or exit evaluation.
//!
//! While flat, a bar goes through the entry qualifier and, if authorized, the
//! target calculator. Once a position is open, every bar drives the exit state
//! machine. Closing records always pass through the exit reason auditor before
//! they reach the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::ExitReasonAuditor;
use crate::config::{ConfigError, EngineConfig};
use crate::domain::{
    Bar, ClosedTrade, Indicators, Position, PositionId, Regime, Side, TpState,
};
use crate::entry::{
    AuthorizedEntry, EntryContext, EntryDecision, EntryQualifier, LastLoss, PatternSignal,
    Rejection,
};
use crate::exit::{ExitDecision, ExitInput, ExitReason, ExitStateMachine};
use crate::store::PositionStore;
use crate::targets::{TargetCalculator, TargetError, TargetSet};

/// Stop-loss and size from the risk collaborator, consulted at entry only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskInput {
    pub stop_loss: f64,
    pub size: f64,
}

/// Everything the engine needs for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarInput {
    pub bar: Bar,
    pub indicators: Indicators,
    #[serde(default)]
    pub regime: Regime,
    #[serde(default)]
    pub pattern: Option<PatternSignal>,
    #[serde(default)]
    pub risk: Option<RiskInput>,
    /// Evaluation instant; defaults to the bar's close time.
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl BarInput {
    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at.unwrap_or(self.bar.close_time)
    }
}

/// What the engine did with one bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BarOutcome {
    /// Bar carried NaN prices and was ignored.
    Skipped { bar_index: usize },
    Rejected(Rejection),
    /// Entry authorized but no stop/size was supplied.
    AwaitingRisk(AuthorizedEntry),
    /// Entry authorized but the target set could not be built.
    EntryBlocked {
        entry: AuthorizedEntry,
        error: TargetError,
    },
    Opened {
        entry: AuthorizedEntry,
        position: Position,
    },
    Held(ExitDecision),
    Closed {
        decision: ExitDecision,
        trade: ClosedTrade,
    },
}

impl BarOutcome {
    /// True when this bar's entry evaluation authorized a trade.
    pub fn authorized(&self) -> bool {
        matches!(
            self,
            BarOutcome::AwaitingRisk(_)
                | BarOutcome::EntryBlocked { .. }
                | BarOutcome::Opened { .. }
        )
    }

    pub fn failure_code(&self) -> Option<crate::entry::FailureCode> {
        match self {
            BarOutcome::Rejected(r) => Some(r.code),
            _ => None,
        }
    }

    pub fn direction(&self) -> Option<Side> {
        match self {
            BarOutcome::AwaitingRisk(entry)
            | BarOutcome::EntryBlocked { entry, .. }
            | BarOutcome::Opened { entry, .. } => Some(entry.side),
            _ => None,
        }
    }

    pub fn targets(&self) -> Option<&TargetSet> {
        match self {
            BarOutcome::Opened { position, .. } => position.targets.as_ref(),
            _ => None,
        }
    }

    pub fn exit_decision(&self) -> Option<&ExitDecision> {
        match self {
            BarOutcome::Held(decision) | BarOutcome::Closed { decision, .. } => Some(decision),
            _ => None,
        }
    }

    pub fn closed_trade(&self) -> Option<&ClosedTrade> {
        match self {
            BarOutcome::Closed { trade, .. } => Some(trade),
            _ => None,
        }
    }
}

/// Owns the single tracked position and everything that decides its fate.
pub struct DecisionEngine<S: PositionStore> {
    config: EngineConfig,
    calculator: TargetCalculator,
    qualifier: EntryQualifier,
    machine: ExitStateMachine,
    auditor: ExitReasonAuditor,
    position: Option<Position>,
    last_loss: Option<LastLoss>,
    next_id: PositionId,
    store: S,
}

impl<S: PositionStore> DecisionEngine<S> {
    /// Build an engine, picking up any open position the store still holds.
    ///
    /// Identifiers continue after the highest one the store has seen, and the
    /// cooldown resumes from the most recent losing trade on record.
    pub fn new(config: EngineConfig, store: S) -> Result<Self, ConfigError> {
        config.validate()?;

        let stored = match store.load_open() {
            Ok(position) => position,
            Err(e) => {
                tracing::error!(error = %e, "failed to load open position; starting flat");
                None
            }
        };
        let closed = store.load_closed().unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to load closed trades; starting without history");
            Vec::new()
        });

        let next_id = closed
            .iter()
            .map(|t| t.id())
            .chain(stored.as_ref().map(|p| p.id))
            .max()
            .map(PositionId::next)
            .unwrap_or(PositionId(1));
        let last_loss = closed
            .iter()
            .filter(|t| t.is_loser())
            .max_by_key(|t| (t.closed_at(), t.closed_bar()))
            .map(|t| LastLoss {
                bar_index: t.closed_bar(),
                closed_at: t.closed_at(),
            });

        let position = stored.filter(|p| !p.state.is_exited());
        if let Some(p) = &position {
            tracing::info!(id = %p.id, side = %p.side, state = %p.state, "resumed open position");
        }
        if let Some(loss) = &last_loss {
            tracing::info!(
                bar = loss.bar_index,
                closed_at = %loss.closed_at,
                "resumed cooldown from last loss"
            );
        }

        Ok(Self {
            calculator: TargetCalculator::new(&config.targets),
            qualifier: EntryQualifier::new(config.entry.clone()),
            machine: ExitStateMachine::new(config.exit.clone()),
            auditor: ExitReasonAuditor::new(&config.audit),
            config,
            position,
            last_loss,
            next_id,
            store,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn last_loss(&self) -> Option<LastLoss> {
        self.last_loss
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Process one bar.
    pub fn on_bar(&mut self, input: &BarInput) -> BarOutcome {
        if input.bar.is_void() {
            tracing::warn!(bar = input.bar.index, "void bar skipped");
            return BarOutcome::Skipped {
                bar_index: input.bar.index,
            };
        }

        if self.position.is_some() {
            self.monitor(input)
        } else {
            self.try_enter(input)
        }
    }

    fn try_enter(&mut self, input: &BarInput) -> BarOutcome {
        let evaluated_at = input.evaluated_at();
        let ctx = EntryContext {
            bar: &input.bar,
            indicators: &input.indicators,
            pattern: input.pattern.as_ref(),
            regime: input.regime,
            evaluated_at,
            last_loss: self.last_loss,
        };

        let entry = match self.qualifier.qualify(&ctx) {
            EntryDecision::Authorized(entry) => entry,
            EntryDecision::Rejected(rejection) => return BarOutcome::Rejected(rejection),
        };

        let Some(risk) = input.risk else {
            tracing::warn!(
                bar = input.bar.index,
                side = %entry.side,
                "entry authorized without stop/size; not opened"
            );
            return BarOutcome::AwaitingRisk(entry);
        };

        let targets = match self
            .calculator
            .compute(entry.side, entry.entry_price, risk.stop_loss, risk.size)
        {
            Ok(targets) => targets,
            Err(error) => return BarOutcome::EntryBlocked { entry, error },
        };

        let position = Position::open(
            self.next_id,
            targets,
            risk.size,
            evaluated_at,
            input.bar.index,
        );
        self.next_id = self.next_id.next();
        tracing::info!(
            id = %position.id,
            side = %position.side,
            entry = position.entry_price,
            stop = position.current_stop,
            targets = ?position.targets.as_ref().map(|t| t.prices()),
            stale = entry.is_stale(),
            "position opened"
        );
        self.persist_open(&position);
        self.position = Some(position.clone());
        BarOutcome::Opened { entry, position }
    }

    fn monitor(&mut self, input: &BarInput) -> BarOutcome {
        let Some(mut position) = self.position.take() else {
            return self.try_enter(input);
        };

        let evaluated_at = input.evaluated_at();
        let exit_input = ExitInput {
            bar: &input.bar,
            indicators: &input.indicators,
            regime: input.regime,
            evaluated_at,
        };
        let decision = self.machine.evaluate(&mut position, &exit_input);

        if !decision.should_exit() {
            if input.bar.is_closed_at(evaluated_at) {
                self.persist_open(&position);
            }
            self.position = Some(position);
            return BarOutcome::Held(decision);
        }

        let reason = decision
            .reason()
            .cloned()
            .unwrap_or_else(|| ExitReason::External("unspecified".into()));
        let trade = self.close(position, reason, input.bar.close, evaluated_at, input.bar.index);
        BarOutcome::Closed { decision, trade }
    }

    /// Record a close that happened outside the engine (manual or broker-side).
    ///
    /// The reported reason is audited like any other. Returns `None` when no
    /// position is tracked.
    pub fn reconcile_external_close(
        &mut self,
        fill_price: f64,
        reason: ExitReason,
        closed_at: DateTime<Utc>,
        closed_bar: usize,
    ) -> Option<ClosedTrade> {
        let Some(mut position) = self.position.take() else {
            tracing::warn!(%reason, fill_price, "external close reported with no open position");
            return None;
        };
        tracing::info!(id = %position.id, %reason, fill_price, "reconciling external close");
        position.state_at_exit = Some(position.state);
        position.state = TpState::Exited;
        Some(self.close(position, reason, fill_price, closed_at, closed_bar))
    }

    fn close(
        &mut self,
        position: Position,
        reason: ExitReason,
        fill_price: f64,
        closed_at: DateTime<Utc>,
        closed_bar: usize,
    ) -> ClosedTrade {
        let trade = self.auditor.finalize(
            position,
            reason,
            fill_price,
            closed_at,
            closed_bar,
            self.config.targets.point_value,
        );

        if trade.is_loser() {
            self.last_loss = Some(LastLoss {
                bar_index: closed_bar,
                closed_at,
            });
        }

        tracing::info!(
            id = %trade.id(),
            side = %trade.side(),
            reason = %trade.reason(),
            corrected = trade.audit().is_some(),
            points = trade.points(),
            pnl = trade.pnl(),
            bars_held = trade.bars_held(),
            "position closed"
        );

        if let Err(e) = self.store.save_closed(&trade) {
            tracing::error!(id = %trade.id(), error = %e, "failed to persist closed trade");
        }
        trade
    }

    fn persist_open(&mut self, position: &Position) {
        if let Err(e) = self.store.save_open(position) {
            tracing::error!(id = %position.id, error = %e, "failed to persist open position");
        }
    }
}
