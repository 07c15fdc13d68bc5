//! TradeGate Core: trade-lifecycle decision engine.
//!
//! This crate decides when a single discretionary-style position may open and
//! how it is managed until it closes:
//! - Domain types (bars, indicators, positions, closed trades)
//! - Target calculator for three ordered, risk-multiple profit targets
//! - Entry qualifier with ordered gates and enumerated failure codes
//! - Multi-level take-profit exit state machine with a legacy fallback
//! - Exit reason auditor reconciling reported reasons against fill prices
//! - Engine facade routing each closed bar, plus the persistence seam

pub mod audit;
pub mod config;
pub mod domain;
pub mod engine;
pub mod entry;
pub mod exit;
pub mod store;
pub mod targets;

pub use config::{ConfigError, EngineConfig};
pub use engine::{BarInput, BarOutcome, DecisionEngine, RiskInput};
