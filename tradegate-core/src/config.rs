//! Engine configuration: an immutable value passed into every engine call.
//!
//! Loaded from a TOML document with `[targets]`, `[entry]`, `[exit]` and `[audit]`
//! tables. Every field has a default, so an empty document is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub targets: TargetConfig,
    pub entry: EntryConfig,
    pub exit: ExitConfig,
    pub audit: AuditConfig,
}

/// Target calculator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Risk multiples (r1, r2, r3) applied to the risk unit; strictly increasing.
    pub risk_multiples: [f64; 3],
    /// Money per price unit per unit of size.
    pub point_value: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            risk_multiples: [1.4, 1.8, 2.0],
            point_value: 1.0,
        }
    }
}

/// Entry qualifier parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntryConfig {
    /// A pattern older than this (in bars) is no longer structurally usable.
    pub max_pattern_age_bars: usize,
    /// Signals older than this (in bars since pattern formation) are flagged as stale.
    pub stale_after_bars: usize,
    /// Bar range must exceed this multiple of the volatility measure.
    pub min_range_atr_multiple: f64,
    /// Reject entries in both directions while the regime is tagged volatile.
    pub block_volatile_regime: bool,
    /// Minimum closed bars since the last losing trade.
    pub cooldown_bars: usize,
    /// Minimum wall-clock minutes since the last losing trade.
    pub cooldown_minutes: i64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            max_pattern_age_bars: 20,
            stale_after_bars: 10,
            min_range_atr_multiple: 0.5,
            block_volatile_regime: true,
            cooldown_bars: 3,
            cooldown_minutes: 60,
        }
    }
}

/// Exit state machine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExitConfig {
    /// Retracement threshold after TP1, in multiples of volatility.
    pub tp1_retrace_atr: f64,
    /// Retracement threshold after TP2, in multiples of volatility.
    pub tp2_retrace_atr: f64,
    /// Distance kept between the peak close and the trailing stop, in price units.
    pub trailing_offset: f64,
    /// Closed bars that must elapse after TP1 before a retracement exit may fire.
    pub min_bars_after_tp1: u32,
    /// Closed bars that must elapse after TP2 before a retracement exit may fire.
    pub min_bars_after_tp2: u32,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            tp1_retrace_atr: 0.25,
            tp2_retrace_atr: 0.20,
            trailing_offset: 0.5,
            min_bars_after_tp1: 1,
            min_bars_after_tp2: 1,
        }
    }
}

/// Exit reason auditor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Price tolerance when checking a claimed target against the fill.
    pub tolerance: f64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { tolerance: 0.01 }
    }
}

impl EngineConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [r1, r2, r3] = self.targets.risk_multiples;
        if !(r1 > 0.0 && r1 < r2 && r2 < r3) || !r3.is_finite() {
            return Err(invalid(
                "targets.risk_multiples",
                format!("must be positive and strictly increasing, got [{r1}, {r2}, {r3}]"),
            ));
        }
        require_positive("targets.point_value", self.targets.point_value)?;

        require_non_negative(
            "entry.min_range_atr_multiple",
            self.entry.min_range_atr_multiple,
        )?;
        if self.entry.cooldown_minutes < 0 {
            return Err(invalid(
                "entry.cooldown_minutes",
                format!("must be >= 0, got {}", self.entry.cooldown_minutes),
            ));
        }

        require_non_negative("exit.tp1_retrace_atr", self.exit.tp1_retrace_atr)?;
        require_non_negative("exit.tp2_retrace_atr", self.exit.tp2_retrace_atr)?;
        require_non_negative("exit.trailing_offset", self.exit.trailing_offset)?;
        // Same-bar whipsaw protection cannot be switched off.
        if self.exit.min_bars_after_tp1 < 1 {
            return Err(invalid("exit.min_bars_after_tp1", "must be >= 1".into()));
        }
        if self.exit.min_bars_after_tp2 < 1 {
            return Err(invalid("exit.min_bars_after_tp2", "must be >= 1".into()));
        }

        require_non_negative("audit.tolerance", self.audit.tolerance)?;
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be > 0, got {value}")))
    }
}

fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be >= 0, got {value}")))
    }
}
