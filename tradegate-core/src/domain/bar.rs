//! Bar: the fundamental market data unit, plus the indicator snapshot that travels with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLC bar for the traded instrument.
///
/// `close_time` is the instant the bar completes. Decisions are only taken on bars
/// whose `close_time` is at or before the evaluation instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub index: usize,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// Returns true if the bar has completed at `now`.
    pub fn is_closed_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.close_time
    }

    /// High-low range of the bar.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.close > 0.0
            && self.close_time >= self.open_time
    }
}

/// Precomputed indicator values for one bar, supplied by the indicator collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    /// Short-horizon trend filter (e.g. a fast moving average).
    pub trend_fast: f64,
    /// Long-horizon trend filter.
    pub trend_slow: f64,
    /// Volatility measure in price units (ATR).
    pub volatility: f64,
}

/// Market regime tag attached to each bar by the context collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    #[default]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_bar() -> Bar {
        let open_time = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        Bar {
            index: 0,
            open_time,
            close_time: open_time + Duration::minutes(15),
            open: 2000.0,
            high: 2006.0,
            low: 1998.0,
            close: 2004.0,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_closed_only_after_close_time() {
        let bar = sample_bar();
        assert!(!bar.is_closed_at(bar.close_time - Duration::seconds(1)));
        assert!(bar.is_closed_at(bar.close_time));
        assert!(bar.is_closed_at(bar.close_time + Duration::minutes(1)));
    }

    #[test]
    fn regime_serializes_snake_case() {
        let json = serde_json::to_string(&Regime::TrendingDown).unwrap();
        assert_eq!(json, "\"trending_down\"");
    }
}
