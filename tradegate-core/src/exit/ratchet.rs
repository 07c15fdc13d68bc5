/// Ratchet invariant enforcement
///
/// **Core Rule:** Stops may tighten, never loosen.
///
/// Breakeven and trailing relocations are proposals; the ratchet decides
/// whether they actually move the stop.
use crate::domain::Side;

/// Ratchet state for a single stop-loss level.
///
/// - Long positions: stop can only rise (tighten)
/// - Short positions: stop can only fall (tighten)
#[derive(Debug, Clone, PartialEq)]
pub struct RatchetState {
    current_level: f64,
    side: Side,
}

impl RatchetState {
    /// Create a ratchet seeded with the position's current stop
    pub fn with_initial_level(side: Side, initial_level: f64) -> Self {
        Self {
            current_level: initial_level,
            side,
        }
    }

    /// Apply ratchet to a proposed stop level
    ///
    /// Returns the ratcheted level (can only tighten, never loosen).
    ///
    /// # Example
    /// ```
    /// use tradegate_core::domain::Side;
    /// use tradegate_core::exit::RatchetState;
    ///
    /// let mut ratchet = RatchetState::with_initial_level(Side::Long, 1990.0);
    ///
    /// // Breakeven: 1990 -> 2000 (allowed)
    /// assert_eq!(ratchet.apply(2000.0), 2000.0);
    ///
    /// // Loosening: 2000 -> 1995 (blocked, stays at 2000)
    /// assert_eq!(ratchet.apply(1995.0), 2000.0);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        if !proposed.is_finite() {
            return self.current_level;
        }
        self.current_level = match self.side {
            Side::Long => self.current_level.max(proposed),
            Side::Short => self.current_level.min(proposed),
        };
        self.current_level
    }

    /// Get current ratchet level
    pub fn current_level(&self) -> f64 {
        self.current_level
    }
}
