use serde::{Deserialize, Serialize};
use std::fmt;

/// Position / ticket identifier.
///
/// The engine assigns sequential ids; positions recovered from the venue keep
/// the venue ticket number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl PositionId {
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u64> for PositionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_id_display_and_next() {
        let id = PositionId::from(41);
        assert_eq!(id.next(), PositionId(42));
        assert_eq!(id.to_string(), "#41");
    }

    #[test]
    fn next_saturates_at_max_ticket() {
        assert_eq!(PositionId(u64::MAX).next(), PositionId(u64::MAX));
    }
}
