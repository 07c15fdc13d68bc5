//! Domain types for the decision engine

pub mod bar;
pub mod ids;
pub mod position;
pub mod side;
pub mod trade;

pub use bar::{Bar, Indicators, Regime};
pub use ids::PositionId;
pub use position::{Position, TpState};
pub use side::Side;
pub use trade::ClosedTrade;
