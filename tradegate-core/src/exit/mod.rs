//! Exit side of the decision engine: reasons, decisions, stop ratchet and the
//! multi-level take-profit state machine.

pub mod decision;
pub mod machine;
pub mod ratchet;
pub mod reason;

pub use decision::{ExitDecision, MultiLevelExit, SimpleExit};
pub use machine::{ExitInput, ExitStateMachine};
pub use ratchet::RatchetState;
pub use reason::ExitReason;
