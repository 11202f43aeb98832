//! Leg Ledger
//!
//! Tracked option legs and the per-strategy ledger that owns them.

pub mod errors;
pub mod entity;
pub mod state;
pub mod value_objects;

pub use errors::LegError;
pub use entity::{Leg, NewLeg};
pub use state::{LedgerStatus, StrategyState};
pub use value_objects::{OptionType, RoleTag, Side};
