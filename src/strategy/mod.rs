//! Trading strategy implementation.
//!
//! Contains the core logic for:
//! - The position state machine driving entry and exit
//! - Quantity sizing for the delta-neutral pair
//! - Leg-mismatch detection and corrective unwinds

mod engine;
mod position;
mod sizer;

pub use engine::FundingArbStrategy;
pub use position::{HedgePosition, PositionState};
pub use sizer::{LegQuantities, PositionSizer};
