//! The bot's belief about its own live exposure.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Lifecycle of the hedge pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionState {
    /// No exposure on either leg
    Flat,
    /// Entry orders submitted, fills not yet confirmed on both legs
    Entering,
    /// Both legs confirmed; collecting funding
    Open,
    /// Unwind orders in flight
    Exiting,
}

/// Single source of truth for "are we currently hedged".
///
/// Mutated only by the strategy, and only after confirmed execution results.
/// Invariants: `Open` implies both quantities non-zero; `Flat` implies both
/// zero.
#[derive(Debug, Clone, Serialize)]
pub struct HedgePosition {
    pub state: PositionState,
    pub spot_qty: Decimal,
    pub perp_qty: Decimal,
    pub entry_funding_rate: Decimal,
    pub opened_at: Option<DateTime<Utc>>,
}

impl HedgePosition {
    /// A fresh, flat position.
    pub fn new() -> Self {
        Self {
            state: PositionState::Flat,
            spot_qty: Decimal::ZERO,
            perp_qty: Decimal::ZERO,
            entry_funding_rate: Decimal::ZERO,
            opened_at: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.state == PositionState::Flat
    }

    /// Commit to `Open` with the actual filled quantities.
    pub fn open(&mut self, spot_qty: Decimal, perp_qty: Decimal, entry_funding_rate: Decimal) {
        debug_assert!(spot_qty > Decimal::ZERO && perp_qty > Decimal::ZERO);
        self.state = PositionState::Open;
        self.spot_qty = spot_qty;
        self.perp_qty = perp_qty;
        self.entry_funding_rate = entry_funding_rate;
        self.opened_at = Some(Utc::now());
    }

    /// Zero everything out and return to `Flat`.
    pub fn flatten(&mut self) {
        self.state = PositionState::Flat;
        self.spot_qty = Decimal::ZERO;
        self.perp_qty = Decimal::ZERO;
        self.entry_funding_rate = Decimal::ZERO;
        self.opened_at = None;
    }

    /// How long the position has been open.
    pub fn held_for(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.opened_at.map(|opened| now - opened)
    }
}

impl Default for HedgePosition {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_position_is_flat_with_zero_quantities() {
        let position = HedgePosition::new();
        assert!(position.is_flat());
        assert_eq!(position.spot_qty, Decimal::ZERO);
        assert_eq!(position.perp_qty, Decimal::ZERO);
        assert!(position.opened_at.is_none());
    }

    #[test]
    fn test_open_records_fills_and_rate() {
        let mut position = HedgePosition::new();
        position.open(dec!(0.001), dec!(0.0011), dec!(0.0002));

        assert_eq!(position.state, PositionState::Open);
        assert_eq!(position.spot_qty, dec!(0.001));
        assert_eq!(position.perp_qty, dec!(0.0011));
        assert_eq!(position.entry_funding_rate, dec!(0.0002));
        assert!(position.opened_at.is_some());
    }

    #[test]
    fn test_flatten_restores_invariant() {
        let mut position = HedgePosition::new();
        position.open(dec!(0.001), dec!(0.001), dec!(0.0002));
        position.flatten();

        assert!(position.is_flat());
        assert_eq!(position.spot_qty, Decimal::ZERO);
        assert_eq!(position.perp_qty, Decimal::ZERO);
        assert!(position.opened_at.is_none());
    }
}
