//! Quantity sizing for the hedge pair.

use crate::config::SizingConfig;
use crate::utils::decimal::round_down_to_lot;
use rust_decimal::Decimal;
use tracing::debug;

/// Per-leg quantities for one entry. Zero quantities mean "cannot size".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegQuantities {
    pub spot_qty: Decimal,
    pub perp_qty: Decimal,
}

impl LegQuantities {
    pub const ZERO: LegQuantities = LegQuantities {
        spot_qty: Decimal::ZERO,
        perp_qty: Decimal::ZERO,
    };

    pub fn is_zero(&self) -> bool {
        self.spot_qty == Decimal::ZERO || self.perp_qty == Decimal::ZERO
    }
}

/// Computes leg quantities such that spot notional ≈ perp notional.
///
/// Pure: no side effects, deterministic given inputs.
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Size both legs from available capital and the configured target.
    ///
    /// The effective notional is the smaller of available capital and target;
    /// each leg's quantity is that notional at its own price, rounded down to
    /// the venue lot size. Anything that lands below the minimum order
    /// notional on either leg sizes to zero.
    pub fn size(
        &self,
        available_capital_usd: Decimal,
        target_notional_usd: Decimal,
        spot_price: Decimal,
        mark_price: Decimal,
    ) -> LegQuantities {
        if spot_price <= Decimal::ZERO || mark_price <= Decimal::ZERO {
            return LegQuantities::ZERO;
        }

        let effective_notional = available_capital_usd.min(target_notional_usd);
        if effective_notional < self.config.min_order_notional {
            debug!(
                %effective_notional,
                min = %self.config.min_order_notional,
                "Effective notional below minimum order size"
            );
            return LegQuantities::ZERO;
        }

        let spot_qty = round_down_to_lot(effective_notional / spot_price, self.config.spot_lot_size);
        let perp_qty = round_down_to_lot(effective_notional / mark_price, self.config.perp_lot_size);

        // Lot rounding can drag a leg back under the venue minimum
        if spot_qty * spot_price < self.config.min_order_notional
            || perp_qty * mark_price < self.config.min_order_notional
        {
            return LegQuantities::ZERO;
        }

        LegQuantities { spot_qty, perp_qty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sizer() -> PositionSizer {
        PositionSizer::new(SizingConfig {
            min_order_notional: dec!(5),
            spot_lot_size: dec!(0.000001),
            perp_lot_size: dec!(0.000001),
            notional_tolerance: dec!(0.02),
        })
    }

    #[test]
    fn test_capital_caps_notional() {
        let s = sizer();
        // $30 available against a $50 target: sizes to $30
        let q = s.size(dec!(30), dec!(50), dec!(50000), dec!(50000));
        assert_eq!(q.spot_qty, dec!(0.0006));
        assert_eq!(q.perp_qty, dec!(0.0006));
    }

    #[test]
    fn test_target_caps_notional() {
        let s = sizer();
        let q = s.size(dec!(1000), dec!(50), dec!(50000), dec!(50000));
        assert_eq!(q.spot_qty, dec!(0.001));
        assert_eq!(q.perp_qty, dec!(0.001));
    }

    #[test]
    fn test_legs_priced_independently() {
        let s = sizer();
        let q = s.size(dec!(1000), dec!(50), dec!(50000), dec!(50100));
        assert_eq!(q.spot_qty, dec!(0.001));
        // 50 / 50100 = 0.000998..., floored to the lot
        assert_eq!(q.perp_qty, dec!(0.000998));
    }

    #[test]
    fn test_below_minimum_returns_zero() {
        let s = sizer();
        let q = s.size(dec!(3), dec!(50), dec!(50000), dec!(50000));
        assert!(q.is_zero());
    }

    #[test]
    fn test_zero_capital_returns_zero() {
        let s = sizer();
        assert!(s.size(Decimal::ZERO, dec!(50), dec!(50000), dec!(50000)).is_zero());
    }

    #[test]
    fn test_degenerate_price_returns_zero() {
        let s = sizer();
        assert!(s.size(dec!(100), dec!(50), Decimal::ZERO, dec!(50000)).is_zero());
    }

    #[test]
    fn test_lot_rounding_floors() {
        let coarse = PositionSizer::new(SizingConfig {
            min_order_notional: dec!(5),
            spot_lot_size: dec!(0.001),
            perp_lot_size: dec!(0.001),
            notional_tolerance: dec!(0.02),
        });
        // 50 / 3000 = 0.01666..., floored to 0.016
        let q = coarse.size(dec!(1000), dec!(50), dec!(3000), dec!(3000));
        assert_eq!(q.spot_qty, dec!(0.016));
    }

    #[test]
    fn test_sizing_monotonic_in_capital() {
        let s = sizer();
        let prices = (dec!(50000), dec!(50100));
        let mut prev = LegQuantities::ZERO;
        for capital in [dec!(5), dec!(10), dec!(25), dec!(40), dec!(50), dec!(80)] {
            let q = s.size(capital, dec!(50), prices.0, prices.1);
            assert!(q.spot_qty >= prev.spot_qty);
            assert!(q.perp_qty >= prev.perp_qty);
            prev = q;
        }
    }
}
