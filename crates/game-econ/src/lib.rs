#![deny(warnings)]

//! Economic helpers for the business simulation game.
//!
//! This module provides validated utilities for:
//! - How many units a capital budget buys at a fixed unit cost
//! - Tiered price/demand curves and a day's sales at a given price
//! - Profit margin display and the profit-based completion score

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors produced by economic helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EconError {
    /// Unit cost must be strictly positive.
    #[error("unit cost must be > 0, got {0}")]
    NonPositiveCost(Decimal),
    /// Prices, capital and targets must be non-negative.
    #[error("invalid monetary value: {0}")]
    InvalidAmount(Decimal),
    /// Demand tiers must be non-empty and strictly ascending by markup.
    #[error("demand tiers must be non-empty and ascending")]
    InvalidCurve,
    /// Numeric conversion or arithmetic overflowed.
    #[error("numeric overflow")]
    Overflow,
}

/// Units that `capital` buys at `unit_cost`, floored.
///
/// Example:
/// let units = max_affordable_units(Decimal::new(1000, 0), Decimal::new(30, 0)).unwrap();
/// assert_eq!(units, 33);
pub fn max_affordable_units(capital: Decimal, unit_cost: Decimal) -> Result<u64, EconError> {
    if unit_cost <= Decimal::ZERO {
        return Err(EconError::NonPositiveCost(unit_cost));
    }
    if capital < Decimal::ZERO {
        return Err(EconError::InvalidAmount(capital));
    }
    (capital / unit_cost).floor().to_u64().ok_or(EconError::Overflow)
}

/// One step of a demand curve: prices up to `unit cost + max_markup`
/// (inclusive) sell at most `units` per day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandTier {
    pub max_markup: Decimal,
    pub units: u64,
}

/// Step-wise demand: cheaper prices attract more customers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandCurve {
    pub tiers: Vec<DemandTier>,
    /// Daily units when the price is above every tier.
    pub fallback_units: u64,
}

impl DemandCurve {
    /// Tiers must be non-empty with strictly ascending markups.
    pub fn validate(&self) -> Result<(), EconError> {
        if self.tiers.is_empty() {
            return Err(EconError::InvalidCurve);
        }
        if self
            .tiers
            .windows(2)
            .any(|w| w[0].max_markup >= w[1].max_markup)
        {
            return Err(EconError::InvalidCurve);
        }
        Ok(())
    }

    /// Daily customer demand at `price` for a product costing `unit_cost`.
    pub fn units_at(&self, price: Decimal, unit_cost: Decimal) -> u64 {
        self.tiers
            .iter()
            .find(|t| price <= unit_cost + t.max_markup)
            .map(|t| t.units)
            .unwrap_or(self.fallback_units)
    }
}

/// Outcome of one selling day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySales {
    pub units: u64,
    pub revenue: Decimal,
    pub profit: Decimal,
}

/// Sell for one day: `min(demand, inventory)` units at `price`.
///
/// Profit is `units * (price - unit_cost)`; revenue is `units * price`.
pub fn sell_day(
    price: Decimal,
    unit_cost: Decimal,
    inventory: u64,
    curve: &DemandCurve,
) -> Result<DaySales, EconError> {
    if unit_cost <= Decimal::ZERO {
        return Err(EconError::NonPositiveCost(unit_cost));
    }
    if price < Decimal::ZERO {
        return Err(EconError::InvalidAmount(price));
    }
    let units = curve.units_at(price, unit_cost).min(inventory);
    let qty = Decimal::from(units);
    let revenue = qty.checked_mul(price).ok_or(EconError::Overflow)?;
    let cost = qty.checked_mul(unit_cost).ok_or(EconError::Overflow)?;
    let sales = DaySales {
        units,
        revenue,
        profit: revenue - cost,
    };
    debug!(?sales, %price, "day sold");
    Ok(sales)
}

/// Margin as a percentage of price, rounded to one decimal place.
/// Returns None when price is zero.
///
/// Example:
/// assert_eq!(profit_margin_pct(Decimal::new(50,0), Decimal::new(30,0)), Some(Decimal::new(400,1)));
pub fn profit_margin_pct(price: Decimal, unit_cost: Decimal) -> Option<Decimal> {
    if price <= Decimal::ZERO {
        return None;
    }
    Some(((price - unit_cost) / price * Decimal::from(100)).round_dp(1))
}

/// Raw profit score: `total_profit / target * 100`, unclamped.
pub fn profit_score(total_profit: Decimal, target: Decimal) -> Result<Decimal, EconError> {
    if target <= Decimal::ZERO {
        return Err(EconError::InvalidAmount(target));
    }
    Ok(total_profit / target * Decimal::from(100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lemonade_curve() -> DemandCurve {
        DemandCurve {
            tiers: vec![
                DemandTier { max_markup: Decimal::from(20), units: 15 },
                DemandTier { max_markup: Decimal::from(50), units: 10 },
                DemandTier { max_markup: Decimal::from(100), units: 5 },
            ],
            fallback_units: 2,
        }
    }

    #[test]
    fn affordable_units_floor() {
        let u = max_affordable_units(Decimal::from(1000), Decimal::from(30)).unwrap();
        assert_eq!(u, 33);
        assert_eq!(max_affordable_units(Decimal::from(29), Decimal::from(30)).unwrap(), 0);
        assert!(max_affordable_units(Decimal::from(10), Decimal::ZERO).is_err());
    }

    #[test]
    fn tiers_step_down_with_price() {
        let c = lemonade_curve();
        let cost = Decimal::from(30);
        assert_eq!(c.units_at(Decimal::from(40), cost), 15);
        assert_eq!(c.units_at(Decimal::from(50), cost), 15);
        assert_eq!(c.units_at(Decimal::from(60), cost), 10);
        assert_eq!(c.units_at(Decimal::from(80), cost), 10);
        assert_eq!(c.units_at(Decimal::from(120), cost), 5);
        assert_eq!(c.units_at(Decimal::from(131), cost), 2);
    }

    #[test]
    fn sell_day_at_fifty() {
        let s = sell_day(Decimal::from(50), Decimal::from(30), 33, &lemonade_curve()).unwrap();
        assert_eq!(s.units, 15);
        assert_eq!(s.revenue, Decimal::from(750));
        assert_eq!(s.profit, Decimal::from(300));
    }

    #[test]
    fn sell_day_limited_by_inventory() {
        let s = sell_day(Decimal::from(50), Decimal::from(30), 3, &lemonade_curve()).unwrap();
        assert_eq!(s.units, 3);
        assert_eq!(s.profit, Decimal::from(60));
    }

    #[test]
    fn curve_validation() {
        assert!(lemonade_curve().validate().is_ok());
        let mut bad = lemonade_curve();
        bad.tiers.swap(0, 1);
        assert_eq!(bad.validate(), Err(EconError::InvalidCurve));
        let empty = DemandCurve { tiers: vec![], fallback_units: 1 };
        assert_eq!(empty.validate(), Err(EconError::InvalidCurve));
    }

    #[test]
    fn margin_and_score() {
        assert_eq!(
            profit_margin_pct(Decimal::from(50), Decimal::from(30)),
            Some(Decimal::new(400, 1))
        );
        assert_eq!(profit_margin_pct(Decimal::ZERO, Decimal::from(30)), None);
        assert_eq!(profit_score(Decimal::from(250), Decimal::from(500)).unwrap(), Decimal::from(50));
        assert!(profit_score(Decimal::from(250), Decimal::ZERO).is_err());
    }

    proptest! {
        #[test]
        fn demand_non_increasing_in_price(p in 0i64..500, bump in 1i64..200) {
            let c = lemonade_curve();
            let cost = Decimal::from(30);
            prop_assert!(c.units_at(Decimal::from(p), cost) >= c.units_at(Decimal::from(p + bump), cost));
        }

        #[test]
        fn sold_never_exceeds_inventory(p in 30i64..300, inv in 0u64..100) {
            let s = sell_day(Decimal::from(p), Decimal::from(30), inv, &lemonade_curve()).unwrap();
            prop_assert!(s.units <= inv);
            prop_assert!(s.profit >= Decimal::ZERO);
        }

        #[test]
        fn affordable_cost_never_exceeds_capital(capital in 0i64..1_000_000, cost in 1i64..1000) {
            let u = max_affordable_units(Decimal::from(capital), Decimal::from(cost)).unwrap();
            prop_assert!(Decimal::from(u) * Decimal::from(cost) <= Decimal::from(capital));
        }
    }
}
