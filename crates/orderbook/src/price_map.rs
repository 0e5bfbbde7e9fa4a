//! Quantity-by-price store for one side of the book.

use std::collections::BTreeMap;

use model::{PriceLevelUpdate, Side};
use rust_decimal::Decimal;

use crate::error::OrderBookError;
use crate::level::PriceLevel;

/// What a single `apply` did to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    Inserted,
    Updated,
    Removed,
    /// Zero quantity for a price that was not present.
    Unchanged,
}

/// One side of the book: unique prices mapped to positive quantities.
///
/// A zero quantity is a removal signal and is never stored.
#[derive(Debug, Clone)]
pub struct PriceLevelMap {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl PriceLevelMap {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Set the quantity at `price`, removing the level when `quantity` is zero.
    ///
    /// Rejects non-positive prices and negative quantities without touching the map.
    pub fn apply(&mut self, price: Decimal, quantity: Decimal) -> Result<LevelChange, OrderBookError> {
        if price <= Decimal::ZERO {
            return Err(OrderBookError::InvalidPrice {
                side: self.side,
                price,
            });
        }
        if quantity < Decimal::ZERO {
            return Err(OrderBookError::InvalidQuantity {
                side: self.side,
                price,
                quantity,
            });
        }

        if quantity.is_zero() {
            return Ok(match self.levels.remove(&price) {
                Some(_) => LevelChange::Removed,
                None => LevelChange::Unchanged,
            });
        }

        Ok(match self.levels.insert(price, quantity) {
            Some(_) => LevelChange::Updated,
            None => LevelChange::Inserted,
        })
    }

    /// Clear the map and load `levels`, returning the rejected entries.
    pub fn replace(&mut self, levels: &[PriceLevelUpdate]) -> Vec<OrderBookError> {
        self.levels.clear();
        levels
            .iter()
            .filter_map(|(price, quantity)| self.apply(*price, *quantity).err())
            .collect()
    }

    /// Quantity resting at `price`, if any.
    pub fn get(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&price).copied()
    }

    /// The best level: highest bid or lowest ask.
    pub fn best(&self) -> Option<PriceLevel> {
        let entry = match self.side {
            Side::Bid => self.levels.last_key_value(),
            Side::Ask => self.levels.first_key_value(),
        };
        entry.map(|(price, qty)| PriceLevel::new(*price, *qty))
    }

    /// Up to `n` levels starting at the best price and moving away from the spread.
    pub fn best_levels(&self, n: usize) -> Vec<PriceLevel> {
        let to_level = |(price, qty): (&Decimal, &Decimal)| PriceLevel::new(*price, *qty);
        match self.side {
            Side::Bid => self.levels.iter().rev().take(n).map(to_level).collect(),
            Side::Ask => self.levels.iter().take(n).map(to_level).collect(),
        }
    }

    /// All `(price, quantity)` pairs. The order is an implementation detail.
    pub fn iter(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.levels
            .iter()
            .map(|(price, qty)| PriceLevel::new(*price, *qty))
    }

    /// Sum of all resting quantity on this side, saturating at `Decimal::MAX`.
    pub fn total_quantity(&self) -> Decimal {
        self.levels.values().fold(Decimal::ZERO, |sum, qty| {
            sum.checked_add(*qty).unwrap_or(Decimal::MAX)
        })
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insert_update_remove() {
        let mut map = PriceLevelMap::new(Side::Bid);

        assert_eq!(map.apply(dec!(100), dec!(1)), Ok(LevelChange::Inserted));
        assert_eq!(map.apply(dec!(100), dec!(3)), Ok(LevelChange::Updated));
        assert_eq!(map.get(dec!(100)), Some(dec!(3)));
        assert_eq!(map.len(), 1);

        assert_eq!(map.apply(dec!(100), dec!(0)), Ok(LevelChange::Removed));
        assert!(map.is_empty());
        assert_eq!(map.get(dec!(100)), None);
    }

    #[test]
    fn test_remove_absent_price_is_noop() {
        let mut map = PriceLevelMap::new(Side::Ask);
        map.apply(dec!(101), dec!(1)).unwrap();

        assert_eq!(map.apply(dec!(105), dec!(0)), Ok(LevelChange::Unchanged));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_zero_with_scale_removes() {
        let mut map = PriceLevelMap::new(Side::Ask);
        map.apply(dec!(101.50), dec!(2)).unwrap();

        // "101.5" and "0.00000000" come off the wire with different scales.
        assert_eq!(map.apply(dec!(101.5), dec!(0.00000000)), Ok(LevelChange::Removed));
        assert!(map.is_empty());
    }

    #[test]
    fn test_rejects_negative_quantity() {
        let mut map = PriceLevelMap::new(Side::Bid);
        map.apply(dec!(100), dec!(1)).unwrap();

        let err = map.apply(dec!(100), dec!(-1)).unwrap_err();
        assert!(matches!(err, OrderBookError::InvalidQuantity { side: Side::Bid, .. }));
        // Existing level untouched
        assert_eq!(map.get(dec!(100)), Some(dec!(1)));
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let mut map = PriceLevelMap::new(Side::Ask);

        assert!(matches!(
            map.apply(dec!(0), dec!(1)),
            Err(OrderBookError::InvalidPrice { .. })
        ));
        assert!(matches!(
            map.apply(dec!(-5), dec!(1)),
            Err(OrderBookError::InvalidPrice { .. })
        ));
        assert!(map.is_empty());
    }

    #[test]
    fn test_best_per_side() {
        let mut bids = PriceLevelMap::new(Side::Bid);
        let mut asks = PriceLevelMap::new(Side::Ask);
        for price in [dec!(98), dec!(100), dec!(99)] {
            bids.apply(price, dec!(1)).unwrap();
            asks.apply(price + dec!(5), dec!(1)).unwrap();
        }

        assert_eq!(bids.best().unwrap().price, dec!(100));
        assert_eq!(asks.best().unwrap().price, dec!(103));

        let top_bids: Vec<_> = bids.best_levels(2).iter().map(|l| l.price).collect();
        assert_eq!(top_bids, vec![dec!(100), dec!(99)]);
        let top_asks: Vec<_> = asks.best_levels(5).iter().map(|l| l.price).collect();
        assert_eq!(top_asks, vec![dec!(103), dec!(104), dec!(105)]);
    }

    #[test]
    fn test_replace_reports_rejects() {
        let mut map = PriceLevelMap::new(Side::Bid);
        map.apply(dec!(50), dec!(1)).unwrap();

        let rejected = map.replace(&[
            (dec!(100), dec!(1)),
            (dec!(99), dec!(-2)),
            (dec!(98), dec!(0)),
            (dec!(97), dec!(4)),
        ]);

        assert_eq!(rejected.len(), 1);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(dec!(50)), None);
        assert_eq!(map.total_quantity(), dec!(5));
    }

    #[test]
    fn test_last_write_wins_for_repeated_price() {
        let mut map = PriceLevelMap::new(Side::Bid);
        for qty in [dec!(1), dec!(0), dec!(7), dec!(2)] {
            map.apply(dec!(100), qty).unwrap();
        }

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(dec!(100)), Some(dec!(2)));
        assert_eq!(map.iter().count(), 1);
    }
}
