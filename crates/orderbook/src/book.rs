//! Two-sided price-level book.

use model::{DepthSnapshot, PriceLevelUpdate, Side};
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::OrderBookError;
use crate::level::PriceLevel;
use crate::price_map::{LevelChange, PriceLevelMap};

/// Counts of what one batch did to the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplySummary {
    /// Levels inserted or overwritten.
    pub upserted: usize,
    /// Levels removed by a zero quantity.
    pub removed: usize,
    /// Levels rejected as invalid and skipped.
    pub rejected: usize,
}

impl ApplySummary {
    fn record(&mut self, change: LevelChange) {
        match change {
            LevelChange::Inserted | LevelChange::Updated => self.upserted += 1,
            LevelChange::Removed => self.removed += 1,
            LevelChange::Unchanged => {}
        }
    }

    /// Fold another summary into this one.
    pub fn merge(&mut self, other: ApplySummary) {
        self.upserted += other.upserted;
        self.removed += other.removed;
        self.rejected += other.rejected;
    }
}

/// Local order book for a single symbol.
///
/// Bids and asks are independent maps. The book tolerates a crossed state
/// (best bid at or above best ask); the feed does not promise otherwise.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: String,
    bids: PriceLevelMap,
    asks: PriceLevelMap,
}

impl OrderBook {
    /// Creates a new empty order book for the given symbol.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: PriceLevelMap::new(Side::Bid),
            asks: PriceLevelMap::new(Side::Ask),
        }
    }

    /// Returns the symbol this order book tracks.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bids(&self) -> &PriceLevelMap {
        &self.bids
    }

    pub fn asks(&self) -> &PriceLevelMap {
        &self.asks
    }

    /// Replace both sides with the snapshot contents.
    pub fn apply_snapshot(&mut self, snapshot: &DepthSnapshot) -> ApplySummary {
        let mut summary = ApplySummary::default();

        for side in [Side::Bid, Side::Ask] {
            let (map, levels) = match side {
                Side::Bid => (&mut self.bids, &snapshot.bids),
                Side::Ask => (&mut self.asks, &snapshot.asks),
            };
            let rejected = map.replace(levels);
            for err in &rejected {
                warn!(symbol = %self.symbol, error = %err, "Dropping invalid snapshot level");
            }
            summary.rejected += rejected.len();
            summary.upserted += map.len();
        }

        summary
    }

    /// Apply one batch of deltas: bids first, then asks, each in array order.
    ///
    /// An invalid level is skipped and logged; the rest of the batch still applies.
    pub fn apply_update(
        &mut self,
        bids: &[PriceLevelUpdate],
        asks: &[PriceLevelUpdate],
    ) -> ApplySummary {
        let mut summary = ApplySummary::default();
        Self::apply_side(&self.symbol, &mut self.bids, bids, &mut summary);
        Self::apply_side(&self.symbol, &mut self.asks, asks, &mut summary);
        summary
    }

    fn apply_side(
        symbol: &str,
        map: &mut PriceLevelMap,
        levels: &[PriceLevelUpdate],
        summary: &mut ApplySummary,
    ) {
        for (price, quantity) in levels {
            match map.apply(*price, *quantity) {
                Ok(change) => summary.record(change),
                Err(err) => {
                    summary.rejected += 1;
                    warn_invalid_level(symbol, &err);
                }
            }
        }
    }

    /// Returns the best (highest) bid price level.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.best()
    }

    /// Returns the best (lowest) ask price level.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.best()
    }

    /// Returns the spread (best ask - best bid). Negative when the book is crossed.
    pub fn spread(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some(ask.price - bid.price)
    }

    /// True when the best bid is at or above the best ask.
    pub fn is_crossed(&self) -> bool {
        self.spread().is_some_and(|spread| spread <= Decimal::ZERO)
    }

    /// Returns the total number of bid levels.
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Returns the total number of ask levels.
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Removes every level on both sides.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}

fn warn_invalid_level(symbol: &str, err: &OrderBookError) {
    warn!(symbol = %symbol, error = %err, "Dropping invalid price level");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seeded() -> OrderBook {
        let mut book = OrderBook::new("BTCUSDT");
        book.apply_snapshot(&DepthSnapshot {
            last_update_id: None,
            bids: vec![(dec!(100), dec!(1)), (dec!(99), dec!(2))],
            asks: vec![(dec!(101), dec!(1)), (dec!(102), dec!(3))],
        });
        book
    }

    #[test]
    fn test_empty_book() {
        let book = OrderBook::new("BTCUSDT");
        assert_eq!(book.symbol(), "BTCUSDT");
        assert!(book.is_empty());
        assert!(book.best_bid().is_none());
        assert!(book.best_ask().is_none());
        assert!(book.spread().is_none());
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_apply_snapshot_replaces_both_sides() {
        let mut book = seeded();
        book.apply_update(&[(dec!(95), dec!(9))], &[(dec!(110), dec!(9))]);

        let summary = book.apply_snapshot(&DepthSnapshot {
            last_update_id: Some(7),
            bids: vec![(dec!(200), dec!(1))],
            asks: vec![(dec!(201), dec!(1)), (dec!(202), dec!(0))],
        });

        assert_eq!(summary.upserted, 2);
        assert_eq!(book.bid_levels(), 1);
        assert_eq!(book.ask_levels(), 1);
        assert_eq!(book.bids().get(dec!(95)), None);
        assert_eq!(book.best_bid().unwrap().price, dec!(200));
    }

    #[test]
    fn test_delta_removes_zero_quantity() {
        let mut book = seeded();

        let summary = book.apply_update(&[(dec!(100), dec!(0))], &[]);

        assert_eq!(summary.removed, 1);
        assert_eq!(book.best_bid().unwrap().price, dec!(99));
        assert_eq!(book.bid_levels(), 1);
        assert_eq!(book.spread(), Some(dec!(2)));
    }

    #[test]
    fn test_last_write_wins_within_batch() {
        let mut book = seeded();

        book.apply_update(
            &[(dec!(98), dec!(1)), (dec!(98), dec!(0)), (dec!(98), dec!(4))],
            &[(dec!(101), dec!(5)), (dec!(101), dec!(0))],
        );

        assert_eq!(book.bids().get(dec!(98)), Some(dec!(4)));
        assert_eq!(book.asks().get(dec!(101)), None);
        assert_eq!(book.best_ask().unwrap().price, dec!(102));
    }

    #[test]
    fn test_invalid_level_skipped_rest_applied() {
        let mut book = seeded();

        let summary = book.apply_update(
            &[(dec!(99), dec!(-1)), (dec!(98), dec!(3))],
            &[(dec!(0), dec!(1)), (dec!(103), dec!(2))],
        );

        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.upserted, 2);
        assert_eq!(book.bids().get(dec!(99)), Some(dec!(2)));
        assert_eq!(book.bids().get(dec!(98)), Some(dec!(3)));
        assert_eq!(book.asks().get(dec!(103)), Some(dec!(2)));
    }

    #[test]
    fn test_crossed_book_tolerated() {
        let mut book = seeded();

        book.apply_update(&[(dec!(105), dec!(1))], &[]);

        assert!(book.is_crossed());
        assert_eq!(book.spread(), Some(dec!(-4)));
    }

    #[test]
    fn test_high_precision_prices_preserved() {
        let mut book = OrderBook::new("BTCUSDT");

        let precise_bid = dec!(100.1234567890123456789);
        let precise_ask = dec!(100.1234567890123456790);
        book.apply_update(&[(precise_bid, dec!(1))], &[(precise_ask, dec!(1))]);

        assert_eq!(book.best_bid().unwrap().price, precise_bid);
        assert_eq!(book.best_ask().unwrap().price, precise_ask);
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_clear() {
        let mut book = seeded();
        book.clear();
        assert!(book.is_empty());
    }
}
