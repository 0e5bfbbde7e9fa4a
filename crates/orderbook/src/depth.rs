//! Display-ready depth projection.

use rust_decimal::Decimal;

use crate::book::OrderBook;
use crate::level::{DepthLevel, PriceLevel};

/// Levels per side shown when no depth is configured.
pub const DEFAULT_DEPTH: usize = 20;

/// A read-only projection of the book: top levels with running totals and spread.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepthView {
    /// Best (highest) bid first.
    pub bids: Vec<DepthLevel>,
    /// Best (lowest) ask first.
    pub asks: Vec<DepthLevel>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    /// `best_ask - best_bid`, zero unless both sides are present. Negative when crossed.
    pub spread: Decimal,
    /// `spread / best_bid * 100`, zero when there is no positive best bid.
    pub spread_percent: Decimal,
    /// Largest cumulative total across both projected sides; scales depth bars.
    pub max_total: Decimal,
}

impl DepthView {
    pub fn mid_price(&self) -> Option<Decimal> {
        let (bid, ask) = (self.best_bid?, self.best_ask?);
        Some(match bid.checked_add(ask) {
            Some(sum) => sum / Decimal::TWO,
            None => bid / Decimal::TWO + ask / Decimal::TWO,
        })
    }

    pub fn is_crossed(&self) -> bool {
        self.best_bid.is_some() && self.best_ask.is_some() && self.spread <= Decimal::ZERO
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Projects an [`OrderBook`] into a [`DepthView`] of a fixed depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthProjector {
    depth: usize,
}

impl Default for DepthProjector {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH)
    }
}

impl DepthProjector {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn project(&self, book: &OrderBook) -> DepthView {
        project(book, self.depth)
    }
}

/// Project the top `depth` levels of each side of `book`.
pub fn project(book: &OrderBook, depth: usize) -> DepthView {
    let bids = accumulate(book.bids().best_levels(depth));
    let asks = accumulate(book.asks().best_levels(depth));

    let best_bid = book.best_bid().map(|level| level.price);
    let best_ask = book.best_ask().map(|level| level.price);

    let spread = match (best_bid, best_ask) {
        (Some(bid), Some(ask)) => ask - bid,
        _ => Decimal::ZERO,
    };
    let spread_percent = match best_bid {
        Some(bid) if bid > Decimal::ZERO => spread
            .checked_div(bid)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or_else(|| saturated(spread)),
        _ => Decimal::ZERO,
    };

    let last_total = |levels: &[DepthLevel]| levels.last().map_or(Decimal::ZERO, |l| l.total);
    let max_total = last_total(&bids).max(last_total(&asks));

    DepthView {
        bids,
        asks,
        best_bid,
        best_ask,
        spread,
        spread_percent,
        max_total,
    }
}

/// Largest representable value with the sign of `value`.
fn saturated(value: Decimal) -> Decimal {
    if value.is_sign_negative() {
        Decimal::MIN
    } else {
        Decimal::MAX
    }
}

/// Running totals saturate at `Decimal::MAX` rather than overflow.
fn accumulate(levels: Vec<PriceLevel>) -> Vec<DepthLevel> {
    levels
        .into_iter()
        .scan(Decimal::ZERO, |total, level| {
            *total = total.checked_add(level.quantity).unwrap_or(Decimal::MAX);
            Some(DepthLevel {
                price: level.price,
                amount: level.quantity,
                total: *total,
            })
        })
        .collect()
}
