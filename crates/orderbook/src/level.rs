//! Price level representations.

use rust_decimal::Decimal;

/// A single resting price level in the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    /// Resting quantity; zero never reaches the book.
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// A projected level with the running total from the best price outward.
///
/// Derived on every read, never stored in the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLevel {
    pub price: Decimal,
    pub amount: Decimal,
    pub total: Decimal,
}

impl DepthLevel {
    /// Fraction of `max_total` covered by this level's cumulative total, in `[0, 1]`.
    ///
    /// Used to size a proportional depth bar. Returns zero when `max_total` is not positive.
    pub fn depth_ratio(&self, max_total: Decimal) -> Decimal {
        if max_total <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.total / max_total).min(Decimal::ONE)
    }
}
