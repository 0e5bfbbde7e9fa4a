//! Bounded recent-trade tape.

use std::collections::VecDeque;

use model::Trade;

/// Number of trades the tape retains.
pub const TRADE_TAPE_CAPACITY: usize = 50;

/// Most recent trades, newest first.
///
/// Trades are kept in arrival order; ids are not deduplicated.
#[derive(Debug, Clone)]
pub struct TradeTape {
    trades: VecDeque<Trade>,
    capacity: usize,
}

impl Default for TradeTape {
    fn default() -> Self {
        Self::new(TRADE_TAPE_CAPACITY)
    }
}

impl TradeTape {
    pub fn new(capacity: usize) -> Self {
        Self {
            trades: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Put `trade` at the front, evicting the oldest entries beyond capacity.
    pub fn record(&mut self, trade: Trade) {
        self.trades.push_front(trade);
        self.trades.truncate(self.capacity);
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter()
    }

    pub fn latest(&self) -> Option<&Trade> {
        self.trades.front()
    }

    pub fn to_vec(&self) -> Vec<Trade> {
        self.trades.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.trades.clear();
    }
}
