//! Single owned market state for one symbol.
//!
//! [`MarketStore`] holds the reconciled order book, the recent-trade tape and
//! the session status. Feed events are applied by one consumer; observers read
//! through [`MarketStore::view`] and wait on [`MarketStore::subscribe`].

mod status;
mod store;
mod tape;

pub use status::{ConnectionStatus, SessionState};
pub use store::{EventEffect, MarketStore, MarketView, SharedMarketStore};
pub use tape::{TradeTape, TRADE_TAPE_CAPACITY};
