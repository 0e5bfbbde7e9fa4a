//! Live feed session for one symbol.
//!
//! [`FeedSession::start`] spawns one task per subscription (depth and trades)
//! plus a single applier that owns every write to the [`market_store::MarketStore`].
//! Links forward parsed frames over a bounded channel, reconnect after a fixed
//! delay and follow the user's connect / disconnect requests through
//! [`SessionHandle`].

#[cfg(test)]
mod fakes;
mod link;
mod session;

pub use session::{run_applier, FeedSession, SessionHandle};
