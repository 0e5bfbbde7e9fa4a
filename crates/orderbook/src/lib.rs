//! Local order book for a single symbol, built from an incremental delta feed.
//!
//! - [`PriceLevelMap`] stores one side as price → quantity, with zero meaning removal.
//! - [`OrderBookReconciler`] bootstraps from a snapshot, buffers early deltas and
//!   applies batches in order.
//! - [`project`] / [`DepthProjector`] derive sorted levels, cumulative totals and spread.
//!
//! # Example
//!
//! ```rust
//! use model::{DepthSnapshot, DepthUpdate, SequencePolicy};
//! use orderbook::{project, OrderBookReconciler};
//! use rust_decimal_macros::dec;
//!
//! let mut reconciler = OrderBookReconciler::new("BTCUSDT", SequencePolicy::Trust);
//! reconciler.begin_bootstrap(1);
//!
//! let snapshot = DepthSnapshot {
//!     last_update_id: None,
//!     bids: vec![(dec!(100), dec!(1)), (dec!(99), dec!(2))],
//!     asks: vec![(dec!(101), dec!(1)), (dec!(102), dec!(3))],
//! };
//! reconciler.apply_snapshot(1, &snapshot).unwrap();
//! reconciler.apply_update(DepthUpdate::new(vec![(dec!(100), dec!(0))], vec![]));
//!
//! let view = project(reconciler.book(), 20);
//! assert_eq!(view.bids[0].price, dec!(99));
//! assert_eq!(view.spread, dec!(2));
//! ```

mod book;
mod depth;
mod error;
mod level;
mod price_map;
mod reconciler;

pub use book::{ApplySummary, OrderBook};
pub use depth::{project, DepthProjector, DepthView, DEFAULT_DEPTH};
pub use error::OrderBookError;
pub use level::{DepthLevel, PriceLevel};
pub use price_map::{LevelChange, PriceLevelMap};
pub use reconciler::{ApplyOutcome, OrderBookReconciler, SnapshotOutcome, MAX_BUFFERED_UPDATES};
