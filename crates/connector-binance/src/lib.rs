//! Binance adapter: raw WebSocket subscriptions, REST depth snapshots and the
//! frame parser.

mod parser;
mod snapshot;
mod transport;

pub use parser::{parse_message, ParsedMessage};
pub use snapshot::{BinanceSnapshotProvider, DepthSnapshotResponse};
pub use transport::BinanceTransport;
