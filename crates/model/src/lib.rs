//! Vocabulary shared by the book, the market store and the feed connectors.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A `(price, quantity)` pair as carried by snapshots and deltas.
///
/// A zero quantity means "remove this price".
pub type PriceLevelUpdate = (Decimal, Decimal);

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// An executed trade. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub price: Decimal,
    pub amount: Decimal,
    /// Exchange trade time, epoch milliseconds.
    pub timestamp_ms: i64,
    /// True when the buyer crossed the spread (the seller was the maker).
    pub is_buyer_aggressor: bool,
}

/// One batch of incremental book changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthUpdate {
    pub bids: Vec<PriceLevelUpdate>,
    pub asks: Vec<PriceLevelUpdate>,
    /// First update id covered by this batch, when the feed provides one.
    pub first_update_id: Option<u64>,
    /// Last update id covered by this batch, when the feed provides one.
    pub final_update_id: Option<u64>,
    pub event_time_ms: i64,
}

impl DepthUpdate {
    /// A batch without update ids.
    pub fn new(bids: Vec<PriceLevelUpdate>, asks: Vec<PriceLevelUpdate>) -> Self {
        Self {
            bids,
            asks,
            first_update_id: None,
            final_update_id: None,
            event_time_ms: 0,
        }
    }

    /// Attach the `[first, final]` update id range.
    pub fn with_update_ids(mut self, first: u64, last: u64) -> Self {
        self.first_update_id = Some(first);
        self.final_update_id = Some(last);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Full book image used to bootstrap the local book.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub last_update_id: Option<u64>,
    pub bids: Vec<PriceLevelUpdate>,
    pub asks: Vec<PriceLevelUpdate>,
}

/// How much the book trusts the ordering of incoming deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SequencePolicy {
    /// Apply every delta received after bootstrap.
    #[default]
    Trust,
    /// Check update-id continuity and force a re-snapshot on a gap.
    Verify,
}

impl FromStr for SequencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trust" => Ok(Self::Trust),
            "verify" => Ok(Self::Verify),
            _ => Err("expected 'trust' or 'verify'".to_string()),
        }
    }
}

/// The two independent subscriptions a session keeps open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Depth,
    Trades,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Depth, StreamKind::Trades];
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Depth => write!(f, "depth"),
            StreamKind::Trades => write!(f, "trades"),
        }
    }
}

/// Status of a single subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkStatus {
    #[default]
    Down,
    Connecting,
    Up,
    Reconnecting,
}

/// What the user asked the session to do, stamped with an epoch that changes
/// on every toggle so late completions from an older attempt can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionControl {
    pub enabled: bool,
    pub epoch: u64,
}

/// Everything a running session feeds into the market store.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A new snapshot fetch was requested; deltas must be buffered until it lands.
    ///
    /// `resync` is set when the fetch replaces one on the same connection, so
    /// batches already buffered belong to it. Otherwise the depth connection is
    /// new and earlier batches are stale.
    BootstrapStarted { bootstrap_id: u64, resync: bool },
    /// Result of the snapshot fetch started under `bootstrap_id`.
    Snapshot {
        bootstrap_id: u64,
        result: Result<DepthSnapshot, String>,
    },
    Depth(DepthUpdate),
    Trade(Trade),
    /// A subscription changed status under the given control epoch.
    Link {
        kind: StreamKind,
        epoch: u64,
        status: LinkStatus,
        error: Option<String>,
    },
}
