//! Seams between the feed session and a concrete exchange.
//!
//! A [`StreamTransport`] opens raw text subscriptions and a
//! [`SnapshotProvider`] fetches full depth snapshots. Both report failures as
//! [`ConnectorError`].

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use common::FeedConfig;
use futures_util::Stream;
use model::{DepthSnapshot, FeedEvent, StreamKind};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("No data received for {0:?}")]
    Stale(Duration),

    #[error("Snapshot request failed: {0}")]
    Snapshot(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Shutdown requested")]
    Shutdown,
}

impl ConnectorError {
    /// Transport failures are retried; a closed channel or shutdown ends the link.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ChannelClosed | Self::Shutdown)
    }
}

/// Raw text frames from one subscription. The stream ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectorError>> + Send>>;

/// Opens live subscriptions.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, kind: StreamKind) -> Result<FrameStream, ConnectorError>;
}

/// Fetches a full order book snapshot.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch_snapshot(&self, symbol: &str, limit: u32)
        -> Result<DepthSnapshot, ConnectorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Symbol to subscribe to.
    pub symbol: String,
    /// Levels requested per snapshot.
    pub snapshot_limit: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// A subscription silent for this long is reconnected.
    pub stale_after: Duration,
    /// Channel buffer capacity.
    pub channel_capacity: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self::from(&FeedConfig::default())
    }
}

impl From<&FeedConfig> for ConnectorConfig {
    fn from(config: &FeedConfig) -> Self {
        Self {
            symbol: config.symbol.clone(),
            snapshot_limit: config.snapshot_limit,
            reconnect_delay: config.reconnect_delay,
            stale_after: config.stale_after,
            channel_capacity: config.channel_capacity,
        }
    }
}

pub type EventSender = mpsc::Sender<FeedEvent>;
pub type EventReceiver = mpsc::Receiver<FeedEvent>;

pub fn create_event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}
