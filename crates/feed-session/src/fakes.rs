//! In-memory transport and snapshot provider for session tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use connector_core::{ConnectorError, FrameStream, SnapshotProvider, StreamTransport};
use futures_util::stream;
use model::{DepthSnapshot, StreamKind};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

type FrameSender = mpsc::UnboundedSender<Result<String, ConnectorError>>;

#[derive(Default)]
struct TransportState {
    opens: HashMap<StreamKind, usize>,
    fail_next: HashMap<StreamKind, usize>,
    feeds: HashMap<StreamKind, FrameSender>,
    gate: Option<Arc<Notify>>,
    pending: usize,
}

/// Each `open` hands out a fresh channel-backed stream the test can feed or close.
#[derive(Default)]
pub(crate) struct FakeTransport {
    state: Mutex<TransportState>,
}

impl FakeTransport {
    pub fn opens(&self, kind: StreamKind) -> usize {
        self.state.lock().opens.get(&kind).copied().unwrap_or(0)
    }

    pub fn fail_next_opens(&self, kind: StreamKind, count: usize) {
        self.state.lock().fail_next.insert(kind, count);
    }

    /// Make every later `open` wait on the returned gate.
    pub fn hold_opens(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().gate = Some(gate.clone());
        gate
    }

    /// Opens that started waiting on the gate.
    pub fn pending_opens(&self) -> usize {
        self.state.lock().pending
    }

    pub fn push(&self, kind: StreamKind, frame: String) {
        if let Some(feed) = self.state.lock().feeds.get(&kind) {
            let _ = feed.send(Ok(frame));
        }
    }

    /// End the current stream of `kind` as if the server closed it.
    pub fn close(&self, kind: StreamKind) {
        self.state.lock().feeds.remove(&kind);
    }

    /// True once the session dropped the current stream of `kind`.
    pub fn closed_by_peer(&self, kind: StreamKind) -> bool {
        self.state
            .lock()
            .feeds
            .get(&kind)
            .map_or(true, |feed| feed.is_closed())
    }
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn open(&self, kind: StreamKind) -> Result<FrameStream, ConnectorError> {
        let gate = {
            let mut state = self.state.lock();
            *state.opens.entry(kind).or_default() += 1;
            if let Some(remaining) = state.fail_next.get_mut(&kind) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ConnectorError::WebSocket("connection refused".to_string()));
                }
            }
            if state.gate.is_some() {
                state.pending += 1;
            }
            state.gate.clone()
        };

        if let Some(gate) = gate {
            gate.notified().await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().feeds.insert(kind, tx);

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

/// Returns the same snapshot (or failure) for every request.
pub(crate) struct FakeSnapshots {
    result: Result<DepthSnapshot, ConnectorError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeSnapshots {
    pub fn returning(snapshot: DepthSnapshot) -> Self {
        Self {
            result: Ok(snapshot),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(ConnectorError::Snapshot(reason.to_string())),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotProvider for FakeSnapshots {
    async fn fetch_snapshot(
        &self,
        _symbol: &str,
        _limit: u32,
    ) -> Result<DepthSnapshot, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

fn levels_json(levels: &[(&str, &str)]) -> String {
    let pairs: Vec<String> = levels
        .iter()
        .map(|(price, qty)| format!(r#"["{price}","{qty}"]"#))
        .collect();
    format!("[{}]", pairs.join(","))
}

/// A Binance `depthUpdate` frame, optionally carrying `(U, u)` update ids.
pub(crate) fn depth_frame(
    ids: Option<(u64, u64)>,
    bids: &[(&str, &str)],
    asks: &[(&str, &str)],
) -> String {
    let ids = ids
        .map(|(first, last)| format!(r#""U":{first},"u":{last},"#))
        .unwrap_or_default();
    format!(
        r#"{{"e":"depthUpdate","E":1700000000000,"s":"BTCUSDT",{ids}"b":{},"a":{}}}"#,
        levels_json(bids),
        levels_json(asks)
    )
}

/// A Binance `aggTrade` frame.
pub(crate) fn trade_frame(id: u64, price: &str, qty: &str, buyer_is_maker: bool) -> String {
    format!(
        r#"{{"e":"aggTrade","E":1700000000000,"s":"BTCUSDT","a":{id},"p":"{price}","q":"{qty}","f":1,"l":1,"T":1700000000000,"m":{buyer_is_maker}}}"#
    )
}
