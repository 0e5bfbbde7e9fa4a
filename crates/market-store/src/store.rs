//! The single owned market state and its change notifications.

use std::sync::Arc;

use model::{FeedEvent, SequencePolicy, SessionControl, Trade};
use orderbook::{
    project, ApplyOutcome, DepthView, OrderBook, OrderBookError, OrderBookReconciler,
};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::status::{ConnectionStatus, SessionState};
use crate::tape::TradeTape;

/// Shared handle to the store.
pub type SharedMarketStore = Arc<MarketStore>;

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventEffect {
    /// Observable state changed; subscribers were notified.
    pub changed: bool,
    /// The reconciler found a sequence gap and needs a fresh snapshot.
    pub need_snapshot: bool,
    /// Price levels dropped as invalid while applying this event.
    pub rejected_levels: usize,
}

/// Point-in-time copy of everything an observer renders.
#[derive(Debug, Clone)]
pub struct MarketView {
    pub symbol: String,
    pub state: SessionState,
    pub is_connected: bool,
    pub last_error: Option<String>,
    pub depth: DepthView,
    /// Newest first.
    pub trades: Vec<Trade>,
    /// False while the book is still waiting for its first snapshot.
    pub book_live: bool,
    /// Change counter at the time of the read.
    pub version: u64,
}

#[derive(Debug)]
struct MarketState {
    reconciler: OrderBookReconciler,
    tape: TradeTape,
    status: ConnectionStatus,
}

/// Book, trade tape and connection status for one symbol.
///
/// All mutation goes through [`MarketStore::apply`] and the session controls.
/// Each call holds the write lock for its whole duration, so readers never
/// observe a partially applied batch.
#[derive(Debug)]
pub struct MarketStore {
    state: RwLock<MarketState>,
    changes: watch::Sender<u64>,
}

impl MarketStore {
    pub fn new(symbol: impl Into<String>, policy: SequencePolicy) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: RwLock::new(MarketState {
                reconciler: OrderBookReconciler::new(symbol, policy),
                tape: TradeTape::default(),
                status: ConnectionStatus::new(),
            }),
            changes,
        }
    }

    pub fn shared(symbol: impl Into<String>, policy: SequencePolicy) -> SharedMarketStore {
        Arc::new(Self::new(symbol, policy))
    }

    /// Apply one feed event.
    ///
    /// Market data is ignored while the session is not enabled, so events still
    /// queued from a manually disconnected session cannot touch the book.
    pub fn apply(&self, event: FeedEvent) -> EventEffect {
        let mut effect = EventEffect::default();
        {
            let mut state = self.state.write();
            let enabled = state.status.control().enabled;

            match event {
                FeedEvent::Link {
                    kind,
                    epoch,
                    status,
                    error,
                } => {
                    let before = state.status.state();
                    effect.changed = state.status.update_link(kind, epoch, status, error);
                    let after = state.status.state();
                    if before != after {
                        info!(from = %before, to = %after, "Session state changed");
                    }
                }
                _ if !enabled => {
                    debug!("Dropping market data received while session is disabled");
                }
                FeedEvent::BootstrapStarted {
                    bootstrap_id,
                    resync,
                } => {
                    if resync {
                        state.reconciler.resync(bootstrap_id);
                    } else {
                        state.reconciler.begin_bootstrap(bootstrap_id);
                    }
                    effect.changed = true;
                }
                FeedEvent::Snapshot {
                    bootstrap_id,
                    result,
                } => {
                    let outcome = match &result {
                        Ok(snapshot) => state.reconciler.apply_snapshot(bootstrap_id, snapshot),
                        Err(reason) => state.reconciler.snapshot_failed(bootstrap_id, reason),
                    };
                    match outcome {
                        Ok(outcome) => {
                            effect.changed = true;
                            effect.rejected_levels = outcome.summary.rejected;
                            if let Err(reason) = result {
                                state
                                    .status
                                    .set_error(Some(format!("Snapshot unavailable: {reason}")));
                            }
                        }
                        Err(OrderBookError::StaleSnapshot { bootstrap_id }) => {
                            debug!(bootstrap_id, "Ignoring snapshot from superseded bootstrap");
                        }
                        Err(err) => warn!(error = %err, "Snapshot rejected"),
                    }
                }
                FeedEvent::Depth(update) => match state.reconciler.apply_update(update) {
                    ApplyOutcome::Applied(summary) => {
                        effect.changed = true;
                        effect.rejected_levels = summary.rejected;
                    }
                    ApplyOutcome::Buffered | ApplyOutcome::Dropped => {}
                    ApplyOutcome::NeedSnapshot => effect.need_snapshot = true,
                },
                FeedEvent::Trade(trade) => {
                    state.tape.record(trade);
                    effect.changed = true;
                }
            }
        }

        if effect.changed {
            self.notify();
        }
        effect
    }

    /// Enable the session. Returns the control value the links should follow.
    pub fn connect(&self) -> SessionControl {
        self.control_with(|status| {
            status.connect();
        })
    }

    /// Manually disconnect. The book keeps its last-known contents.
    pub fn disconnect(&self) -> SessionControl {
        self.control_with(|status| {
            status.disconnect();
        })
    }

    pub fn toggle(&self) -> SessionControl {
        self.control_with(ConnectionStatus::toggle)
    }

    pub fn control(&self) -> SessionControl {
        self.state.read().status.control()
    }

    fn control_with(&self, f: impl FnOnce(&mut ConnectionStatus)) -> SessionControl {
        let control = {
            let mut state = self.state.write();
            let before = state.status.control();
            f(&mut state.status);
            let after = state.status.control();
            if before != after {
                info!(
                    enabled = after.enabled,
                    epoch = after.epoch,
                    state = %state.status.state(),
                    "Session control changed"
                );
            }
            after
        };
        self.notify();
        control
    }

    /// Snapshot of book projection, trades and status.
    pub fn view(&self, depth: usize) -> MarketView {
        let state = self.state.read();
        MarketView {
            symbol: state.reconciler.book().symbol().to_string(),
            state: state.status.state(),
            is_connected: state.status.is_connected(),
            last_error: state.status.last_error().map(str::to_string),
            depth: project(state.reconciler.book(), depth),
            trades: state.tape.to_vec(),
            book_live: state.reconciler.is_live(),
            version: *self.changes.borrow(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.read().status.clone()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.state.read().tape.to_vec()
    }

    /// Run `f` against the book under the read lock.
    pub fn with_book<R>(&self, f: impl FnOnce(&OrderBook) -> R) -> R {
        f(self.state.read().reconciler.book())
    }

    /// Receiver of the change counter, bumped after every observable mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.changes.borrow()
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }
}
