//! Session wiring: the applier task, the two subscription links and the user controls.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use connector_core::{
    create_event_channel, ConnectorConfig, ConnectorError, EventReceiver, SnapshotProvider,
    StreamTransport,
};
use market_store::SharedMarketStore;
use metrics::{Counter, SharedMetrics};
use model::{SessionControl, StreamKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::link::Link;

/// Apply feed events to the store until every sender is gone.
///
/// A sequence gap reported by the store is forwarded on `resync`; a full
/// channel means a request is already pending.
pub async fn run_applier(
    store: SharedMarketStore,
    mut events: EventReceiver,
    resync: mpsc::Sender<()>,
    metrics: SharedMetrics,
) {
    while let Some(event) = events.recv().await {
        let effect = store.apply(event);

        metrics.add(Counter::DroppedLevel, effect.rejected_levels as u64);
        if effect.need_snapshot && resync.try_send(()).is_err() {
            debug!("Snapshot request already pending");
        }
    }

    info!("Event channel closed, applier stopping");
}

/// A configured but not yet running feed session.
pub struct FeedSession {
    config: ConnectorConfig,
    store: SharedMarketStore,
    transport: Arc<dyn StreamTransport>,
    snapshots: Arc<dyn SnapshotProvider>,
    metrics: SharedMetrics,
}

impl FeedSession {
    pub fn new(
        config: ConnectorConfig,
        store: SharedMarketStore,
        transport: Arc<dyn StreamTransport>,
        snapshots: Arc<dyn SnapshotProvider>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            snapshots,
            metrics,
        }
    }

    /// Spawn the applier and both links. Nothing connects until
    /// [`SessionHandle::connect`] or [`SessionHandle::toggle`] is called.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> SessionHandle {
        let (events_tx, events_rx) = create_event_channel(self.config.channel_capacity);
        let (resync_tx, resync_rx) = mpsc::channel(1);
        let (control_tx, _) = watch::channel(self.store.control());
        let (shutdown_tx, _) = watch::channel(false);
        let bootstrap_ids = Arc::new(AtomicU64::new(0));

        let applier = tokio::spawn(run_applier(
            Arc::clone(&self.store),
            events_rx,
            resync_tx,
            Arc::clone(&self.metrics),
        ));

        let mut resync_rx = Some(resync_rx);
        let links = StreamKind::ALL
            .into_iter()
            .map(|kind| {
                let link = Link {
                    kind,
                    config: self.config.clone(),
                    transport: Arc::clone(&self.transport),
                    snapshots: Arc::clone(&self.snapshots),
                    events: events_tx.clone(),
                    control: control_tx.subscribe(),
                    shutdown: shutdown_tx.subscribe(),
                    resync: match kind {
                        StreamKind::Depth => resync_rx.take(),
                        StreamKind::Trades => None,
                    },
                    metrics: Arc::clone(&self.metrics),
                    bootstrap_ids: Arc::clone(&bootstrap_ids),
                };
                tokio::spawn(link.run())
            })
            .collect();

        info!(symbol = %self.config.symbol, "Feed session started");

        SessionHandle {
            store: self.store,
            control_tx,
            shutdown_tx,
            links,
            applier,
        }
    }
}

/// User-facing control of a running session.
pub struct SessionHandle {
    store: SharedMarketStore,
    control_tx: watch::Sender<SessionControl>,
    shutdown_tx: watch::Sender<bool>,
    links: Vec<JoinHandle<Result<(), ConnectorError>>>,
    applier: JoinHandle<()>,
}

impl SessionHandle {
    /// Open both subscriptions. A no-op when already connecting or connected.
    pub fn connect(&self) -> SessionControl {
        self.publish(self.store.connect())
    }

    /// Close both subscriptions and suspend reconnection. Idempotent.
    pub fn disconnect(&self) -> SessionControl {
        self.publish(self.store.disconnect())
    }

    /// Flip between connect and manual disconnect.
    pub fn toggle(&self) -> SessionControl {
        self.publish(self.store.toggle())
    }

    pub fn control(&self) -> SessionControl {
        *self.control_tx.borrow()
    }

    pub fn store(&self) -> &SharedMarketStore {
        &self.store
    }

    /// Hand `control` to the links unless a newer epoch is already published.
    fn publish(&self, control: SessionControl) -> SessionControl {
        self.control_tx.send_if_modified(|current| {
            if control.epoch <= current.epoch {
                false
            } else {
                *current = control;
                true
            }
        });
        control
    }

    /// Stop the links, let the applier drain what they sent and wait for all tasks.
    pub async fn shutdown(self) {
        info!("Shutting down feed session");
        let _ = self.shutdown_tx.send(true);

        for link in self.links {
            match link.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Link ended with error"),
                Err(e) => warn!(error = %e, "Link task failed"),
            }
        }
        if let Err(e) = self.applier.await {
            warn!(error = %e, "Applier task failed");
        }

        info!("Feed session stopped");
    }
}
