//! One subscription's connect / pump / reconnect loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common::FixedBackoff;
use connector_binance::{parse_message, ParsedMessage};
use connector_core::{
    ConnectorConfig, ConnectorError, EventSender, FrameStream, SnapshotProvider, StreamTransport,
};
use futures_util::StreamExt;
use metrics::{Counter, SharedMetrics};
use model::{FeedEvent, LinkStatus, SessionControl, StreamKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Error shown to observers while a subscription is being re-established.
pub(crate) const RECONNECTING_MESSAGE: &str = "Connection lost. Reconnecting...";

/// Why a link stopped serving the current epoch.
#[derive(Debug, PartialEq, Eq)]
enum EpochEnd {
    /// The user connected, disconnected or toggled.
    ControlChanged,
    Shutdown,
    /// The applier is gone; nothing left to deliver to.
    ChannelClosed,
}

/// Why a single connection ended.
#[derive(Debug)]
enum PumpEnd {
    Failed(ConnectorError),
    Epoch(EpochEnd),
}

/// Snapshot fetch running in the background. Aborted when dropped.
struct SnapshotTask(JoinHandle<()>);

impl Drop for SnapshotTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Everything a subscription task needs.
pub(crate) struct Link {
    pub kind: StreamKind,
    pub config: ConnectorConfig,
    pub transport: Arc<dyn StreamTransport>,
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub events: EventSender,
    pub control: watch::Receiver<SessionControl>,
    pub shutdown: watch::Receiver<bool>,
    /// Re-snapshot requests from the applier; only the depth link has one.
    pub resync: Option<mpsc::Receiver<()>>,
    pub metrics: SharedMetrics,
    pub bootstrap_ids: Arc<AtomicU64>,
}

impl Link {
    /// Serve every enabled epoch until shutdown or until the applier goes away.
    pub async fn run(mut self) -> Result<(), ConnectorError> {
        loop {
            let active = match self.wait_enabled().await {
                Some(control) => control,
                None => {
                    info!(stream = %self.kind, "Link shutdown complete");
                    return Ok(());
                }
            };

            info!(stream = %self.kind, epoch = active.epoch, "Link starting");

            match self.run_epoch(active).await {
                EpochEnd::ControlChanged => {
                    debug!(stream = %self.kind, epoch = active.epoch, "Session control changed, link released");
                }
                EpochEnd::Shutdown => {
                    info!(stream = %self.kind, "Link shutdown complete");
                    return Ok(());
                }
                EpochEnd::ChannelClosed => {
                    info!(stream = %self.kind, "Event channel closed, exiting link");
                    return Err(ConnectorError::ChannelClosed);
                }
            }
        }
    }

    /// Block until the session is enabled. `None` means shutdown.
    async fn wait_enabled(&mut self) -> Option<SessionControl> {
        loop {
            if *self.shutdown.borrow() {
                return None;
            }
            let control = *self.control.borrow_and_update();
            if control.enabled {
                return Some(control);
            }

            tokio::select! {
                changed = self.control.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return None;
                    }
                }
            }
        }
    }

    /// Keep one subscription alive for as long as `active` is the session control.
    async fn run_epoch(&mut self, active: SessionControl) -> EpochEnd {
        let mut backoff = FixedBackoff::new(self.config.reconnect_delay);
        let mut reconnecting = false;

        loop {
            if !reconnecting {
                if let Err(end) = self.emit(active, LinkStatus::Connecting, None).await {
                    return end;
                }
            }

            let opened = tokio::select! {
                biased;

                end = control_or_shutdown(&mut self.control, &mut self.shutdown, active) => return end,
                result = self.transport.open(self.kind) => result,
            };

            // A toggle may have landed while the connect was completing
            if *self.control.borrow() != active {
                return EpochEnd::ControlChanged;
            }

            let error = match opened {
                Ok(frames) => {
                    if reconnecting {
                        self.metrics.record(Counter::ReconnectSuccess);
                        info!(stream = %self.kind, attempts = backoff.attempt(), "Reconnected");
                    }
                    backoff.reset();
                    reconnecting = false;

                    match self.serve(active, frames).await {
                        PumpEnd::Failed(error) => error,
                        PumpEnd::Epoch(end) => return end,
                    }
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                return EpochEnd::ChannelClosed;
            }

            self.metrics.record(Counter::TransportError);
            self.metrics.record(Counter::ReconnectAttempt);
            let delay = backoff.next_delay();
            warn!(
                stream = %self.kind,
                error = %error,
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Connection lost, reconnecting"
            );

            if let Err(end) = self
                .emit(
                    active,
                    LinkStatus::Reconnecting,
                    Some(RECONNECTING_MESSAGE.to_string()),
                )
                .await
            {
                return end;
            }
            reconnecting = true;

            tokio::select! {
                biased;

                end = control_or_shutdown(&mut self.control, &mut self.shutdown, active) => return end,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Mark the link up, bootstrap the book if this is the depth stream, then
    /// forward frames until the connection fails or the epoch ends.
    async fn serve(&mut self, active: SessionControl, mut frames: FrameStream) -> PumpEnd {
        if let Err(end) = self.emit(active, LinkStatus::Up, None).await {
            return PumpEnd::Epoch(end);
        }

        let mut _snapshot_task = None;
        if self.kind == StreamKind::Depth {
            if let Some(resync) = self.resync.as_mut() {
                // Requests raised before this connection are covered by the bootstrap below
                while resync.try_recv().is_ok() {}
            }
            match self.start_bootstrap(false).await {
                Ok(task) => _snapshot_task = Some(task),
                Err(end) => return PumpEnd::Epoch(end),
            }
        }

        let stale_after = self.config.stale_after;

        loop {
            tokio::select! {
                biased;

                end = control_or_shutdown(&mut self.control, &mut self.shutdown, active) => return PumpEnd::Epoch(end),

                Some(()) = recv_resync(&mut self.resync) => {
                    info!(stream = %self.kind, "Book out of sync, re-fetching snapshot");
                    match self.start_bootstrap(true).await {
                        // Replacing the handle aborts the superseded fetch
                        Ok(task) => _snapshot_task = Some(task),
                        Err(end) => return PumpEnd::Epoch(end),
                    }
                }

                frame = tokio::time::timeout(stale_after, frames.next()) => {
                    let text = match frame {
                        Err(_) => return PumpEnd::Failed(ConnectorError::Stale(stale_after)),
                        Ok(None) => return PumpEnd::Failed(ConnectorError::ConnectionClosed),
                        Ok(Some(Err(error))) => return PumpEnd::Failed(error),
                        Ok(Some(Ok(text))) => text,
                    };

                    self.metrics.record(Counter::Frame);
                    if let Err(end) = self.forward(&text).await {
                        return PumpEnd::Epoch(end);
                    }
                }
            }
        }
    }

    /// Parse one frame and pass its event on. Malformed frames are dropped.
    async fn forward(&self, text: &str) -> Result<(), EpochEnd> {
        let event = match parse_message(text) {
            Ok(ParsedMessage::Trade(trade)) => {
                self.metrics.record(Counter::Trade);
                FeedEvent::Trade(trade)
            }
            Ok(ParsedMessage::DepthUpdate {
                update,
                dropped_levels,
            }) => {
                self.metrics.record(Counter::DepthUpdate);
                self.metrics.add(Counter::DroppedLevel, dropped_levels as u64);
                FeedEvent::Depth(update)
            }
            Ok(ParsedMessage::Unknown) => {
                debug!(stream = %self.kind, "Ignoring unrecognised frame");
                return Ok(());
            }
            Err(e) => {
                self.metrics.record(Counter::ParseError);
                warn!(stream = %self.kind, error = %e, "Failed to parse message");
                return Ok(());
            }
        };

        self.send(event).await
    }

    /// Announce a new bootstrap and fetch its snapshot in the background.
    ///
    /// `resync` marks a re-fetch on the current connection.
    async fn start_bootstrap(&self, resync: bool) -> Result<SnapshotTask, EpochEnd> {
        let bootstrap_id = self.bootstrap_ids.fetch_add(1, Ordering::Relaxed) + 1;
        self.send(FeedEvent::BootstrapStarted {
            bootstrap_id,
            resync,
        })
        .await?;

        let snapshots = Arc::clone(&self.snapshots);
        let events = self.events.clone();
        let metrics = Arc::clone(&self.metrics);
        let symbol = self.config.symbol.clone();
        let limit = self.config.snapshot_limit;

        info!(symbol = %symbol, bootstrap_id, "Fetching depth snapshot");

        let handle = tokio::spawn(async move {
            let result = match snapshots.fetch_snapshot(&symbol, limit).await {
                Ok(snapshot) => {
                    metrics.record(Counter::SnapshotFetched);
                    Ok(snapshot)
                }
                Err(e) => {
                    metrics.record(Counter::SnapshotFailed);
                    warn!(symbol = %symbol, bootstrap_id, error = %e, "Failed to fetch depth snapshot");
                    Err(e.to_string())
                }
            };
            let _ = events
                .send(FeedEvent::Snapshot {
                    bootstrap_id,
                    result,
                })
                .await;
        });

        Ok(SnapshotTask(handle))
    }

    async fn emit(
        &self,
        active: SessionControl,
        status: LinkStatus,
        error: Option<String>,
    ) -> Result<(), EpochEnd> {
        self.send(FeedEvent::Link {
            kind: self.kind,
            epoch: active.epoch,
            status,
            error,
        })
        .await
    }

    async fn send(&self, event: FeedEvent) -> Result<(), EpochEnd> {
        self.events
            .send(event)
            .await
            .map_err(|_| EpochEnd::ChannelClosed)
    }
}

/// Resolves once the control leaves `active` or shutdown is requested.
async fn control_or_shutdown(
    control: &mut watch::Receiver<SessionControl>,
    shutdown: &mut watch::Receiver<bool>,
    active: SessionControl,
) -> EpochEnd {
    loop {
        tokio::select! {
            changed = control.changed() => {
                if changed.is_err() {
                    return EpochEnd::Shutdown;
                }
                if *control.borrow_and_update() != active {
                    return EpochEnd::ControlChanged;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return EpochEnd::Shutdown;
                }
            }
        }
    }
}

async fn recv_resync(resync: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match resync {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
