//! Session status: two subscription sub-machines folded into one state.

use std::fmt;

use model::{LinkStatus, SessionControl, StreamKind};
use tracing::debug;

/// Aggregate status of the feed session as shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    ManuallyDisconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
            SessionState::ManuallyDisconnected => "manually disconnected",
        };
        f.write_str(label)
    }
}

/// Connection bookkeeping owned by the market store.
///
/// Every user action bumps `epoch`. Link updates stamped with another epoch,
/// or arriving while the session is not enabled, are ignored.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatus {
    depth: LinkStatus,
    trades: LinkStatus,
    enabled: bool,
    manual_disconnect: bool,
    epoch: u64,
    last_error: Option<String>,
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current control value for the subscription tasks.
    pub fn control(&self) -> SessionControl {
        SessionControl {
            enabled: self.enabled,
            epoch: self.epoch,
        }
    }

    /// Request a connection. Returns false when already requested.
    pub fn connect(&mut self) -> bool {
        if self.enabled {
            return false;
        }
        self.enabled = true;
        self.manual_disconnect = false;
        self.epoch += 1;
        self.last_error = None;
        self.depth = LinkStatus::Down;
        self.trades = LinkStatus::Down;
        true
    }

    /// Manual disconnect. Returns false when already manually disconnected.
    pub fn disconnect(&mut self) -> bool {
        if self.manual_disconnect {
            return false;
        }
        self.enabled = false;
        self.manual_disconnect = true;
        self.epoch += 1;
        self.depth = LinkStatus::Down;
        self.trades = LinkStatus::Down;
        true
    }

    /// Flip between connect and manual disconnect.
    pub fn toggle(&mut self) {
        if self.enabled {
            self.disconnect();
        } else {
            self.connect();
        }
    }

    /// Record a subscription status change.
    ///
    /// Returns false, leaving the state untouched, when the update belongs to an
    /// older epoch or the session is not enabled.
    pub fn update_link(
        &mut self,
        kind: StreamKind,
        epoch: u64,
        status: LinkStatus,
        error: Option<String>,
    ) -> bool {
        if !self.enabled || epoch != self.epoch {
            debug!(
                stream = %kind,
                ?status,
                epoch,
                current_epoch = self.epoch,
                enabled = self.enabled,
                "Ignoring link status from inactive session"
            );
            return false;
        }

        let was_connected = self.is_connected();
        match kind {
            StreamKind::Depth => self.depth = status,
            StreamKind::Trades => self.trades = status,
        }
        if error.is_some() {
            self.last_error = error;
        } else if !was_connected && self.is_connected() {
            self.last_error = None;
        }
        true
    }

    /// Set or clear the user-visible error without touching link state.
    pub fn set_error(&mut self, error: Option<String>) {
        self.last_error = error;
    }

    pub fn link(&self, kind: StreamKind) -> LinkStatus {
        match kind {
            StreamKind::Depth => self.depth,
            StreamKind::Trades => self.trades,
        }
    }

    /// Aggregate of both links. An enabled session whose links have not
    /// reported yet is already connecting.
    pub fn state(&self) -> SessionState {
        if self.manual_disconnect {
            return SessionState::ManuallyDisconnected;
        }
        let links = [self.depth, self.trades];
        if links.iter().all(|s| *s == LinkStatus::Up) {
            SessionState::Connected
        } else if links.contains(&LinkStatus::Reconnecting) {
            SessionState::Reconnecting
        } else if self.enabled
            || links
                .iter()
                .any(|s| matches!(s, LinkStatus::Connecting | LinkStatus::Up))
        {
            SessionState::Connecting
        } else {
            SessionState::Disconnected
        }
    }

    /// True only while both subscriptions are up.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn is_manually_disconnected(&self) -> bool {
        self.manual_disconnect
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
