//! Connection state tracking for the manager.

use crate::policy::Episode;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Coarse lifecycle state of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been published yet.
    Uninitialized,

    /// A connection is published and no replacement is in flight.
    Connected,

    /// A connection is published and a replacement is being created.
    Reconnecting,

    /// The manager has been disposed.
    Disposed,
}

/// Point-in-time view of a manager's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// When the current connection was published.
    pub established_at: Option<Instant>,
    /// The failure episode being tracked, if any.
    pub episode: Option<Episode>,
    /// Number of successful reconnections so far.
    pub reconnections: u64,
}

/// Mutable state guarded by the manager's lock.
///
/// `current` and `established_at` are always written together, and the
/// episode is cleared in the same critical section.
pub(crate) struct State<C> {
    pub(crate) current: Option<Arc<C>>,
    pub(crate) established_at: Option<Instant>,
    pub(crate) episode: Option<Episode>,
    pub(crate) reconnecting: bool,
    pub(crate) disposed: bool,
    pub(crate) reconnections: u64,
    /// Reconnection tasks that disposal must wait for.
    pub(crate) background: Vec<JoinHandle<()>>,
}

impl<C> State<C> {
    pub(crate) fn new() -> Self {
        Self {
            current: None,
            established_at: None,
            episode: None,
            reconnecting: false,
            disposed: false,
            reconnections: 0,
            background: Vec::new(),
        }
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        if self.disposed {
            ConnectionState::Disposed
        } else if self.current.is_none() {
            ConnectionState::Uninitialized
        } else if self.reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connected
        }
    }

    pub(crate) fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.connection_state(),
            established_at: self.established_at,
            episode: self.episode,
            reconnections: self.reconnections,
        }
    }

    /// Makes `connection` current, returning the one it replaces.
    pub(crate) fn publish(&mut self, connection: Arc<C>, now: Instant) -> Option<Arc<C>> {
        let previous = self.current.replace(connection);
        self.established_at = Some(match self.established_at {
            Some(prev) => prev.max(now),
            None => now,
        });
        self.episode = None;
        previous
    }

    pub(crate) fn track(&mut self, handle: JoinHandle<()>) {
        self.background.retain(|h| !h.is_finished());
        self.background.push(handle);
    }
}
