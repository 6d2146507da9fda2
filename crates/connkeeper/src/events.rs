//! Events emitted by the connection manager.

use crate::policy::EpisodeTransition;
use connkeeper_core::ConnectionEvent;
use std::time::{Duration, Instant};

/// Why a connection was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
    /// Replaced by a newer connection.
    Superseded,
    /// Released while the manager itself was being disposed.
    Shutdown,
    /// Finished connecting after the manager was disposed; never published.
    Orphaned,
}

impl DisposeReason {
    #[cfg(feature = "metrics")]
    pub(crate) fn as_label(self) -> &'static str {
        match self {
            DisposeReason::Superseded => "superseded",
            DisposeReason::Shutdown => "shutdown",
            DisposeReason::Orphaned => "orphaned",
        }
    }
}

/// Events emitted over the lifetime of a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone)]
pub enum ConnectionManagerEvent {
    /// The first connection was published.
    Initialized {
        /// Name of the manager instance.
        name: String,
        /// When this event occurred.
        timestamp: Instant,
    },

    /// The factory failed to produce the first connection.
    InitializationFailed {
        /// Name of the manager instance.
        name: String,
        /// When this event occurred.
        timestamp: Instant,
        /// Rendered factory error.
        error: String,
    },

    /// A reported error was not a connection failure.
    FailureIgnored {
        /// Name of the manager instance.
        name: String,
        /// When this event occurred.
        timestamp: Instant,
    },

    /// A connection failure was folded into episode tracking.
    FailureRecorded {
        /// Name of the manager instance.
        name: String,
        /// When this event occurred.
        timestamp: Instant,
        /// Whether the failure started or extended an episode.
        transition: EpisodeTransition,
        /// First failure of the episode the failure belongs to.
        episode_started_at: Instant,
    },

    /// A background reconnection was started.
    ReconnectStarted {
        /// Name of the manager instance.
        name: String,
        /// When this event occurred.
        timestamp: Instant,
        /// Age of the connection being replaced.
        connection_age: Duration,
        /// Time since the failing episode began.
        episode_age: Duration,
    },

    /// A replacement connection was published.
    Reconnected {
        /// Name of the manager instance.
        name: String,
        /// When this event occurred.
        timestamp: Instant,
        /// Time the factory took to produce the replacement.
        duration: Duration,
    },

    /// The factory failed to produce a replacement.
    ReconnectFailed {
        /// Name of the manager instance.
        name: String,
        /// When this event occurred.
        timestamp: Instant,
        /// Rendered factory error.
        error: String,
    },

    /// A connection was disposed.
    ConnectionDisposed {
        /// Name of the manager instance.
        name: String,
        /// When this event occurred.
        timestamp: Instant,
        /// Why it was disposed.
        reason: DisposeReason,
    },

    /// The manager finished shutting down.
    Disposed {
        /// Name of the manager instance.
        name: String,
        /// When this event occurred.
        timestamp: Instant,
    },
}

impl ConnectionEvent for ConnectionManagerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ConnectionManagerEvent::Initialized { .. } => "initialized",
            ConnectionManagerEvent::InitializationFailed { .. } => "initialization_failed",
            ConnectionManagerEvent::FailureIgnored { .. } => "failure_ignored",
            ConnectionManagerEvent::FailureRecorded { .. } => "failure_recorded",
            ConnectionManagerEvent::ReconnectStarted { .. } => "reconnect_started",
            ConnectionManagerEvent::Reconnected { .. } => "reconnected",
            ConnectionManagerEvent::ReconnectFailed { .. } => "reconnect_failed",
            ConnectionManagerEvent::ConnectionDisposed { .. } => "connection_disposed",
            ConnectionManagerEvent::Disposed { .. } => "disposed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ConnectionManagerEvent::Initialized { timestamp, .. }
            | ConnectionManagerEvent::InitializationFailed { timestamp, .. }
            | ConnectionManagerEvent::FailureIgnored { timestamp, .. }
            | ConnectionManagerEvent::FailureRecorded { timestamp, .. }
            | ConnectionManagerEvent::ReconnectStarted { timestamp, .. }
            | ConnectionManagerEvent::Reconnected { timestamp, .. }
            | ConnectionManagerEvent::ReconnectFailed { timestamp, .. }
            | ConnectionManagerEvent::ConnectionDisposed { timestamp, .. }
            | ConnectionManagerEvent::Disposed { timestamp, .. } => *timestamp,
        }
    }

    fn manager_name(&self) -> &str {
        match self {
            ConnectionManagerEvent::Initialized { name, .. }
            | ConnectionManagerEvent::InitializationFailed { name, .. }
            | ConnectionManagerEvent::FailureIgnored { name, .. }
            | ConnectionManagerEvent::FailureRecorded { name, .. }
            | ConnectionManagerEvent::ReconnectStarted { name, .. }
            | ConnectionManagerEvent::Reconnected { name, .. }
            | ConnectionManagerEvent::ReconnectFailed { name, .. }
            | ConnectionManagerEvent::ConnectionDisposed { name, .. }
            | ConnectionManagerEvent::Disposed { name, .. } => name,
        }
    }
}
