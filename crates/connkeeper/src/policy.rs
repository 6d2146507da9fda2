//! Reconnect decision policy.
//!
//! A connection is replaced only when it is old enough *and* it has been
//! failing for long enough. Failures are grouped into [`Episode`]s: runs of
//! recognized errors where consecutive errors are at most the episode timeout
//! apart. A longer silence ends the episode, and the next failure starts a
//! new one with a fresh grace period.

use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A continuous run of recognized connection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Episode {
    started_at: Instant,
    last_error_at: Instant,
}

impl Episode {
    /// Starts an episode with a single failure at `at`.
    pub fn begin(at: Instant) -> Self {
        Self {
            started_at: at,
            last_error_at: at,
        }
    }

    /// When the first failure of this episode was observed.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// When the most recent failure of this episode was observed.
    pub fn last_error_at(&self) -> Instant {
        self.last_error_at
    }

    /// Time since the episode began.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    fn extend(self, at: Instant) -> Self {
        Self {
            started_at: self.started_at,
            last_error_at: self.last_error_at.max(at),
        }
    }
}

/// How a failure affected episode tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeTransition {
    /// The failure began a new episode.
    Started,
    /// The failure extended the active episode.
    Extended,
}

/// Thresholds governing when a failing connection is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReconnectPolicy {
    /// Minimum age of the current connection before it may be replaced.
    pub min_forced_reconnection_interval: Duration,

    /// Minimum time since an episode's first failure before acting on it.
    pub dropped_connection_grace_period: Duration,

    /// Maximum gap between failures belonging to the same episode.
    pub dropped_connection_episode_timeout: Duration,
}

impl ReconnectPolicy {
    /// Creates a policy from explicit thresholds.
    pub fn new(
        min_forced_reconnection_interval: Duration,
        dropped_connection_grace_period: Duration,
        dropped_connection_episode_timeout: Duration,
    ) -> Self {
        Self {
            min_forced_reconnection_interval,
            dropped_connection_grace_period,
            dropped_connection_episode_timeout,
        }
    }

    /// Folds a failure observed at `now` into the episode state.
    ///
    /// With no previous episode, or when more than the episode timeout has
    /// passed since the previous failure, a new episode starts at `now`.
    pub fn record_failure(
        &self,
        previous: Option<Episode>,
        now: Instant,
    ) -> (Episode, EpisodeTransition) {
        match previous {
            Some(episode)
                if now.saturating_duration_since(episode.last_error_at)
                    <= self.dropped_connection_episode_timeout =>
            {
                (episode.extend(now), EpisodeTransition::Extended)
            }
            _ => (Episode::begin(now), EpisodeTransition::Started),
        }
    }

    /// Whether a connection established at `established_at`, currently in
    /// `episode`, should be replaced at `now`.
    pub fn should_reconnect(&self, established_at: Instant, episode: &Episode, now: Instant) -> bool {
        let connection_age = now.saturating_duration_since(established_at);
        connection_age >= self.min_forced_reconnection_interval
            && episode.age(now) >= self.dropped_connection_grace_period
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_forced_reconnection_interval: Duration::from_secs(60),
            dropped_connection_grace_period: Duration::from_secs(30),
            dropped_connection_episode_timeout: Duration::from_secs(60),
        }
    }
}
