use crate::classify::{ErrorClassifier, FnClassifier, TransportErrorClassifier};
use crate::events::{ConnectionManagerEvent, DisposeReason};
use crate::policy::{EpisodeTransition, ReconnectPolicy};
use connkeeper_core::{Clock, EventListener, EventListeners, FnListener, TokioClock};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
pub struct ConnectionManagerConfig {
    pub(crate) name: String,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) classifier: Arc<dyn ErrorClassifier>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) event_listeners: EventListeners<ConnectionManagerEvent>,
}

impl ConnectionManagerConfig {
    /// Creates a new builder.
    pub fn builder() -> ConnectionManagerConfigBuilder {
        crate::describe_metrics();
        ConnectionManagerConfigBuilder::default()
    }

    /// Returns the manager name used in events, logs and metric labels.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the reconnect thresholds.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Returns the configured clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the configured error classifier.
    pub fn classifier(&self) -> &Arc<dyn ErrorClassifier> {
        &self.classifier
    }
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        ConnectionManagerConfigBuilder::default().build()
    }
}

impl std::fmt::Debug for ConnectionManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManagerConfig")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("event_listeners", &self.event_listeners.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionManagerConfig`].
pub struct ConnectionManagerConfigBuilder {
    name: String,
    policy: ReconnectPolicy,
    classifier: Arc<dyn ErrorClassifier>,
    clock: Arc<dyn Clock>,
    event_listeners: EventListeners<ConnectionManagerEvent>,
}

impl Default for ConnectionManagerConfigBuilder {
    fn default() -> Self {
        Self {
            name: String::from("<unnamed>"),
            policy: ReconnectPolicy::default(),
            classifier: Arc::new(TransportErrorClassifier),
            clock: Arc::new(TokioClock),
            event_listeners: EventListeners::new(),
        }
    }
}

impl std::fmt::Debug for ConnectionManagerConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManagerConfigBuilder")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("event_listeners", &self.event_listeners.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionManagerConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives this manager a human-readable name for observability.
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces all reconnect thresholds at once.
    ///
    /// # Examples
    ///
    /// ```
    /// use connkeeper::{ConnectionManagerConfig, ReconnectPolicy};
    /// use std::time::Duration;
    ///
    /// let config = ConnectionManagerConfig::builder()
    ///     .policy(ReconnectPolicy::new(
    ///         Duration::from_secs(55),
    ///         Duration::from_secs(25),
    ///         Duration::from_secs(65),
    ///     ))
    ///     .build();
    /// assert_eq!(config.policy().dropped_connection_grace_period, Duration::from_secs(25));
    /// ```
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Minimum age a connection must reach before it may be replaced.
    ///
    /// Default: 60 seconds.
    pub fn min_forced_reconnection_interval(mut self, interval: Duration) -> Self {
        self.policy.min_forced_reconnection_interval = interval;
        self
    }

    /// Minimum time a failure episode must last before it triggers a reconnect.
    ///
    /// Default: 30 seconds.
    pub fn dropped_connection_grace_period(mut self, period: Duration) -> Self {
        self.policy.dropped_connection_grace_period = period;
        self
    }

    /// Maximum gap between failures of the same episode.
    ///
    /// Default: 60 seconds.
    pub fn dropped_connection_episode_timeout(mut self, timeout: Duration) -> Self {
        self.policy.dropped_connection_episode_timeout = timeout;
        self
    }

    /// Sets the classifier deciding which errors count as connection failures.
    ///
    /// Default: [`TransportErrorClassifier`].
    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: ErrorClassifier + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Classifies errors with a predicate returning `true` for connection failures.
    ///
    /// # Examples
    ///
    /// ```
    /// use connkeeper::ConnectionManagerConfig;
    ///
    /// let config = ConnectionManagerConfig::builder()
    ///     .recognize(|error| error.to_string().contains("connection closed"))
    ///     .build();
    /// ```
    pub fn recognize<F>(self, predicate: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.classifier(FnClassifier::new(predicate))
    }

    /// Sets the time source.
    ///
    /// Default: [`TokioClock`].
    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Registers a listener receiving every event.
    pub fn event_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<ConnectionManagerEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Registers a callback invoked when the first connection is published.
    pub fn on_initialized<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ConnectionManagerEvent| {
                if matches!(event, ConnectionManagerEvent::Initialized { .. }) {
                    f();
                }
            }));
        self
    }

    /// Registers a callback invoked for every recognized failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use connkeeper::{ConnectionManagerConfig, EpisodeTransition};
    ///
    /// let config = ConnectionManagerConfig::builder()
    ///     .on_failure_recorded(|transition| {
    ///         if transition == EpisodeTransition::Started {
    ///             println!("connection trouble started");
    ///         }
    ///     })
    ///     .build();
    /// ```
    pub fn on_failure_recorded<F>(mut self, f: F) -> Self
    where
        F: Fn(EpisodeTransition) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ConnectionManagerEvent| {
                if let ConnectionManagerEvent::FailureRecorded { transition, .. } = event {
                    f(*transition);
                }
            }));
        self
    }

    /// Registers a callback invoked when a reconnection starts.
    ///
    /// The callback receives the age of the connection being replaced.
    pub fn on_reconnect_started<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ConnectionManagerEvent| {
                if let ConnectionManagerEvent::ReconnectStarted { connection_age, .. } = event {
                    f(*connection_age);
                }
            }));
        self
    }

    /// Registers a callback invoked when a replacement connection is published.
    ///
    /// The callback receives how long the factory took.
    pub fn on_reconnected<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ConnectionManagerEvent| {
                if let ConnectionManagerEvent::Reconnected { duration, .. } = event {
                    f(*duration);
                }
            }));
        self
    }

    /// Registers a callback invoked when the factory fails during a reconnection.
    pub fn on_reconnect_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ConnectionManagerEvent| {
                if let ConnectionManagerEvent::ReconnectFailed { error, .. } = event {
                    f(error);
                }
            }));
        self
    }

    /// Registers a callback invoked whenever a connection is disposed.
    pub fn on_connection_disposed<F>(mut self, f: F) -> Self
    where
        F: Fn(DisposeReason) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ConnectionManagerEvent| {
                if let ConnectionManagerEvent::ConnectionDisposed { reason, .. } = event {
                    f(*reason);
                }
            }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ConnectionManagerConfig {
        ConnectionManagerConfig {
            name: self.name,
            policy: self.policy,
            classifier: self.classifier,
            clock: self.clock,
            event_listeners: self.event_listeners,
        }
    }
}
