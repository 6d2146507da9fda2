//! The shared connection manager.

use crate::config::ConnectionManagerConfig;
use crate::error::ConnectionError;
use crate::events::{ConnectionManagerEvent, DisposeReason};
use crate::factory::{Connection, ConnectionFactory};
use crate::state::{ConnectionSnapshot, ConnectionState, State};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// Manages one long-lived connection shared by many concurrent callers.
///
/// Callers await [`ensure_initialized`](Self::ensure_initialized) once, then
/// borrow the connection with [`current_connection`](Self::current_connection)
/// for each operation. When an operation fails, the caller hands the error to
/// [`check_exception`](Self::check_exception). Transport failures are grouped
/// into episodes; once the connection is old enough and an episode has lasted
/// past the grace period, a replacement is created in the background and
/// swapped in atomically. The superseded connection is then disposed.
///
/// Clones share the same state.
///
/// # Example
///
/// ```rust
/// use connkeeper::{Connection, ConnectionManager, ConnectionManagerConfig, ServiceFactory};
/// use tower::service_fn;
///
/// struct Conn;
/// impl Connection for Conn {}
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), connkeeper::ConnectionError> {
/// let factory = ServiceFactory::new(service_fn(|()| async { Ok::<_, std::io::Error>(Conn) }));
/// let manager = ConnectionManager::new(factory, ConnectionManagerConfig::default());
///
/// manager.ensure_initialized().await?;
/// let conn = manager.current_connection()?;
///
/// let failure = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
/// assert!(manager.check_exception(&failure));
/// # drop(conn);
///
/// manager.dispose().await;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<F: ConnectionFactory> {
    inner: Arc<Inner<F>>,
}

struct Inner<F: ConnectionFactory> {
    factory: F,
    config: ConnectionManagerConfig,
    state: Mutex<State<F::Connection>>,
    init: OnceLock<Initialization>,
    teardown: OnceLock<Shared<BoxFuture<'static, ()>>>,
}

/// Handle to the single first-time connection attempt.
///
/// Every call to [`ConnectionManager::ensure_initialized`] returns a clone of
/// the same handle; awaiting any of them yields the same outcome.
#[derive(Clone)]
pub struct Initialization {
    shared: Shared<BoxFuture<'static, Result<(), ConnectionError>>>,
}

impl Initialization {
    fn ready(result: Result<(), ConnectionError>) -> Self {
        Self {
            shared: futures::future::ready(result).boxed().shared(),
        }
    }

    /// Returns true if both handles refer to the same initialization.
    ///
    /// Only meaningful while neither handle has been awaited to completion.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.shared.ptr_eq(&other.shared)
    }

    /// Returns the outcome if initialization has already finished.
    pub fn peek(&self) -> Option<&Result<(), ConnectionError>> {
        self.shared.peek()
    }
}

impl Future for Initialization {
    type Output = Result<(), ConnectionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.shared).poll(cx)
    }
}

impl std::fmt::Debug for Initialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initialization")
            .field("finished", &self.peek().is_some())
            .finish()
    }
}

impl<F: ConnectionFactory> ConnectionManager<F> {
    /// Creates a manager. No connection is made until
    /// [`ensure_initialized`](Self::ensure_initialized) is called.
    pub fn new(factory: F, config: ConnectionManagerConfig) -> Self {
        crate::describe_metrics();

        Self {
            inner: Arc::new(Inner {
                factory,
                config,
                state: Mutex::new(State::new()),
                init: OnceLock::new(),
                teardown: OnceLock::new(),
            }),
        }
    }

    /// Starts the first connection attempt, or joins the one already started.
    ///
    /// The factory is called at most once over the manager's lifetime; all
    /// callers, concurrent or not, get a handle to the same attempt. A failed
    /// initialization is not retried. If [`dispose`](Self::dispose) runs
    /// before initialization started, or while it is in flight, the handle
    /// resolves to [`ConnectionError::Disposed`].
    ///
    /// # Panics
    ///
    /// The first call panics if made outside a Tokio runtime.
    pub fn ensure_initialized(&self) -> Initialization {
        self.inner
            .init
            .get_or_init(|| Inner::start_initialization(&self.inner))
            .clone()
    }

    /// Borrows the current connection.
    ///
    /// Never blocks. Do not hold the returned handle across operations that
    /// may trigger a reconnection; fetch it again instead.
    pub fn current_connection(&self) -> Result<Arc<F::Connection>, ConnectionError> {
        let state = self.inner.state.lock();
        if state.disposed {
            return Err(ConnectionError::Disposed);
        }
        state
            .current
            .as_ref()
            .map(Arc::clone)
            .ok_or(ConnectionError::NotInitialized)
    }

    /// Reports an error observed while using the connection.
    ///
    /// Returns `false` if the error is not a connection failure; nothing is
    /// recorded in that case. Otherwise the failure is folded into the active
    /// episode and, when the reconnect policy is satisfied and no replacement
    /// is already in flight, a replacement is started in the background.
    /// Returns `true` for every recognized failure whether or not a
    /// reconnection was triggered.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime at a moment when the policy
    /// starts a reconnection. Unrecognized errors and failures that do not
    /// trigger a reconnection never touch the runtime.
    pub fn check_exception(&self, error: &(dyn std::error::Error + 'static)) -> bool {
        let inner = &self.inner;
        let class = inner.config.classifier.classify(error);

        #[cfg(feature = "metrics")]
        counter!(
            "connkeeper_failures_total",
            "manager" => inner.config.name.clone(),
            "class" => class.as_label()
        )
        .increment(1);

        let now = inner.now();

        if !class.is_recognized() {
            inner.emit(ConnectionManagerEvent::FailureIgnored {
                name: inner.config.name.clone(),
                timestamp: now,
            });
            return false;
        }

        let policy = &inner.config.policy;
        let (episode, transition) = {
            let mut state = inner.state.lock();
            if state.disposed {
                return true;
            }

            let (episode, transition) = policy.record_failure(state.episode, now);
            state.episode = Some(episode);

            if let Some(established_at) = state.established_at {
                if !state.reconnecting && policy.should_reconnect(established_at, &episode, now) {
                    let connection_age = now.saturating_duration_since(established_at);
                    let handle = tokio::spawn(
                        Arc::clone(inner).reconnect(connection_age, episode.age(now)),
                    );
                    state.reconnecting = true;
                    state.track(handle);
                }
            }

            (episode, transition)
        };

        #[cfg(feature = "tracing")]
        debug!(
            manager = %inner.config.name,
            transition = ?transition,
            episode_age = ?episode.age(now),
            "connection failure recorded"
        );

        inner.emit(ConnectionManagerEvent::FailureRecorded {
            name: inner.config.name.clone(),
            timestamp: now,
            transition,
            episode_started_at: episode.started_at(),
        });

        true
    }

    /// Shuts the manager down.
    ///
    /// Waits for an in-flight initialization or reconnection to settle,
    /// disposes any connection they produce instead of publishing it, then
    /// disposes the current connection. Concurrent and repeated calls all
    /// wait on the same teardown, which runs once.
    pub async fn dispose(&self) {
        let teardown = self
            .inner
            .teardown
            .get_or_init(|| {
                let weak = Arc::downgrade(&self.inner);
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.teardown().await;
                    }
                }
                .boxed()
                .shared()
            })
            .clone();
        teardown.await
    }

    /// Returns the coarse lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().connection_state()
    }

    /// Returns a consistent view of the manager's bookkeeping.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Returns the manager name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConnectionManagerConfig {
        &self.inner.config
    }

    /// Returns the connection factory.
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }
}

impl<F: ConnectionFactory> Clone for ConnectionManager<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for ConnectionManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("name", &self.inner.config.name)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl<F: ConnectionFactory> Inner<F> {
    fn now(&self) -> Instant {
        self.config.clock.now()
    }

    fn emit(&self, event: ConnectionManagerEvent) {
        self.config.event_listeners.emit(&event);
    }

    fn start_initialization(self: &Arc<Self>) -> Initialization {
        if self.state.lock().disposed {
            return Initialization::ready(Err(ConnectionError::Disposed));
        }

        let handle = tokio::spawn(Arc::clone(self).initialize());
        let joined = async move {
            handle
                .await
                .unwrap_or(Err(ConnectionError::InitializationAborted))
        };
        Initialization {
            shared: joined.boxed().shared(),
        }
    }

    async fn initialize(self: Arc<Self>) -> Result<(), ConnectionError> {
        let connection = match self.factory.new_connection().await {
            Ok(connection) => Arc::new(connection),
            Err(error) => {
                #[cfg(feature = "tracing")]
                warn!(manager = %self.config.name, error = %error, "initial connection failed");

                self.emit(ConnectionManagerEvent::InitializationFailed {
                    name: self.config.name.clone(),
                    timestamp: self.now(),
                    error: error.to_string(),
                });
                return Err(ConnectionError::connect(error));
            }
        };

        let now = self.now();
        let published = {
            let mut state = self.state.lock();
            if state.disposed {
                false
            } else {
                state.publish(Arc::clone(&connection), now);
                true
            }
        };

        if !published {
            self.dispose_connection(connection, DisposeReason::Orphaned)
                .await;
            return Err(ConnectionError::Disposed);
        }

        #[cfg(feature = "tracing")]
        info!(manager = %self.config.name, "connection established");

        self.emit(ConnectionManagerEvent::Initialized {
            name: self.config.name.clone(),
            timestamp: now,
        });
        Ok(())
    }

    async fn reconnect(self: Arc<Self>, connection_age: Duration, episode_age: Duration) {
        let started = self.now();

        #[cfg(feature = "tracing")]
        info!(
            manager = %self.config.name,
            connection_age = ?connection_age,
            episode_age = ?episode_age,
            "replacing failing connection"
        );

        #[cfg(feature = "metrics")]
        counter!("connkeeper_reconnects_total", "manager" => self.config.name.clone(), "outcome" => "started").increment(1);

        self.emit(ConnectionManagerEvent::ReconnectStarted {
            name: self.config.name.clone(),
            timestamp: started,
            connection_age,
            episode_age,
        });

        let connection = match self.factory.new_connection().await {
            Ok(connection) => Arc::new(connection),
            Err(error) => {
                // Episode and timestamps stay as they are so the next
                // qualifying failure retries under the same episode.
                self.state.lock().reconnecting = false;

                #[cfg(feature = "tracing")]
                warn!(manager = %self.config.name, error = %error, "reconnection failed");

                #[cfg(feature = "metrics")]
                counter!("connkeeper_reconnects_total", "manager" => self.config.name.clone(), "outcome" => "failed").increment(1);

                self.emit(ConnectionManagerEvent::ReconnectFailed {
                    name: self.config.name.clone(),
                    timestamp: self.now(),
                    error: error.to_string(),
                });
                return;
            }
        };

        let now = self.now();
        let swapped = {
            let mut state = self.state.lock();
            state.reconnecting = false;
            if state.disposed {
                None
            } else {
                state.reconnections += 1;
                Some(state.publish(Arc::clone(&connection), now))
            }
        };

        let Some(previous) = swapped else {
            self.dispose_connection(connection, DisposeReason::Orphaned)
                .await;
            return;
        };
        drop(connection);

        let duration = now.saturating_duration_since(started);

        #[cfg(feature = "tracing")]
        info!(manager = %self.config.name, duration = ?duration, "connection replaced");

        #[cfg(feature = "metrics")]
        {
            counter!("connkeeper_reconnects_total", "manager" => self.config.name.clone(), "outcome" => "succeeded").increment(1);
            histogram!("connkeeper_reconnect_duration_seconds", "manager" => self.config.name.clone())
                .record(duration.as_secs_f64());
        }

        self.emit(ConnectionManagerEvent::Reconnected {
            name: self.config.name.clone(),
            timestamp: now,
            duration,
        });

        if let Some(previous) = previous {
            self.dispose_connection(previous, DisposeReason::Superseded)
                .await;
        }
    }

    async fn dispose_connection(&self, connection: Arc<F::Connection>, reason: DisposeReason) {
        connection.dispose().await;

        #[cfg(feature = "tracing")]
        debug!(manager = %self.config.name, reason = ?reason, "connection disposed");

        #[cfg(feature = "metrics")]
        counter!(
            "connkeeper_connections_disposed_total",
            "manager" => self.config.name.clone(),
            "reason" => reason.as_label()
        )
        .increment(1);

        self.emit(ConnectionManagerEvent::ConnectionDisposed {
            name: self.config.name.clone(),
            timestamp: self.now(),
            reason,
        });
    }

    async fn teardown(self: Arc<Self>) {
        let background = {
            let mut state = self.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.background)
        };

        // Blocks until a concurrent `ensure_initialized` has stored its
        // handle, so an attempt that passed the `disposed` check is awaited.
        let init = self
            .init
            .get_or_init(|| Initialization::ready(Err(ConnectionError::Disposed)))
            .clone();
        let _ = init.await;

        for handle in background {
            if let Err(_error) = handle.await {
                #[cfg(feature = "tracing")]
                warn!(manager = %self.config.name, error = %_error, "reconnection task aborted");
            }
        }

        let current = {
            let mut state = self.state.lock();
            state.episode = None;
            state.current.take()
        };

        if let Some(connection) = current {
            self.dispose_connection(connection, DisposeReason::Shutdown)
                .await;
        }

        #[cfg(feature = "tracing")]
        info!(manager = %self.config.name, "connection manager disposed");

        self.emit(ConnectionManagerEvent::Disposed {
            name: self.config.name.clone(),
            timestamp: self.now(),
        });
    }
}

#[cfg(feature = "tracing")]
impl<F: ConnectionFactory> Drop for Inner<F> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.disposed && state.current.is_some() {
            warn!(
                manager = %self.config.name,
                "connection manager dropped without dispose; connection released by Drop"
            );
        }
    }
}
