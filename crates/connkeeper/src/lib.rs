//! Resilient manager for a single long-lived, shared connection.
//!
//! A [`ConnectionManager`] owns one connection to an external store (Redis or
//! anything shaped like it) that every part of an application borrows. Callers
//! report the errors they hit; the manager decides whether the connection is
//! really broken and, if so, replaces it in the background without ever
//! exposing a half-built or already-disposed connection.
//!
//! # Features
//!
//! - **Single-flight initialization**: concurrent first callers share one connection attempt
//! - **Episode-based failure tracking**: bursts of transport errors are grouped, quiet gaps reset them
//! - **Guarded reconnection**: a connection is only replaced when it is old enough and
//!   the failure episode has outlasted a grace period
//! - **Safe disposal**: superseded connections are disposed exactly once, and shutdown
//!   waits for in-flight work instead of leaking what it produces
//! - **Event system**: observability through [`ConnectionManagerEvent`]
//!
//! # Reconnect policy
//!
//! With `min_forced_reconnection_interval = 55s`, `dropped_connection_grace_period = 25s`
//! and `dropped_connection_episode_timeout = 65s`, and a connection made at `t = 0`:
//!
//! | Failures at | Outcome |
//! |-------------|---------|
//! | 56s, 80s | episode is 24s old, nothing happens |
//! | 56s, 82s | episode is 26s old, connection replaced at 82s |
//! | 56s, 122s | 66s gap ends the first episode, the new one is 0s old |
//!
//! # Examples
//!
//! ```rust
//! use connkeeper::{Connection, ConnectionManager, ConnectionManagerConfig, ServiceFactory};
//! use std::time::Duration;
//! use tower::service_fn;
//!
//! struct Conn;
//! impl Connection for Conn {}
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), connkeeper::ConnectionError> {
//! let config = ConnectionManagerConfig::builder()
//!     .name("sessions")
//!     .min_forced_reconnection_interval(Duration::from_secs(55))
//!     .dropped_connection_grace_period(Duration::from_secs(25))
//!     .dropped_connection_episode_timeout(Duration::from_secs(65))
//!     .on_reconnected(|took| println!("reconnected in {took:?}"))
//!     .build();
//!
//! let factory = ServiceFactory::new(service_fn(|()| async { Ok::<_, std::io::Error>(Conn) }));
//! let manager = ConnectionManager::new(factory, config);
//! manager.ensure_initialized().await?;
//!
//! let _conn = manager.current_connection()?;
//! manager.dispose().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `tracing`: structured logs for initialization, episodes, reconnection and disposal
//! - `metrics`: counters and histograms through the `metrics` facade
//! - `serde`: `Serialize`/`Deserialize` for [`ReconnectPolicy`]
//! - `redis`: [`RedisConnectionFactory`] and recognition of dropped `redis` connections

mod classify;
mod config;
mod error;
mod events;
mod factory;
mod manager;
mod policy;
mod state;

pub use classify::{ErrorClass, ErrorClassifier, FnClassifier, TransportErrorClassifier};
pub use config::{ConnectionManagerConfig, ConnectionManagerConfigBuilder};
pub use error::{BoxError, ConnectionError};
pub use events::{ConnectionManagerEvent, DisposeReason};
pub use factory::{Connection, ConnectionFactory, ServiceFactory};
#[cfg(feature = "redis")]
pub use factory::{RedisConnection, RedisConnectionFactory};
pub use manager::{ConnectionManager, Initialization};
pub use policy::{Episode, EpisodeTransition, ReconnectPolicy};
pub use state::{ConnectionSnapshot, ConnectionState};

pub use connkeeper_core::{Clock, ManualClock, TokioClock};

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

pub(crate) fn describe_metrics() {
    #[cfg(feature = "metrics")]
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "connkeeper_failures_total",
            "Errors reported to the connection manager, by classification"
        );
        describe_counter!(
            "connkeeper_reconnects_total",
            "Reconnection attempts, by outcome"
        );
        describe_counter!(
            "connkeeper_connections_disposed_total",
            "Connections disposed by the manager, by reason"
        );
        describe_histogram!(
            "connkeeper_reconnect_duration_seconds",
            "Time taken to create a replacement connection"
        );
    });
}
