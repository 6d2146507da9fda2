//! Connections and the factories that create them.

use futures::future::{self, BoxFuture};
use std::sync::Arc;
use tower::{Service, ServiceExt};

/// A live connection owned by the manager.
///
/// Callers only ever borrow a connection through an `Arc`. The manager calls
/// [`dispose`](Connection::dispose) exactly once, after the connection stops
/// being current.
pub trait Connection: Send + Sync + 'static {
    /// Releases the underlying transport.
    ///
    /// The default does nothing and leaves cleanup to `Drop`.
    fn dispose(&self) -> BoxFuture<'_, ()> {
        Box::pin(future::ready(()))
    }
}

/// Produces new connections.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The connection type produced.
    type Connection: Connection;

    /// Error returned when a connection cannot be established.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establishes a new connection.
    fn new_connection(&self) -> BoxFuture<'_, Result<Self::Connection, Self::Error>>;
}

impl<F: ConnectionFactory> ConnectionFactory for Arc<F> {
    type Connection = F::Connection;
    type Error = F::Error;

    fn new_connection(&self) -> BoxFuture<'_, Result<Self::Connection, Self::Error>> {
        (**self).new_connection()
    }
}

/// Adapts a Tower service that yields connections into a [`ConnectionFactory`].
///
/// Each connection attempt drives a clone of the service through
/// `ready().call(())`.
///
/// # Example
///
/// ```rust
/// use connkeeper::{Connection, ServiceFactory};
/// use tower::service_fn;
///
/// struct Conn;
/// impl Connection for Conn {}
///
/// let factory = ServiceFactory::new(service_fn(|()| async {
///     Ok::<_, std::io::Error>(Conn)
/// }));
/// ```
#[derive(Debug, Clone)]
pub struct ServiceFactory<S> {
    service: S,
}

impl<S> ServiceFactory<S> {
    /// Wraps a connecting service.
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Returns a reference to the wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.service
    }
}

impl<S> ConnectionFactory for ServiceFactory<S>
where
    S: Service<()> + Clone + Send + Sync + 'static,
    S::Response: Connection,
    S::Error: std::error::Error + Send + Sync + 'static,
    S::Future: Send,
{
    type Connection = S::Response;
    type Error = S::Error;

    fn new_connection(&self) -> BoxFuture<'_, Result<Self::Connection, Self::Error>> {
        let service = self.service.clone();
        Box::pin(service.oneshot(()))
    }
}

#[cfg(feature = "redis")]
pub use self::redis_factory::{RedisConnection, RedisConnectionFactory};

#[cfg(feature = "redis")]
mod redis_factory {
    use super::{Connection, ConnectionFactory};
    use futures::future::BoxFuture;
    use redis::aio::MultiplexedConnection;

    /// Factory producing multiplexed Redis connections from a connection string.
    #[derive(Debug, Clone)]
    pub struct RedisConnectionFactory {
        client: redis::Client,
    }

    impl RedisConnectionFactory {
        /// Parses `connection_string` (`redis://` or `rediss://`) without connecting.
        pub fn open(connection_string: &str) -> redis::RedisResult<Self> {
            Ok(Self {
                client: redis::Client::open(connection_string)?,
            })
        }

        /// Uses an already configured client.
        pub fn from_client(client: redis::Client) -> Self {
            Self { client }
        }
    }

    impl ConnectionFactory for RedisConnectionFactory {
        type Connection = RedisConnection;
        type Error = redis::RedisError;

        fn new_connection(&self) -> BoxFuture<'_, Result<Self::Connection, Self::Error>> {
            Box::pin(async move {
                let inner = self.client.get_multiplexed_async_connection().await?;
                Ok(RedisConnection { inner })
            })
        }
    }

    /// A managed multiplexed Redis connection.
    ///
    /// Commands are issued on a cheap clone obtained from [`handle`](Self::handle).
    /// Dropping the last clone closes the socket.
    #[derive(Clone)]
    pub struct RedisConnection {
        inner: MultiplexedConnection,
    }

    impl RedisConnection {
        /// Returns a handle for issuing commands.
        pub fn handle(&self) -> MultiplexedConnection {
            self.inner.clone()
        }
    }

    impl Connection for RedisConnection {}
}
