use std::sync::Arc;
use thiserror::Error;

/// Shared, type-erased error returned by a connection factory.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the [`ConnectionManager`](crate::ConnectionManager).
///
/// Cheap to clone: every caller awaiting the same initialization receives the
/// same error.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// No connection has been published yet; await
    /// [`ensure_initialized`](crate::ConnectionManager::ensure_initialized) first.
    #[error("connection manager is not initialized")]
    NotInitialized,

    /// The manager has been disposed.
    #[error("connection manager has been disposed")]
    Disposed,

    /// The factory failed to establish the initial connection.
    #[error("failed to establish connection: {0}")]
    Connect(#[source] BoxError),

    /// The initialization task panicked or was cancelled by the runtime.
    #[error("connection initialization was aborted")]
    InitializationAborted,
}

impl ConnectionError {
    pub(crate) fn connect<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ConnectionError::Connect(Arc::new(error))
    }

    /// Returns true if the connection was accessed before initialization completed.
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, ConnectionError::NotInitialized)
    }

    /// Returns true if the manager has been disposed.
    pub fn is_disposed(&self) -> bool {
        matches!(self, ConnectionError::Disposed)
    }

    /// Returns the factory error, if this is a connect failure.
    pub fn connect_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ConnectionError::Connect(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
