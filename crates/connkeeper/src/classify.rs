//! Classification of reported errors.
//!
//! The manager only tracks failures that mean the transport itself is gone.
//! Everything else (bad commands, serialization problems, timeouts raised by
//! the caller) is [`ErrorClass::Unrecognized`] and leaves the manager alone.

use std::error::Error;
use std::io;

/// Outcome of classifying a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The error represents a dropped or broken transport.
    Recognized,
    /// Any other error; ignored by the manager.
    Unrecognized,
}

impl ErrorClass {
    /// Returns true for [`ErrorClass::Recognized`].
    pub fn is_recognized(self) -> bool {
        matches!(self, ErrorClass::Recognized)
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn as_label(self) -> &'static str {
        match self {
            ErrorClass::Recognized => "recognized",
            ErrorClass::Unrecognized => "unrecognized",
        }
    }
}

impl From<bool> for ErrorClass {
    fn from(recognized: bool) -> Self {
        if recognized {
            ErrorClass::Recognized
        } else {
            ErrorClass::Unrecognized
        }
    }
}

/// Decides whether an error reported by a caller is a connection failure.
pub trait ErrorClassifier: Send + Sync {
    /// Classifies `error`.
    fn classify(&self, error: &(dyn Error + 'static)) -> ErrorClass;
}

/// Default classifier recognizing broken transports.
///
/// The error and every error in its `source()` chain are inspected. An
/// [`io::Error`] is recognized when its kind is one of
/// `ConnectionReset`, `ConnectionAborted`, `BrokenPipe`, `NotConnected`,
/// `UnexpectedEof` or `ConnectionRefused`. `TimedOut`, `HostUnreachable`,
/// `NetworkUnreachable` and `NetworkDown` count only when raised by the OS
/// (they carry a raw OS error code). Other OS errors such as `NotFound` or
/// `PermissionDenied` are not transport failures. With the `redis` feature, a `redis::RedisError` reporting a dropped
/// connection or an I/O failure is recognized as well.
///
/// # Example
///
/// ```rust
/// use connkeeper::{ErrorClass, ErrorClassifier, TransportErrorClassifier};
/// use std::io::{Error, ErrorKind};
///
/// let classifier = TransportErrorClassifier;
/// let reset = Error::new(ErrorKind::ConnectionReset, "reset by peer");
/// let denied = Error::new(ErrorKind::PermissionDenied, "NOPERM");
///
/// assert_eq!(classifier.classify(&reset), ErrorClass::Recognized);
/// assert_eq!(classifier.classify(&denied), ErrorClass::Unrecognized);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportErrorClassifier;

impl TransportErrorClassifier {
    fn recognizes(error: &(dyn Error + 'static)) -> bool {
        if let Some(io) = error.downcast_ref::<io::Error>() {
            return is_transport_failure(io);
        }

        #[cfg(feature = "redis")]
        if let Some(redis) = error.downcast_ref::<redis::RedisError>() {
            return redis.is_connection_dropped() || redis.is_io_error();
        }

        false
    }
}

impl ErrorClassifier for TransportErrorClassifier {
    fn classify(&self, error: &(dyn Error + 'static)) -> ErrorClass {
        let mut next = Some(error);
        while let Some(err) = next {
            if Self::recognizes(err) {
                return ErrorClass::Recognized;
            }
            next = err.source();
        }
        ErrorClass::Unrecognized
    }
}

fn is_transport_failure(error: &io::Error) -> bool {
    match error.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionRefused => true,
        // Socket-level only when reported by the OS; the same kinds built by
        // application code (a command timeout, say) say nothing about the link.
        io::ErrorKind::TimedOut
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::NetworkDown => error.raw_os_error().is_some(),
        _ => false,
    }
}

/// A classifier backed by a closure returning whether the error is recognized.
///
/// # Example
///
/// ```rust
/// use connkeeper::{ErrorClass, ErrorClassifier, FnClassifier};
///
/// let classifier = FnClassifier::new(|err: &(dyn std::error::Error + 'static)| {
///     err.to_string().contains("socket closed")
/// });
///
/// let err = std::io::Error::other("socket closed");
/// assert_eq!(classifier.classify(&err), ErrorClass::Recognized);
/// ```
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: F,
}

impl<F> FnClassifier<F>
where
    F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync,
{
    /// Creates a classifier from a predicate.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ErrorClassifier for FnClassifier<F>
where
    F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync,
{
    fn classify(&self, error: &(dyn Error + 'static)) -> ErrorClass {
        (self.f)(error).into()
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier").finish_non_exhaustive()
    }
}
