//! Core infrastructure for connkeeper.
//!
//! This crate provides the pieces shared by the connection manager and anything
//! built on top of it:
//! - Event system for observability
//! - Injectable clocks so time-window decisions can be tested deterministically

pub mod clock;
pub mod events;

pub use clock::{Clock, ManualClock, TokioClock};
pub use events::{ConnectionEvent, EventListener, EventListeners, FnListener};
