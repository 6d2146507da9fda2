//! Property-based tests for connkeeper.
//!
//! These tests use proptest to generate failure timelines and check that
//! the reconnect policy and the manager agree on them.

pub mod manager;
