//! Connection manager metrics regression tests

use super::helpers::*;
use connkeeper::{
    Connection, ConnectionFactory, ConnectionManager, ConnectionManagerConfig, ConnectionState,
    ManualClock,
};
use futures::future::BoxFuture;
use serial_test::serial;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Conn;

impl Connection for Conn {}

/// Connects successfully except on the call numbers listed in `failing`.
struct Flaky {
    failing: &'static [usize],
    calls: AtomicUsize,
}

fn factory(failing: &'static [usize]) -> Flaky {
    Flaky {
        failing,
        calls: AtomicUsize::new(0),
    }
}

impl ConnectionFactory for Flaky {
    type Connection = Conn;
    type Error = io::Error;

    fn new_connection(&self) -> BoxFuture<'_, Result<Conn, io::Error>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let fails = self.failing.contains(&call);
        Box::pin(async move {
            if fails {
                Err(io::Error::from(io::ErrorKind::ConnectionRefused))
            } else {
                Ok(Conn)
            }
        })
    }
}

fn config(name: &str, clock: &ManualClock) -> ConnectionManagerConfig {
    ConnectionManagerConfig::builder()
        .name(name)
        .min_forced_reconnection_interval(Duration::from_secs(55))
        .dropped_connection_grace_period(Duration::from_secs(25))
        .dropped_connection_episode_timeout(Duration::from_secs(65))
        .clock(clock.clone())
        .build()
}

fn reset() -> io::Error {
    io::Error::from(io::ErrorKind::ConnectionReset)
}

async fn settle<F>(mut done: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..1_000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
#[serial]
async fn failure_metrics_exist() {
    init_recorder();

    let clock = ManualClock::new();
    let manager = ConnectionManager::new(factory(&[]), config("metrics_failures", &clock));
    manager.ensure_initialized().await.unwrap();

    manager.check_exception(&reset());
    manager.check_exception(&io::Error::other("WRONGTYPE"));

    assert_counter_exists("connkeeper_failures_total");
    assert_metric_has_label("connkeeper_failures_total", "manager", "metrics_failures");
    assert_metric_has_label("connkeeper_failures_total", "class", "recognized");
    assert_metric_has_label("connkeeper_failures_total", "class", "unrecognized");
    assert_eq!(
        counter_value(
            "connkeeper_failures_total",
            &[("manager", "metrics_failures"), ("class", "recognized")]
        ),
        1
    );

    manager.dispose().await;
}

#[tokio::test]
#[serial]
async fn reconnect_metrics_exist() {
    init_recorder();

    let clock = ManualClock::new();
    let manager = ConnectionManager::new(factory(&[]), config("metrics_reconnect", &clock));
    manager.ensure_initialized().await.unwrap();

    clock.set_elapsed(Duration::from_secs(56));
    manager.check_exception(&reset());
    clock.set_elapsed(Duration::from_secs(82));
    manager.check_exception(&reset());
    settle(|| manager.snapshot().reconnections == 1).await;
    manager.dispose().await;

    let labels = |outcome| [("manager", "metrics_reconnect"), ("outcome", outcome)];
    assert_counter_exists("connkeeper_reconnects_total");
    assert_eq!(counter_value("connkeeper_reconnects_total", &labels("started")), 1);
    assert_eq!(counter_value("connkeeper_reconnects_total", &labels("succeeded")), 1);

    assert_histogram_exists("connkeeper_reconnect_duration_seconds");
    assert_metric_has_label(
        "connkeeper_reconnect_duration_seconds",
        "manager",
        "metrics_reconnect",
    );

    assert_counter_exists("connkeeper_connections_disposed_total");
    let disposed = |reason| [("manager", "metrics_reconnect"), ("reason", reason)];
    assert_eq!(
        counter_value("connkeeper_connections_disposed_total", &disposed("superseded")),
        1
    );
    assert_eq!(
        counter_value("connkeeper_connections_disposed_total", &disposed("shutdown")),
        1
    );
}

#[tokio::test]
#[serial]
async fn failed_reconnect_metrics() {
    init_recorder();

    let clock = ManualClock::new();
    let manager = ConnectionManager::new(factory(&[1]), config("metrics_failed", &clock));
    manager.ensure_initialized().await.unwrap();

    clock.set_elapsed(Duration::from_secs(56));
    manager.check_exception(&reset());
    clock.set_elapsed(Duration::from_secs(82));
    manager.check_exception(&reset());
    settle(|| manager.state() == ConnectionState::Connected).await;
    manager.dispose().await;

    assert_metric_has_label("connkeeper_reconnects_total", "outcome", "failed");
    assert_eq!(
        counter_value(
            "connkeeper_reconnects_total",
            &[("manager", "metrics_failed"), ("outcome", "failed")]
        ),
        1
    );
}
