//! Shared fixtures: a scriptable connection factory and timing helpers.

use connkeeper::{
    Connection, ConnectionFactory, ConnectionManager, ConnectionManagerConfig,
    ConnectionManagerConfigBuilder, ManualClock,
};
use futures::future::BoxFuture;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Records every connection created and how often each was disposed.
#[derive(Default)]
pub struct Ledger {
    disposals: Mutex<Vec<usize>>,
}

impl Ledger {
    fn register(&self) -> usize {
        let mut disposals = self.disposals.lock().unwrap();
        disposals.push(0);
        disposals.len() - 1
    }

    fn record_dispose(&self, id: usize) {
        self.disposals.lock().unwrap()[id] += 1;
    }

    /// Number of connections created so far.
    pub fn created(&self) -> usize {
        self.disposals.lock().unwrap().len()
    }

    /// How many times connection `id` was disposed.
    pub fn disposals_of(&self, id: usize) -> usize {
        self.disposals.lock().unwrap()[id]
    }

    /// Disposal count for every connection, indexed by id.
    pub fn all_disposals(&self) -> Vec<usize> {
        self.disposals.lock().unwrap().clone()
    }
}

pub struct MockConnection {
    pub id: usize,
    ledger: Arc<Ledger>,
}

impl Connection for MockConnection {
    fn dispose(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.ledger.record_dispose(self.id);
        })
    }
}

/// A factory whose calls can be held open and made to fail on demand.
pub struct MockFactory {
    pub ledger: Arc<Ledger>,
    calls: AtomicUsize,
    fail_next: AtomicUsize,
    gate: Arc<Semaphore>,
}

impl MockFactory {
    /// A factory that connects immediately.
    pub fn open() -> Self {
        Self::with_permits(Semaphore::MAX_PERMITS)
    }

    /// A factory whose calls stay pending until [`release`](Self::release)d.
    pub fn gated() -> Self {
        Self::with_permits(0)
    }

    fn with_permits(permits: usize) -> Self {
        Self {
            ledger: Arc::new(Ledger::default()),
            calls: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            gate: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Lets `n` pending or future calls complete.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Makes the next `n` calls fail with a refused connection.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of times `new_connection` was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;
    type Error = io::Error;

    fn new_connection(&self) -> BoxFuture<'_, Result<MockConnection, io::Error>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            self.gate
                .acquire()
                .await
                .expect("gate closed")
                .forget();

            let failing = self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ));
            }

            let id = self.ledger.register();
            Ok(MockConnection {
                id,
                ledger: Arc::clone(&self.ledger),
            })
        })
    }
}

/// Builder preloaded with the example thresholds (55s / 25s / 65s).
pub fn example_config(clock: &ManualClock) -> ConnectionManagerConfigBuilder {
    ConnectionManagerConfig::builder()
        .name("test")
        .min_forced_reconnection_interval(secs(55))
        .dropped_connection_grace_period(secs(25))
        .dropped_connection_episode_timeout(secs(65))
        .clock(clock.clone())
}

pub fn manager(factory: MockFactory, clock: &ManualClock) -> ConnectionManager<MockFactory> {
    init_tracing();
    ConnectionManager::new(factory, example_config(clock).build())
}

/// Routes manager logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .try_init();
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

pub fn reset() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer")
}

/// Reports a transport failure at `t` seconds after the clock origin.
pub fn fail_at(manager: &ConnectionManager<MockFactory>, clock: &ManualClock, t: u64) -> bool {
    clock.set_elapsed(secs(t));
    manager.check_exception(&reset())
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

/// Gives spawned tasks a chance to run.
pub async fn let_tasks_run() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
}
