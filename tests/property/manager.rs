//! Property tests for the manager's reaction to failure timelines.
//!
//! Invariants tested:
//! - The manager reconnects exactly when a simulation of the policy does
//! - Every connection created is disposed exactly once after dispose

use connkeeper::{
    Connection, ConnectionFactory, ConnectionManager, ConnectionManagerConfig, Episode,
    ManualClock, ReconnectPolicy,
};
use futures::future::BoxFuture;
use proptest::prelude::*;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;

#[derive(Default)]
struct Disposals(Mutex<Vec<usize>>);

struct Conn {
    id: usize,
    disposals: Arc<Disposals>,
}

impl Connection for Conn {
    fn dispose(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.disposals.0.lock().unwrap()[self.id] += 1;
        })
    }
}

#[derive(Default)]
struct Factory {
    disposals: Arc<Disposals>,
    calls: AtomicUsize,
}

impl ConnectionFactory for Factory {
    type Connection = Conn;
    type Error = io::Error;

    fn new_connection(&self) -> BoxFuture<'_, Result<Conn, io::Error>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let mut disposals = self.disposals.0.lock().unwrap();
            disposals.push(0);
            Ok(Conn {
                id: disposals.len() - 1,
                disposals: Arc::clone(&self.disposals),
            })
        })
    }
}

/// Replays `failures` against the bare policy, assuming each reconnection
/// completes before the next failure.
fn simulate(policy: &ReconnectPolicy, failures: &[Duration]) -> usize {
    let origin = std::time::Instant::now();
    let mut established_at = origin;
    let mut episode: Option<Episode> = None;
    let mut reconnections = 0;

    for offset in failures {
        let now = origin + *offset;
        let (next, _) = policy.record_failure(episode, now);
        episode = Some(next);
        if policy.should_reconnect(established_at, &next, now) {
            reconnections += 1;
            established_at = now;
            episode = None;
        }
    }
    reconnections
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property: Reconnection count matches the policy simulation
    #[test]
    fn manager_matches_policy_simulation(
        gaps in prop::collection::vec(1u64..=90, 1..25),
    ) {
        let policy = ReconnectPolicy::new(
            Duration::from_secs(55),
            Duration::from_secs(25),
            Duration::from_secs(65),
        );
        let mut offset = Duration::ZERO;
        let failures: Vec<Duration> = gaps
            .iter()
            .map(|gap| {
                offset += Duration::from_secs(*gap);
                offset
            })
            .collect();
        let expected = simulate(&policy, &failures);

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let clock = ManualClock::new();
            let config = ConnectionManagerConfig::builder()
                .policy(policy)
                .clock(clock.clone())
                .build();
            let manager = ConnectionManager::new(Factory::default(), config);
            manager.ensure_initialized().await.unwrap();

            for offset in &failures {
                clock.set_elapsed(*offset);
                prop_assert!(manager.check_exception(&io::Error::from(io::ErrorKind::BrokenPipe)));
                // Let any reconnection finish before the next failure.
                let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
                while manager.state() == connkeeper::ConnectionState::Reconnecting {
                    prop_assert!(tokio::time::Instant::now() < deadline, "reconnection stalled");
                    tokio::task::yield_now().await;
                }
            }

            prop_assert_eq!(manager.snapshot().reconnections as usize, expected);
            prop_assert_eq!(manager.factory().calls.load(Ordering::SeqCst), expected + 1);

            manager.dispose().await;
            let disposals = manager.factory().disposals.0.lock().unwrap().clone();
            prop_assert_eq!(disposals.len(), expected + 1);
            prop_assert!(disposals.iter().all(|&n| n == 1));

            Ok(())
        })?;
    }
}
