//! A shared connection that is replaced after a sustained run of failures.
//!
//! Run with: cargo run --example shared_connection -p connkeeper --features tracing
//!
//! The simulated transport starts failing every command once it is a few
//! hundred milliseconds old. The manager keeps serving it through the grace
//! period, then swaps in a fresh connection.

use connkeeper::{Connection, ConnectionManager, ConnectionManagerConfig, ServiceFactory};
use futures::future::BoxFuture;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::service_fn;

struct Transport {
    id: usize,
    opened: Instant,
}

impl Transport {
    async fn command(&self, cmd: &str) -> io::Result<String> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.opened.elapsed() > Duration::from_millis(300) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ));
        }
        Ok(format!("{cmd} ok (connection {})", self.id))
    }
}

impl Connection for Transport {
    fn dispose(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            println!("   closing connection {}", self.id);
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Shared connection with episode-based reconnection\n");

    let next_id = Arc::new(AtomicUsize::new(0));
    let factory = ServiceFactory::new(service_fn(move |()| {
        let id = next_id.fetch_add(1, Ordering::SeqCst);
        async move {
            println!("   opening connection {id}");
            Ok::<_, io::Error>(Transport {
                id,
                opened: Instant::now(),
            })
        }
    }));

    let config = ConnectionManagerConfig::builder()
        .name("example")
        .min_forced_reconnection_interval(Duration::from_millis(400))
        .dropped_connection_grace_period(Duration::from_millis(150))
        .dropped_connection_episode_timeout(Duration::from_millis(200))
        .on_failure_recorded(|transition| println!("   failure recorded ({transition:?})"))
        .on_reconnect_started(|age| println!("   replacing connection aged {age:?}"))
        .on_reconnected(|took| println!("   replacement ready after {took:?}"))
        .build();

    let manager = ConnectionManager::new(factory, config);
    manager.ensure_initialized().await?;

    for i in 0..60 {
        let connection = manager.current_connection()?;
        match connection.command(&format!("PING {i}")).await {
            Ok(reply) => println!("{reply}"),
            Err(error) => {
                manager.check_exception(&error);
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    println!("\nReconnections: {}", manager.snapshot().reconnections);
    manager.dispose().await;
    Ok(())
}
