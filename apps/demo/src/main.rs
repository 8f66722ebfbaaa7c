//! # tabsync Demo
//!
//! Two contexts of one origin sharing a counter and a phrase list, plus a
//! per-context log that never leaves its context.
//!
//! ## Walkthrough
//! 1. Initialize tracing
//! 2. Tab A opens and leads every channel
//! 3. Tab A counts up; tab B opens and recovers the count from A
//! 4. Tab B generates phrases; tab A receives them
//! 5. Tab A closes; tab B takes over as leader

use std::time::Duration;

use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use tabsync::{ChannelConfig, Context, Origin, SyncConfig, SyncResult};

mod phrases;

#[tokio::main]
async fn main() -> SyncResult<()> {
    init_tracing();

    let config = SyncConfig::load_or_default(None);
    let origin = Origin::default();

    // Tab A
    let tab_a = Context::open(&origin, config.clone())?;
    let counter_a = tab_a.open_store(ChannelConfig::counter("counter").verbose(true)).await?;
    let phrases_a = tab_a
        .open_store(ChannelConfig::new("phrases", vec![phrases::PLACEHOLDER.to_string()]))
        .await?;
    let log_a = tab_a
        .open_store(ChannelConfig::new("log", Vec::<String>::new()).sync(false))
        .await?;

    for _ in 0..100 {
        counter_a.mutate("increment")?;
    }
    log_a.update(|log| append(log, "tab A counted to 100"));

    // Tab B
    let tab_b = Context::open(&origin, config)?;
    let counter_b = tab_b.open_store(ChannelConfig::counter("counter").verbose(true)).await?;
    let phrases_b = tab_b
        .open_store(ChannelConfig::new("phrases", vec![phrases::PLACEHOLDER.to_string()]))
        .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(count = counter_b.get(), "Tab B joined");

    let mut reader = phrases_a.reader();
    phrases_b.writer().set_val(phrases::generate(), true);
    let received = reader.changed().await?;
    info!(phrases = ?received, "Tab A received phrases");
    log_a.update(move |log| append(log, &format!("received {} phrases", received.len())));

    counter_b.writer().set_val(tabsync::Update::with(|v: &i64| v + 10), true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(a = counter_a.get(), b = counter_b.get(), "Counter after += 10");

    info!(log = ?log_a.get(), "Tab A log");
    tab_a.close().await;

    // Failover
    tokio::time::sleep(Duration::from_millis(1500)).await;
    info!(
        leader = counter_b.is_leader(),
        count = counter_b.get(),
        "Tab B after tab A closed"
    );

    tab_b.close().await;
    Ok(())
}

fn append(log: &[String], line: &str) -> Vec<String> {
    let mut next = log.to_vec();
    next.push(line.to_string());
    next
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tabsync=trace` - Show trace for tabsync only
/// - Default: INFO level
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tabsync=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .init();
}
