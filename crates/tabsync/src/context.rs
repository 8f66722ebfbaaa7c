//! # Contexts
//!
//! A context is one independent instance of the application (a tab). All
//! contexts of an origin share one storage area and one broadcast bus;
//! each has its own private area and identity.
//!
//! ```text
//! ┌───────────────────────────── Origin ────────────────────────────────────┐
//! │   shared area (localStorage)            BroadcastBus                    │
//! │          ▲                                  ▲                           │
//! │   ┌──────┴──────────────┐        ┌──────────┴──────────┐                │
//! │   │ Context A           │        │ Context B           │                │
//! │   │  private area       │        │  private area       │                │
//! │   │  PersistenceBackend │        │  PersistenceBackend │                │
//! │   │  stores + drivers   │        │  stores + drivers   │                │
//! │   └─────────────────────┘        └─────────────────────┘                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tabsync_core::{BackendTarget, ContextId};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::persistence::PersistenceBackend;
use crate::storage::{MemoryArea, StorageArea};
use crate::store::{ChannelConfig, StoreValue, SynchronizedStore};
use crate::transport::{BroadcastBus, OriginCapabilities};

/// Everything the contexts of one origin share.
#[derive(Clone, Debug)]
pub struct Origin {
    shared: Arc<MemoryArea>,
    bus: BroadcastBus,
}

impl Origin {
    pub fn new(capabilities: OriginCapabilities) -> Self {
        Origin {
            shared: Arc::new(MemoryArea::new(BackendTarget::Shared.token())),
            bus: BroadcastBus::new(capabilities),
        }
    }

    pub fn shared_area(&self) -> &Arc<MemoryArea> {
        &self.shared
    }

    pub fn bus(&self) -> &BroadcastBus {
        &self.bus
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::new(OriginCapabilities::default())
    }
}

/// What a store needs from its context.
#[derive(Clone)]
pub(crate) struct ContextScope {
    pub id: ContextId,
    pub config: Arc<SyncConfig>,
    pub bus: BroadcastBus,
    pub shared: Arc<dyn StorageArea>,
    pub backend: Arc<PersistenceBackend>,
    pub terminate_rx: watch::Receiver<bool>,
}

/// One running instance of the application.
pub struct Context {
    scope: ContextScope,
    origin: Origin,
    private: Arc<MemoryArea>,
    terminate_tx: watch::Sender<bool>,
    drivers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.scope.id)
            .field("backend", &self.scope.backend)
            .finish()
    }
}

impl Context {
    /// Opens a fresh context with an empty private area.
    pub fn open(origin: &Origin, config: SyncConfig) -> SyncResult<Self> {
        let private = Arc::new(MemoryArea::new(BackendTarget::Private.token()));
        Self::open_with_private(origin, config, private)
    }

    /// Opens a context over an existing private area.
    ///
    /// Fails with `StorageUnavailable` when an area refuses access.
    pub fn open_with_private(
        origin: &Origin,
        config: SyncConfig,
        private: Arc<MemoryArea>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let shared: Arc<dyn StorageArea> = origin.shared.clone();
        let backend = PersistenceBackend::open(
            private.clone(),
            shared.clone(),
            config.storage.clone(),
        )?;

        let id = ContextId::new();
        let (terminate_tx, terminate_rx) = watch::channel(false);
        info!(context = %id, backend = %backend.active(), "Context opened");

        Ok(Context {
            scope: ContextScope {
                id,
                config: Arc::new(config),
                bus: origin.bus.clone(),
                shared,
                backend: Arc::new(backend),
                terminate_rx,
            },
            origin: origin.clone(),
            private,
            terminate_tx,
            drivers: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ContextId {
        self.scope.id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.scope.config
    }

    pub fn private_area(&self) -> &Arc<MemoryArea> {
        &self.private
    }

    pub fn active_backend(&self) -> BackendTarget {
        self.scope.backend.active()
    }

    /// Opens a channel: hydrate, join the election, ask for state if
    /// someone else leads.
    pub async fn open_store<V: StoreValue>(
        &self,
        config: ChannelConfig<V>,
    ) -> SyncResult<SynchronizedStore<V>> {
        let (store, driver) = SynchronizedStore::open(config, &self.scope).await?;

        match self.drivers.lock() {
            Ok(mut drivers) => drivers.push(driver),
            Err(poisoned) => poisoned.into_inner().push(driver),
        }

        info!(
            context = %self.scope.id,
            channel = store.name(),
            role = %store.election_state().role,
            "Store opened"
        );
        Ok(store)
    }

    /// Moves every channel record to `target` and records the choice for
    /// the whole origin. With `reload_after`, channels re-hydrate and rejoin.
    pub fn select_backend(&self, target: &str, reload_after: bool) -> SyncResult<()> {
        self.scope.backend.select_backend(target, reload_after)
    }

    /// Closes every channel; leaders announce their death first.
    pub async fn close(self) {
        self.shutdown().await;
        info!(context = %self.scope.id, "Context closed");
    }

    /// Closes this context and opens a new one over the same private area,
    /// as a page reload does. Stores must be opened again.
    pub async fn reload(self) -> SyncResult<Context> {
        self.shutdown().await;
        debug!(context = %self.scope.id, "Context reloading");

        let config = SyncConfig::clone(&self.scope.config);
        Context::open_with_private(&self.origin, config, self.private.clone())
    }

    async fn shutdown(&self) {
        self.terminate_tx.send_replace(true);

        let drivers = match self.drivers.lock() {
            Ok(mut drivers) => std::mem::take(&mut *drivers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for driver in drivers {
            if let Err(e) = driver.await {
                warn!(context = %self.scope.id, error = %e, "Store driver failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tabsync_core::record::extract_value;
    use tabsync_core::{Frame, PersistedRecord, WireMessage};

    use crate::config::TransportSettings;
    use crate::error::SyncError;
    use crate::transport::{Subscription, Transport};

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    async fn observer(origin: &Origin, channel: &str) -> (Transport, Subscription) {
        let transport = Transport::open(
            origin.bus(),
            channel,
            ContextId::new(),
            &TransportSettings::default(),
            "tabsync-",
            origin.shared_area().clone(),
        )
        .await;
        let subscription = transport.subscribe();
        (transport, subscription)
    }

    /// Collects data frames seen during `window`.
    async fn drain_data(sub: &mut Subscription, window: Duration) -> Vec<WireMessage> {
        let deadline = tokio::time::Instant::now() + window;
        let mut seen = Vec::new();
        while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, sub.recv()).await {
            if let Frame::Data(payload) = frame {
                if let Ok(msg) = WireMessage::decode(&payload) {
                    seen.push(msg);
                }
            }
        }
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_across_contexts() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_a = a.open_store(ChannelConfig::counter("counter")).await.unwrap();
        assert!(counter_a.is_leader());

        for _ in 0..3 {
            counter_a.mutate("increment").unwrap();
        }
        assert_eq!(counter_a.get(), 3);

        let b = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_b = b.open_store(ChannelConfig::counter("counter")).await.unwrap();
        settle().await;
        assert_eq!(counter_b.get(), 3);
        assert!(!counter_b.election_state().awaiting_initial_state);

        counter_b.decrement();
        settle().await;
        assert_eq!(counter_a.get(), 2);
        assert_eq!(counter_b.get(), 2);

        // Exactly one leader
        assert!(counter_a.is_leader() ^ counter_b.is_leader());
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_recovery_of_collection() {
        let origin = Origin::default();
        let initial = vec!["Press Generate".to_string()];
        let chosen = vec![
            "Gomu Gomu no...".to_string(),
            "I'll be back".to_string(),
            "Winter is coming".to_string(),
        ];

        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let phrases_a = a
            .open_store(ChannelConfig::new("phrases", initial.clone()))
            .await
            .unwrap();
        phrases_a.set(chosen.clone());

        let b = Context::open(&origin, SyncConfig::default()).unwrap();
        let phrases_b = b
            .open_store(ChannelConfig::new("phrases", initial))
            .await
            .unwrap();
        settle().await;
        assert_eq!(phrases_b.get(), chosen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisional_write_superseded_by_leader() {
        let origin = Origin::default();
        let initial = vec!["Press Generate".to_string()];
        let leader_value = vec!["X".to_string(), "Y".to_string()];
        let provisional = vec!["Z".to_string()];

        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let phrases_a = a
            .open_store(ChannelConfig::new("phrases", initial.clone()))
            .await
            .unwrap();
        phrases_a.set(leader_value.clone());
        let (_observer, mut sub) = observer(&origin, "phrases").await;

        let b = Context::open(&origin, SyncConfig::default()).unwrap();
        let phrases_b = b
            .open_store(ChannelConfig::new("phrases", initial))
            .await
            .unwrap();
        assert!(phrases_b.election_state().awaiting_initial_state);

        // Stored, never broadcast
        phrases_b.set(provisional.clone());
        let stored = b.private_area().get_item("tabsync-phrases").unwrap().unwrap();
        assert_eq!(extract_value::<Vec<String>>(&stored).unwrap(), provisional);

        let seen = drain_data(&mut sub, Duration::from_millis(500)).await;
        let broadcast: Vec<Vec<String>> = seen
            .iter()
            .filter_map(|m| match m {
                WireMessage::State { num } => extract_value(num).ok(),
                _ => None,
            })
            .collect();
        assert!(!broadcast.is_empty());
        assert!(!broadcast.contains(&provisional));

        assert!(!phrases_b.election_state().awaiting_initial_state);
        assert_eq!(phrases_a.get(), leader_value);
        assert_eq!(phrases_b.get(), leader_value);
        let stored = b.private_area().get_item("tabsync-phrases").unwrap().unwrap();
        assert_eq!(extract_value::<Vec<String>>(&stored).unwrap(), leader_value);
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_values_are_not_rebroadcast() {
        let origin = Origin::new(OriginCapabilities::storage_only());
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_a = a.open_store(ChannelConfig::counter("counter")).await.unwrap();
        let b = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_b = b.open_store(ChannelConfig::counter("counter")).await.unwrap();
        settle().await;

        let (_observer, mut sub) = observer(&origin, "counter").await;
        counter_a.set(5);

        let seen = drain_data(&mut sub, Duration::from_millis(5000)).await;
        let states = seen
            .iter()
            .filter(|m| matches!(m, WireMessage::State { .. }))
            .count();
        assert_eq!(states, 1);
        // The receiver acknowledged once the coalesce window passed
        assert!(seen.contains(&WireMessage::EchoClear));
        assert_eq!(counter_b.get(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_initial_everywhere() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_a = a.open_store(ChannelConfig::counter("counter")).await.unwrap();
        let b = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_b = b.open_store(ChannelConfig::counter("counter")).await.unwrap();

        counter_a.increment();
        counter_a.increment();
        settle().await;
        assert_eq!(counter_b.get(), 2);

        counter_b.writer().reset();
        settle().await;
        assert_eq!(counter_a.get(), 0);
        assert_eq!(counter_b.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leader_failover_on_close() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_a = a.open_store(ChannelConfig::counter("counter")).await.unwrap();
        let b = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_b = b.open_store(ChannelConfig::counter("counter")).await.unwrap();
        assert!(counter_a.is_leader());
        assert!(!counter_b.is_leader());

        counter_a.set(9);
        settle().await;
        a.close().await;

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(counter_b.is_leader());
        assert_eq!(counter_b.get(), 9);

        // A newcomer recovers the value from the new leader
        let c = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_c = c.open_store(ChannelConfig::counter("counter")).await.unwrap();
        settle().await;
        assert_eq!(counter_c.get(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_messages_dropped() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_a = a
            .open_store(ChannelConfig::counter("counter").verbose(true))
            .await
            .unwrap();
        counter_a.set(4);

        let (rogue, _sub) = observer(&origin, "counter").await;
        rogue.publish(Frame::Data(json!({ "num": "not json" })));
        rogue.publish(Frame::Data(json!({ "num": "{\"state\":{}}" })));
        rogue.publish(Frame::Data(json!({ "foo": 1 })));
        rogue.publish(Frame::Data(json!(42)));
        settle().await;
        assert_eq!(counter_a.get(), 4);

        // A well-formed message still applies afterwards
        let record = PersistedRecord::new(8_i64, true).to_json().unwrap();
        rogue.publish(Frame::data(&WireMessage::State { num: record }));
        settle().await;
        assert_eq!(counter_a.get(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_storage_is_fatal() {
        let origin = Origin::default();
        origin.shared_area().set_available(false);
        let err = Context::open(&origin, SyncConfig::default()).unwrap_err();
        assert!(err.is_environment_error());

        origin.shared_area().set_available(true);
        let private = Arc::new(MemoryArea::new("sessionStorage"));
        private.set_available(false);
        let err = Context::open_with_private(&origin, SyncConfig::default(), private).unwrap_err();
        assert!(err.is_environment_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_recovers_from_private_area() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter = a.open_store(ChannelConfig::counter("counter")).await.unwrap();
        counter.set(4);
        let old_id = a.id();

        let a = a.reload().await.unwrap();
        assert_ne!(a.id(), old_id);
        let counter = a.open_store(ChannelConfig::counter("counter")).await.unwrap();
        assert_eq!(counter.get(), 4);
        assert!(counter.is_leader());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_switch_reloads_and_is_shared() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_a = a.open_store(ChannelConfig::counter("counter")).await.unwrap();
        counter_a.set(7);
        assert_eq!(a.active_backend(), BackendTarget::Private);

        a.select_backend("localStorage", true).unwrap();
        assert_eq!(a.active_backend(), BackendTarget::Shared);
        assert!(!a.private_area().snapshot().contains_key("tabsync-counter"));
        assert!(origin.shared_area().snapshot().contains_key("tabsync-counter"));

        // The channel rejoined alone and kept its value
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(counter_a.get(), 7);
        assert!(counter_a.is_leader());

        // A later context follows the selector and hydrates from shared
        let c = Context::open(&origin, SyncConfig::default()).unwrap();
        assert_eq!(c.active_backend(), BackendTarget::Shared);

        let err = a.select_backend("cookies", false).unwrap_err();
        assert!(matches!(err, SyncError::InvalidBackendTarget(_)));
        assert_eq!(a.active_backend(), BackendTarget::Shared);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_channel_and_unknown_mutator() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter = a.open_store(ChannelConfig::counter("counter")).await.unwrap();

        let err = a
            .open_store(ChannelConfig::counter("counter"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::DuplicateChannel(_)));

        let err = counter.mutate("triple").unwrap_err();
        assert!(matches!(err, SyncError::UnknownMutator { .. }));
        assert_eq!(counter.writer().mutators(), vec!["decrement", "increment"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsynchronized_channel_stays_local() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let stale = PersistedRecord::new(99_i64, true).to_json().unwrap();
        a.private_area().set_item("tabsync-local", &stale).unwrap();

        let (_observer, mut sub) = observer(&origin, "local").await;
        let local = a
            .open_store(ChannelConfig::new("local", 5_i64).sync(false))
            .await
            .unwrap();
        assert_eq!(local.get(), 5);
        assert!(local.status().delivery.is_none());
        assert!(!a.private_area().snapshot().contains_key("tabsync-local"));

        local.set(6);
        assert!(a.private_area().snapshot().contains_key("tabsync-local"));
        assert!(drain_data(&mut sub, Duration::from_millis(2000)).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_sees_remote_changes() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_a = a.open_store(ChannelConfig::counter("counter")).await.unwrap();
        let b = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter_b = b.open_store(ChannelConfig::counter("counter")).await.unwrap();
        settle().await;

        let mut reader = counter_b.reader();
        counter_a.increment();
        let value = tokio::time::timeout(Duration::from_secs(1), reader.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(reader.get(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_persist_what_memory_holds() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let store = a
            .open_store(ChannelConfig::new("race", Vec::<u64>::new()))
            .await
            .unwrap();
        let (_observer, mut sub) = observer(&origin, "race").await;

        for _ in 0..50 {
            let barrier = std::sync::Barrier::new(8);
            std::thread::scope(|scope| {
                for t in 0..8u64 {
                    let store = store.clone();
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        store.set(vec![t; 200]);
                    });
                }
            });

            let held = store.get();
            let stored = a.private_area().get_item("tabsync-race").unwrap().unwrap();
            assert_eq!(extract_value::<Vec<u64>>(&stored).unwrap(), held);

            let mut last = None;
            while let Ok(Some(frame)) =
                tokio::time::timeout(Duration::from_millis(20), sub.recv()).await
            {
                if let Frame::Data(payload) = frame {
                    if let Ok(WireMessage::State { num }) = WireMessage::decode(&payload) {
                        last = Some(extract_value::<Vec<u64>>(&num).unwrap());
                    }
                }
            }
            assert_eq!(last, Some(held));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_saturates_at_bounds() {
        let origin = Origin::default();
        let a = Context::open(&origin, SyncConfig::default()).unwrap();
        let counter = a.open_store(ChannelConfig::counter("counter")).await.unwrap();

        counter.set(i64::MAX);
        counter.increment();
        counter.mutate("increment").unwrap();
        assert_eq!(counter.get(), i64::MAX);

        counter.set(i64::MIN);
        counter.decrement();
        assert_eq!(counter.get(), i64::MIN);
    }
}
