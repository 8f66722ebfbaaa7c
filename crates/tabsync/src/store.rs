//! # Synchronized Store
//!
//! One synchronized value per channel: in-memory state, persistence, and
//! the driver task that connects it to the channel's bus and election.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           set_val(update, do_post)                      │
//! │                                                                         │
//! │  1. value = update(current)                                            │
//! │  2. notify readers                    (watch channel)                  │
//! │  3. record = {state:{val,doPost},version:0}                            │
//! │  4. backend.write(key, record)        (always, even while awaiting)    │
//! │  5. broadcast { num: record }  iff  do_post                            │
//! │                                      && sync enabled                   │
//! │                                      && joined && not awaiting         │
//! │                                                                         │
//! │  All five steps run under the state write lock, so concurrent writers  │
//! │  persist and broadcast in the order they changed memory.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Inbound Path (driver task)
//! ```text
//!   "ask_leader_for_state" ──► PeerQuery ──► leader republishes current value
//!   { num }                ──► PeerReply ──► set_val(val, do_post = false)
//!                                            echo_guard.request_clear()
//!   ""                     ──► ignored
//!   anything else          ──► dropped (debug, or warn when verbose)
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tabsync_core::record::extract_value;
use tabsync_core::{Frame, PersistedRecord, WireMessage};

use crate::channel::{ChannelEvent, Effect, ElectionState, Role};
use crate::context::ContextScope;
use crate::echo_guard::{EchoGuard, EchoGuardHandle};
use crate::election::{
    wait_joined, ElectionConfig, ElectionHandle, ElectionService, JoinOutcome, LeaderState,
};
use crate::error::{SyncError, SyncResult};
use crate::persistence::PersistenceBackend;
use crate::transport::{DeliveryMode, Subscription, Transport};

/// Values a channel can carry.
pub trait StoreValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A named update function.
pub type Mutator<V> = Arc<dyn Fn(&V) -> V + Send + Sync>;

// =============================================================================
// Channel Configuration
// =============================================================================

/// Code-level configuration of one channel.
#[derive(Clone)]
pub struct ChannelConfig<V> {
    name: String,
    initial: V,
    sync: bool,
    verbose: bool,
    mutators: BTreeMap<String, Mutator<V>>,
}

impl<V: StoreValue> ChannelConfig<V> {
    /// A synchronized channel with no mutators.
    pub fn new(name: impl Into<String>, initial: V) -> Self {
        ChannelConfig {
            name: name.into(),
            initial,
            sync: true,
            verbose: false,
            mutators: BTreeMap::new(),
        }
    }

    /// Turns cross-context synchronization on or off.
    pub fn sync(mut self, enabled: bool) -> Self {
        self.sync = enabled;
        self
    }

    /// Raises protocol diagnostics to `info` and dropped messages to `warn`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Adds a named mutator, replacing one with the same name.
    pub fn mutator<F>(mut self, name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&V) -> V + Send + Sync + 'static,
    {
        self.mutators.insert(name.into(), Arc::new(apply));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial(&self) -> &V {
        &self.initial
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync
    }
}

impl ChannelConfig<i64> {
    /// A counter starting at zero with `increment` and `decrement`.
    pub fn counter(name: impl Into<String>) -> Self {
        ChannelConfig::new(name, 0)
            .mutator("increment", |v: &i64| v.saturating_add(1))
            .mutator("decrement", |v: &i64| v.saturating_sub(1))
    }
}

impl<V> std::fmt::Debug for ChannelConfig<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("name", &self.name)
            .field("sync", &self.sync)
            .field("verbose", &self.verbose)
            .field("mutators", &self.mutators.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// Store State
// =============================================================================

/// A new value, or a function deriving it from the current one.
pub enum Update<V> {
    Value(V),
    With(Box<dyn FnOnce(&V) -> V>),
}

impl<V> From<V> for Update<V> {
    fn from(value: V) -> Self {
        Update::Value(value)
    }
}

impl<V> Update<V> {
    pub fn with<F>(apply: F) -> Self
    where
        F: FnOnce(&V) -> V + 'static,
    {
        Update::With(Box::new(apply))
    }

    fn apply(self, current: &V) -> V {
        match self {
            Update::Value(value) => value,
            Update::With(apply) => apply(current),
        }
    }
}

/// In-memory value and whether its last write originated here.
#[derive(Debug, Clone)]
pub struct StoreState<V> {
    pub value: V,
    pub originated_locally: bool,
}

/// Point-in-time view of a store, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub channel: String,
    pub role: Role,
    pub awaiting_initial_state: bool,
    pub sync_enabled: bool,
    pub delivery: Option<DeliveryMode>,
}

// =============================================================================
// Synchronized Store
// =============================================================================

struct Inner<V> {
    name: String,
    initial: V,
    sync: bool,
    verbose: bool,
    mutators: BTreeMap<String, Mutator<V>>,
    key: String,
    state: RwLock<StoreState<V>>,
    election: RwLock<ElectionState>,
    backend: Arc<PersistenceBackend>,
    transport: Option<Transport>,
    value_tx: watch::Sender<V>,
}

/// A value kept consistent across every context that opened its channel.
pub struct SynchronizedStore<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for SynchronizedStore<V> {
    fn clone(&self) -> Self {
        SynchronizedStore {
            inner: self.inner.clone(),
        }
    }
}

impl<V: StoreValue> SynchronizedStore<V> {
    /// Opens the channel in a context and joins its election.
    ///
    /// Returns once the join campaign finished; the leader's reply to a
    /// follower arrives later through the driver task.
    pub(crate) async fn open(
        config: ChannelConfig<V>,
        scope: &ContextScope,
    ) -> SyncResult<(Self, JoinHandle<()>)> {
        let key = scope.config.record_key(&config.name);
        scope.backend.register(&config.name, &key)?;

        let (value, election) = if config.sync {
            let value = hydrate(&scope.backend, &key, &config.initial, &config.name)?;
            (value, ElectionState::default())
        } else {
            // Unsynchronized channels start fresh on every open
            scope.backend.remove(&key)?;
            debug!(channel = %config.name, "Sync disabled, discarded persisted record");
            (config.initial.clone(), ElectionState::standalone())
        };

        let transport = if config.sync {
            Some(
                Transport::open(
                    &scope.bus,
                    &config.name,
                    scope.id,
                    &scope.config.transport,
                    &scope.config.storage.key_prefix,
                    scope.shared.clone(),
                )
                .await,
            )
        } else {
            None
        };

        let (value_tx, _) = watch::channel(value.clone());
        let store = SynchronizedStore {
            inner: Arc::new(Inner {
                name: config.name,
                initial: config.initial,
                sync: config.sync,
                verbose: config.verbose,
                mutators: config.mutators,
                key,
                state: RwLock::new(StoreState {
                    value,
                    originated_locally: false,
                }),
                election: RwLock::new(election),
                backend: scope.backend.clone(),
                transport,
                value_tx,
            }),
        };

        let link = match &store.inner.transport {
            Some(transport) => {
                // Subscribe before joining so the leader's reply is buffered
                let subscription = transport.subscribe();
                let echo = EchoGuard::new(transport.clone(), scope.config.echo_clear_window())
                    .start(scope.config.transport.secure);
                let (election, leader_rx, joined) = store.join(scope).await?;
                Some(Link {
                    subscription,
                    echo,
                    election,
                    leader_rx,
                    last: joined,
                    election_alive: true,
                })
            }
            None => None,
        };

        let driver = Driver {
            store: store.clone(),
            scope: scope.clone(),
            terminate_rx: scope.terminate_rx.clone(),
            reload_rx: scope.backend.subscribe_reload(),
        };
        let handle = tokio::spawn(driver.run(link));

        Ok((store, handle))
    }

    /// Starts an election on the channel and applies the join outcome.
    async fn join(
        &self,
        scope: &ContextScope,
    ) -> SyncResult<(ElectionHandle, watch::Receiver<LeaderState>, LeaderState)> {
        let transport = self
            .inner
            .transport
            .clone()
            .ok_or_else(|| SyncError::InvalidConfig("channel has no transport".into()))?;

        let election = ElectionService::new(
            scope.id,
            transport,
            ElectionConfig::from(&scope.config.election),
        )
        .start();
        let mut leader_rx = election.subscribe();
        let joined = wait_joined(&mut leader_rx).await?;

        let leader_found = joined.joined == Some(JoinOutcome::Follower);
        if leader_found {
            self.log_protocol("Another context leads, asking for state");
        } else {
            self.log_protocol("No leader present, this context leads");
        }
        let effect = self.on_event(ChannelEvent::Joined { leader_found });
        self.perform(effect, None);

        Ok((election, leader_rx, joined))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current in-memory value. Never blocks on the network.
    pub fn get(&self) -> V {
        self.read_state(|s| s.value.clone())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn initial(&self) -> &V {
        &self.inner.initial
    }

    pub fn election_state(&self) -> ElectionState {
        match self.inner.election.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.election_state().is_leader()
    }

    pub fn status(&self) -> StoreStatus {
        let election = self.election_state();
        StoreStatus {
            channel: self.inner.name.clone(),
            role: election.role,
            awaiting_initial_state: election.awaiting_initial_state,
            sync_enabled: self.inner.sync,
            delivery: self.inner.transport.as_ref().map(Transport::mode),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Sets a value or derives one from the current value.
    ///
    /// The result is persisted; it is broadcast when `do_post` is set, the
    /// channel synchronizes, and the context is no longer awaiting the
    /// leader's value.
    pub fn set_val(&self, update: impl Into<Update<V>>, do_post: bool) {
        let update = update.into();
        self.write_state(|state| {
            state.value = update.apply(&state.value);
            state.originated_locally = do_post;
            self.commit(state);
        });
    }

    /// Local write: `set_val(value, true)`.
    pub fn set(&self, value: V) {
        self.set_val(value, true);
    }

    /// Local write derived from the current value.
    pub fn update<F>(&self, apply: F)
    where
        F: FnOnce(&V) -> V + 'static,
    {
        self.set_val(Update::with(apply), true);
    }

    /// Restores the channel's initial value.
    pub fn reset(&self) {
        self.set_val(self.inner.initial.clone(), true);
    }

    /// Runs a named mutator as a local write.
    pub fn mutate(&self, name: &str) -> SyncResult<()> {
        let mutator = self
            .inner
            .mutators
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownMutator {
                channel: self.inner.name.clone(),
                name: name.to_string(),
            })?;
        self.update(move |v| mutator(v));
        Ok(())
    }

    /// Names of the domain mutators, sorted.
    pub fn mutators(&self) -> Vec<String> {
        self.inner.mutators.keys().cloned().collect()
    }

    pub fn reader(&self) -> StoreReader<V> {
        StoreReader {
            store: self.clone(),
            rx: self.inner.value_tx.subscribe(),
        }
    }

    pub fn writer(&self) -> StoreWriter<V> {
        StoreWriter {
            store: self.clone(),
        }
    }

    /// Persists and, when allowed, broadcasts a freshly written value.
    ///
    /// Called with the state write lock held.
    fn commit(&self, state: &StoreState<V>) {
        let do_post = state.originated_locally;
        self.inner.value_tx.send_replace(state.value.clone());

        let text = match PersistedRecord::new(state.value.clone(), do_post).to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(channel = %self.inner.name, error = %e, "Failed to encode record");
                return;
            }
        };

        if let Err(e) = self.inner.backend.write(&self.inner.key, &text) {
            warn!(channel = %self.inner.name, error = %e, "Failed to persist record");
        }

        if self.election_state().should_broadcast(do_post, self.inner.sync) {
            self.log_protocol("Local write, posting");
            self.publish(WireMessage::State { num: text });
        } else {
            debug!(
                channel = %self.inner.name,
                do_post,
                "Write not posted (sync off, received, or awaiting leader)"
            );
        }
    }

    /// Re-sends the current value for a joining peer.
    ///
    /// Leaders always answer, even before their own first value arrived.
    fn republish(&self) {
        // Under the read lock so no newer local write is broadcast first
        self.read_state(|state| match PersistedRecord::new(state.value.clone(), true).to_json() {
            Ok(text) => {
                self.log_protocol("Re-sending the value for a new context");
                self.publish(WireMessage::State { num: text });
            }
            Err(e) => warn!(channel = %self.inner.name, error = %e, "Failed to encode record"),
        });
    }

    fn publish(&self, msg: WireMessage) {
        if let Some(transport) = &self.inner.transport {
            transport.publish(Frame::data(&msg));
        }
    }

    // =========================================================================
    // State Machine Plumbing
    // =========================================================================

    fn on_event(&self, event: ChannelEvent) -> Effect {
        match self.inner.election.write() {
            Ok(mut state) => state.on_event(event),
            Err(poisoned) => poisoned.into_inner().on_event(event),
        }
    }

    /// Performs an effect; `ApplyRemote` needs the received value.
    fn perform(&self, effect: Effect, received: Option<V>) {
        match effect {
            Effect::AskLeader => self.publish(WireMessage::AskLeaderForState),
            Effect::Republish => self.republish(),
            Effect::ApplyRemote => {
                if let Some(value) = received {
                    self.set_val(value, false);
                }
            }
            Effect::None => {}
        }
    }

    /// Replaces the in-memory value from storage without writing back.
    fn rehydrate(&self) -> SyncResult<()> {
        self.write_state(|state| {
            let value = hydrate(
                &self.inner.backend,
                &self.inner.key,
                &self.inner.initial,
                &self.inner.name,
            )?;
            state.value = value.clone();
            state.originated_locally = false;
            self.inner.value_tx.send_replace(value);
            Ok(())
        })
    }

    fn read_state<T>(&self, f: impl FnOnce(&StoreState<V>) -> T) -> T {
        match self.inner.state.read() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write_state<T>(&self, f: impl FnOnce(&mut StoreState<V>) -> T) -> T {
        match self.inner.state.write() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn log_protocol(&self, message: &str) {
        if self.inner.verbose {
            info!(channel = %self.inner.name, "{}", message);
        } else {
            debug!(channel = %self.inner.name, "{}", message);
        }
    }

    fn log_dropped(&self, reason: &SyncError) {
        if self.inner.verbose {
            warn!(channel = %self.inner.name, error = %reason, "Dropped malformed message");
        } else {
            debug!(channel = %self.inner.name, error = %reason, "Dropped malformed message");
        }
    }

    // =========================================================================
    // Inbound Messages
    // =========================================================================

    fn handle_data(&self, payload: Value, echo: &EchoGuardHandle) {
        let msg = match WireMessage::decode(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                self.log_dropped(&SyncError::from(e));
                echo.request_clear();
                return;
            }
        };

        if self.inner.verbose {
            info!(
                channel = %self.inner.name,
                message = msg.type_name(),
                leader = self.is_leader(),
                "New message"
            );
        }

        match msg {
            WireMessage::AskLeaderForState => {
                let effect = self.on_event(ChannelEvent::PeerQuery);
                self.perform(effect, None);
            }
            WireMessage::EchoClear => {
                self.on_event(ChannelEvent::EchoClear);
            }
            WireMessage::State { num } => {
                match extract_value::<V>(&num) {
                    Ok(value) => {
                        let effect = self.on_event(ChannelEvent::PeerReply);
                        self.perform(effect, Some(value));
                    }
                    Err(e) => self.log_dropped(&SyncError::from(e)),
                }
                echo.request_clear();
            }
        }
    }
}

impl SynchronizedStore<i64> {
    /// Adds one, saturating at `i64::MAX`.
    pub fn increment(&self) {
        self.update(|v| v.saturating_add(1));
    }

    /// Subtracts one, saturating at `i64::MIN`.
    pub fn decrement(&self) {
        self.update(|v| v.saturating_sub(1));
    }
}

/// Loads a channel value; absent means no entry, malformed means initial.
fn hydrate<V: StoreValue>(
    backend: &PersistenceBackend,
    key: &str,
    initial: &V,
    channel: &str,
) -> SyncResult<V> {
    match backend.read(key)? {
        None => Ok(initial.clone()),
        Some(text) => match extract_value::<V>(&text) {
            Ok(value) => {
                debug!(channel, "Hydrated from storage");
                Ok(value)
            }
            Err(e) => {
                warn!(channel, error = %e, "Malformed persisted record, using initial value");
                Ok(initial.clone())
            }
        },
    }
}

// =============================================================================
// Collaborator Surface
// =============================================================================

/// Read side handed to the UI layer.
pub struct StoreReader<V> {
    store: SynchronizedStore<V>,
    rx: watch::Receiver<V>,
}

impl<V: StoreValue> StoreReader<V> {
    pub fn get(&self) -> V {
        self.store.get()
    }

    /// Waits for the next value change and returns it.
    pub async fn changed(&mut self) -> SyncResult<V> {
        self.rx.changed().await.map_err(|_| SyncError::ShuttingDown)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

impl<V> Clone for StoreReader<V> {
    fn clone(&self) -> Self {
        StoreReader {
            store: self.store.clone(),
            rx: self.rx.clone(),
        }
    }
}

/// Write side handed to the UI layer.
pub struct StoreWriter<V> {
    store: SynchronizedStore<V>,
}

impl<V: StoreValue> StoreWriter<V> {
    pub fn set_val(&self, update: impl Into<Update<V>>, do_post: bool) {
        self.store.set_val(update, do_post);
    }

    pub fn reset(&self) {
        self.store.reset();
    }

    pub fn mutate(&self, name: &str) -> SyncResult<()> {
        self.store.mutate(name)
    }

    pub fn mutators(&self) -> Vec<String> {
        self.store.mutators()
    }
}

impl<V> Clone for StoreWriter<V> {
    fn clone(&self) -> Self {
        StoreWriter {
            store: self.store.clone(),
        }
    }
}

// =============================================================================
// Driver Task
// =============================================================================

/// Bus-side resources of a synchronized channel.
struct Link {
    subscription: Subscription,
    echo: EchoGuardHandle,
    election: ElectionHandle,
    leader_rx: watch::Receiver<LeaderState>,
    /// Last election state seen, for edge detection.
    last: LeaderState,
    election_alive: bool,
}

/// Owns a store's inbound traffic, election and lifecycle.
struct Driver<V> {
    store: SynchronizedStore<V>,
    scope: ContextScope,
    terminate_rx: watch::Receiver<bool>,
    reload_rx: watch::Receiver<u64>,
}

impl<V: StoreValue> Driver<V> {
    async fn run(self, link: Option<Link>) {
        match link {
            Some(link) => self.run_synced(link).await,
            None => self.run_standalone().await,
        }
    }

    async fn run_standalone(mut self) {
        loop {
            tokio::select! {
                _ = self.terminate_rx.changed() => break,
                changed = self.reload_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Err(e) = self.store.rehydrate() {
                        warn!(channel = %self.store.name(), error = %e, "Reload failed");
                    }
                }
            }
        }
        debug!(channel = %self.store.name(), "Store driver stopped");
    }

    async fn run_synced(mut self, mut link: Link) {
        loop {
            tokio::select! {
                _ = self.terminate_rx.changed() => break,
                changed = self.reload_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Err(e) = self.reload(&mut link).await {
                        warn!(channel = %self.store.name(), error = %e, "Reload failed");
                    }
                }
                frame = link.subscription.recv() => {
                    match frame {
                        Some(Frame::Data(payload)) => self.store.handle_data(payload, &link.echo),
                        Some(Frame::Leader(_)) => {}
                        None => break,
                    }
                }
                changed = link.leader_rx.changed(), if link.election_alive => {
                    match changed {
                        Ok(()) => {
                            let current = link.leader_rx.borrow_and_update().clone();
                            self.on_leader_change(&link.last, &current);
                            link.last = current;
                        }
                        Err(_) => link.election_alive = false,
                    }
                }
            }
        }

        if let Err(e) = link.election.shutdown().await {
            debug!(channel = %self.store.name(), error = %e, "Election already stopped");
        }
        self.store.on_event(ChannelEvent::Terminated);
        info!(channel = %self.store.name(), "Channel closed");
    }

    /// Maps election edges onto channel events.
    fn on_leader_change(&self, before: &LeaderState, after: &LeaderState) {
        if !before.is_leader && after.is_leader {
            self.store.log_protocol("This context is the leader now");
            self.store.on_event(ChannelEvent::BecameLeader);
        } else if before.is_leader && !after.is_leader {
            self.store.log_protocol("Stepped down as leader");
            self.store.on_event(ChannelEvent::SteppedDown);
        }

        if !after.is_leader && after.leader.is_some() && after.leader != before.leader {
            let effect = self.store.on_event(ChannelEvent::LeaderChanged);
            if effect == Effect::AskLeader {
                self.store.log_protocol("Leader changed while awaiting, asking again");
            }
            self.store.perform(effect, None);
        }
    }

    /// Resigns, re-hydrates from the (new) active area, and rejoins.
    async fn reload(&mut self, link: &mut Link) -> SyncResult<()> {
        info!(channel = %self.store.name(), "Reloading channel");

        if let Err(e) = link.election.shutdown().await {
            debug!(channel = %self.store.name(), error = %e, "Election already stopped");
        }
        self.store.on_event(ChannelEvent::Terminated);
        self.store.rehydrate()?;

        let (election, leader_rx, joined) = self.store.join(&self.scope).await?;
        link.election = election;
        link.leader_rx = leader_rx;
        link.last = joined;
        link.election_alive = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_config() {
        let config = ChannelConfig::counter("counter");
        assert_eq!(config.name(), "counter");
        assert_eq!(*config.initial(), 0);
        assert!(config.is_sync_enabled());

        let names: Vec<_> = config.mutators.keys().cloned().collect();
        assert_eq!(names, vec!["decrement".to_string(), "increment".to_string()]);
        let increment = &config.mutators["increment"];
        assert_eq!(increment(&41), 42);
    }

    #[test]
    fn test_builder() {
        let config = ChannelConfig::new("phrases", vec!["Press Generate".to_string()])
            .sync(false)
            .verbose(true)
            .mutator("clear", |_: &Vec<String>| Vec::new());
        assert!(!config.is_sync_enabled());
        assert!(config.verbose);
        assert!(format!("{:?}", config).contains("clear"));
    }

    #[test]
    fn test_counter_saturates() {
        let config = ChannelConfig::counter("counter");
        assert_eq!(config.mutators["increment"](&i64::MAX), i64::MAX);
        assert_eq!(config.mutators["decrement"](&i64::MIN), i64::MIN);
    }

    #[test]
    fn test_update_apply() {
        assert_eq!(Update::from(5).apply(&1), 5);
        assert_eq!(Update::with(|v: &i64| v * 10).apply(&3), 30);
    }
}
