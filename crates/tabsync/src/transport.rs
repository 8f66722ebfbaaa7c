//! # Channel Transport
//!
//! Publish/subscribe scoped by channel name over the origin's broadcast bus.
//!
//! ## Delivery Guarantees
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Channel Transport                               │
//! │                                                                         │
//! │   Context A ──publish──►  ┌──────────────────────┐  ──► Context B      │
//! │                           │  bus["counter"]      │  ──► Context C      │
//! │   (never back to A)       │  broadcast::channel  │                      │
//! │                           └──────────────────────┘                      │
//! │                                                                         │
//! │  • At least once to every other subscriber                             │
//! │  • Never to the publisher (sender id filtered on receive)              │
//! │  • FIFO per channel                                                    │
//! │  • Lossy: a lagging subscriber skips messages and keeps going          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Mode Resolution
//! ```text
//!   requested     origin offers          resolved
//!   ─────────     ──────────────         ────────
//!   auto          native                 Native
//!   auto          indexed only           Indexed ─┐
//!   indexed       indexed                Indexed ─┤ indexed_fallback
//!   *             nothing                SharedStorage ◄┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use tabsync_core::backend::channel_mirror_key;
use tabsync_core::{ContextId, Frame};

use crate::config::{TransportMode, TransportSettings};
use crate::storage::StorageArea;

/// Per-channel bus capacity before slow subscribers start lagging.
pub const BUS_CAPACITY: usize = 256;

// =============================================================================
// Envelope
// =============================================================================

/// A frame plus the context that sent it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: ContextId,
    pub frame: Frame,
}

// =============================================================================
// Origin Capabilities
// =============================================================================

/// Delivery mechanisms the origin environment offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginCapabilities {
    pub native_broadcast: bool,
    pub indexed_storage: bool,
}

impl Default for OriginCapabilities {
    fn default() -> Self {
        OriginCapabilities {
            native_broadcast: true,
            indexed_storage: true,
        }
    }
}

impl OriginCapabilities {
    /// An origin with only storage events to broadcast through.
    pub fn storage_only() -> Self {
        OriginCapabilities {
            native_broadcast: false,
            indexed_storage: false,
        }
    }
}

// =============================================================================
// Delivery Mode
// =============================================================================

/// How a channel's bus is realised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Native,
    Indexed,
    SharedStorage,
}

impl DeliveryMode {
    /// Picks the delivery mode for a requested transport mode.
    pub fn resolve(
        requested: TransportMode,
        caps: OriginCapabilities,
        indexed_fallback: bool,
    ) -> DeliveryMode {
        let picked = match requested {
            TransportMode::Native if caps.native_broadcast => DeliveryMode::Native,
            TransportMode::Auto if caps.native_broadcast => DeliveryMode::Native,
            TransportMode::Native | TransportMode::Auto | TransportMode::Indexed
                if caps.indexed_storage =>
            {
                DeliveryMode::Indexed
            }
            _ => DeliveryMode::SharedStorage,
        };

        if picked == DeliveryMode::Indexed && indexed_fallback {
            DeliveryMode::SharedStorage
        } else {
            picked
        }
    }

    /// Native delivery never echoes, so it needs no acknowledgements.
    pub fn needs_echo_clear(&self) -> bool {
        !matches!(self, DeliveryMode::Native)
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Native => write!(f, "native"),
            DeliveryMode::Indexed => write!(f, "indexed"),
            DeliveryMode::SharedStorage => write!(f, "shared_storage"),
        }
    }
}

// =============================================================================
// Broadcast Bus
// =============================================================================

/// The origin-wide bus: one broadcast channel per channel name.
#[derive(Clone, Debug)]
pub struct BroadcastBus {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Envelope>>>>,
    capabilities: OriginCapabilities,
}

impl BroadcastBus {
    pub fn new(capabilities: OriginCapabilities) -> Self {
        BroadcastBus {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capabilities,
        }
    }

    pub fn capabilities(&self) -> OriginCapabilities {
        self.capabilities
    }

    /// Get or create the broadcast channel for a channel name.
    async fn get_or_create(&self, name: &str) -> broadcast::Sender<Envelope> {
        let mut channels = self.channels.write().await;
        channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(BUS_CAPACITY).0)
            .clone()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(OriginCapabilities::default())
    }
}

// =============================================================================
// Transport
// =============================================================================

/// One context's endpoint on one channel.
#[derive(Clone)]
pub struct Transport {
    channel: String,
    id: ContextId,
    mode: DeliveryMode,
    sender: broadcast::Sender<Envelope>,
    /// Shared area and key the last message is mirrored into.
    mirror: Option<(Arc<dyn StorageArea>, String)>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Transport {
    /// Opens the endpoint, resolving the delivery mode.
    pub async fn open(
        bus: &BroadcastBus,
        channel: &str,
        id: ContextId,
        settings: &TransportSettings,
        key_prefix: &str,
        shared: Arc<dyn StorageArea>,
    ) -> Self {
        let caps = bus.capabilities();
        let unfallen = DeliveryMode::resolve(settings.mode, caps, false);
        let mode = DeliveryMode::resolve(settings.mode, caps, settings.indexed_fallback);

        if unfallen != mode {
            info!(channel, from = %unfallen, to = %mode, "Indexed bus replaced by shared-storage bus");
        }
        if settings.mode == TransportMode::Native && mode != DeliveryMode::Native {
            warn!(channel, resolved = %mode, "Native broadcast unavailable in this origin");
        }

        let mirror = match mode {
            DeliveryMode::SharedStorage => Some((shared, channel_mirror_key(key_prefix, channel))),
            _ => None,
        };

        info!(channel, context = %id, mode = %mode, "Broadcast channel initialized");

        Transport {
            channel: channel.to_string(),
            id,
            mode,
            sender: bus.get_or_create(channel).await,
            mirror,
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publishes a frame to every other subscriber of the channel.
    ///
    /// Delivery is best effort: a bus with no other listeners drops it.
    pub fn publish(&self, frame: Frame) {
        if let Some((area, key)) = &self.mirror {
            match frame.to_json() {
                Ok(text) => {
                    if let Err(e) = area.set_item(key, &text) {
                        warn!(channel = %self.channel, error = %e, "Failed to mirror message");
                    }
                }
                Err(e) => warn!(channel = %self.channel, error = %e, "Failed to encode mirror"),
            }
        }

        let kind = frame.kind();
        let envelope = Envelope {
            sender: self.id,
            frame,
        };
        match self.sender.send(envelope) {
            Ok(receivers) => debug!(channel = %self.channel, kind, receivers, "Published frame"),
            Err(_) => debug!(channel = %self.channel, kind, "Published frame with no listeners"),
        }
    }

    /// Subscribes to frames from other contexts.
    ///
    /// Frames published before this call are not delivered.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            channel: self.channel.clone(),
            id: self.id,
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving side of a [`Transport`].
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    id: ContextId,
    receiver: broadcast::Receiver<Envelope>,
}

impl Subscription {
    /// Waits for the next frame sent by another context.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => {
                    // Skip our own messages
                    if envelope.sender == self.id {
                        continue;
                    }
                    return Some(envelope.frame);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(channel = %self.channel, lagged = n, "Subscriber lagged, messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
