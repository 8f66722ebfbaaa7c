//! # Echo Guard
//!
//! Coalesces "message processed" acknowledgements on a channel.
//!
//! ```text
//!  request_clear()  ──┐   ┌── request_clear()      ┌── window elapses
//!                     ▼   ▼                        ▼
//!  time ──────────────●───●────────────────────────●──────────►
//!                     └── window restarts ──────────┘
//!                                               publish ""
//! ```
//!
//! Calls within the window restart it; one empty-string message is sent
//! once the window passes with no further calls. The guard stays inert on
//! a native bus, which cannot echo, and when `transport.secure` is off.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use tabsync_core::{Frame, WireMessage};

use crate::transport::Transport;

/// Commands for the guard task.
#[derive(Debug)]
enum GuardCommand {
    RequestClear,
}

/// Debounced echo-clear sender for one channel.
pub struct EchoGuard {
    transport: Transport,
    window: Duration,
}

/// Handle for requesting clears. Inert when the guard is disabled.
#[derive(Clone, Debug)]
pub struct EchoGuardHandle {
    cmd_tx: Option<mpsc::Sender<GuardCommand>>,
}

impl EchoGuardHandle {
    /// A handle that ignores every request.
    pub fn disabled() -> Self {
        EchoGuardHandle { cmd_tx: None }
    }

    pub fn is_active(&self) -> bool {
        self.cmd_tx.is_some()
    }

    /// Schedules an acknowledgement, restarting the coalesce window.
    pub fn request_clear(&self) {
        let Some(tx) = &self.cmd_tx else {
            return;
        };
        match tx.try_send(GuardCommand::RequestClear) {
            Ok(()) => {}
            // Queued requests restart the window when drained, covering this one
            Err(TrySendError::Full(_)) => debug!("Echo clear queue full, request coalesced"),
            Err(TrySendError::Closed(_)) => debug!("Echo guard stopped, request dropped"),
        }
    }
}

impl EchoGuard {
    pub fn new(transport: Transport, window: Duration) -> Self {
        EchoGuard { transport, window }
    }

    /// Starts the guard, or returns an inert handle when it must not run.
    ///
    /// The task ends once every handle has been dropped.
    pub fn start(self, secure: bool) -> EchoGuardHandle {
        if !secure || !self.transport.mode().needs_echo_clear() {
            debug!(
                channel = %self.transport.channel(),
                mode = %self.transport.mode(),
                secure,
                "Echo guard disabled"
            );
            return EchoGuardHandle::disabled();
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        tokio::spawn(async move {
            self.run(cmd_rx).await;
        });

        EchoGuardHandle {
            cmd_tx: Some(cmd_tx),
        }
    }

    async fn run(self, mut cmd_rx: mpsc::Receiver<GuardCommand>) {
        info!(
            channel = %self.transport.channel(),
            window_ms = self.window.as_millis() as u64,
            "Echo guard started"
        );

        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(GuardCommand::RequestClear) => {
                            deadline = Some(Instant::now() + self.window);
                        }
                        None => break,
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    debug!(channel = %self.transport.channel(), "Sending echo clear");
                    self.transport.publish(Frame::data(&WireMessage::EchoClear));
                }
            }
        }

        debug!(channel = %self.transport.channel(), "Echo guard stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tabsync_core::ContextId;

    use crate::config::{TransportMode, TransportSettings};
    use crate::storage::MemoryArea;
    use crate::transport::{BroadcastBus, OriginCapabilities};

    async fn storage_transport(bus: &BroadcastBus) -> Transport {
        let settings = TransportSettings {
            mode: TransportMode::SharedStorage,
            ..TransportSettings::default()
        };
        Transport::open(
            bus,
            "counter",
            ContextId::new(),
            &settings,
            "tabsync-",
            Arc::new(MemoryArea::new("localStorage")),
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_coalesced() {
        let bus = BroadcastBus::new(OriginCapabilities::storage_only());
        let guard_side = storage_transport(&bus).await;
        let observer = storage_transport(&bus).await;
        let mut sub = observer.subscribe();

        let handle = EchoGuard::new(guard_side, Duration::from_millis(1000)).start(true);
        assert!(handle.is_active());

        handle.request_clear();
        tokio::time::sleep(Duration::from_millis(600)).await;
        handle.request_clear();
        tokio::time::sleep(Duration::from_millis(600)).await;
        handle.request_clear();

        // Nothing until the window passes quietly
        let early = tokio::time::timeout(Duration::from_millis(900), sub.recv()).await;
        assert!(early.is_err());

        let clear = tokio::time::timeout(Duration::from_millis(200), sub.recv()).await;
        assert_eq!(clear.unwrap(), Some(Frame::data(&WireMessage::EchoClear)));

        // Exactly one
        let extra = tokio::time::timeout(Duration::from_millis(5000), sub.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_beyond_queue_sends_one_clear() {
        let bus = BroadcastBus::new(OriginCapabilities::storage_only());
        let guard_side = storage_transport(&bus).await;
        let observer = storage_transport(&bus).await;
        let mut sub = observer.subscribe();

        let handle = EchoGuard::new(guard_side, Duration::from_millis(1000)).start(true);
        for _ in 0..500 {
            handle.request_clear();
        }

        let clear = tokio::time::timeout(Duration::from_millis(1100), sub.recv()).await;
        assert_eq!(clear.unwrap(), Some(Frame::data(&WireMessage::EchoClear)));
        let extra = tokio::time::timeout(Duration::from_millis(5000), sub.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_when_insecure_or_native() {
        let bus = BroadcastBus::new(OriginCapabilities::storage_only());
        let handle = EchoGuard::new(storage_transport(&bus).await, Duration::from_millis(10)).start(false);
        assert!(!handle.is_active());
        handle.request_clear();

        let native_bus = BroadcastBus::default();
        let native = Transport::open(
            &native_bus,
            "counter",
            ContextId::new(),
            &TransportSettings::default(),
            "tabsync-",
            Arc::new(MemoryArea::new("localStorage")),
        )
        .await;
        assert!(!EchoGuard::new(native, Duration::from_millis(10)).start(true).is_active());
    }
}
