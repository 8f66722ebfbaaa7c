//! # Leader Election Module
//!
//! Presence-based leader election per channel, over the channel's own
//! transport.
//!
//! ## Election Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Leader Election Protocol                             │
//! │                                                                         │
//! │  ELECTION TRIGGER CONDITIONS:                                          │
//! │  ────────────────────────────                                          │
//! │  1. Context opens the channel (join)                                   │
//! │  2. Leader heartbeat silent for heartbeat_timeout (3 seconds)          │
//! │  3. Leader sends `death` because its context closed                    │
//! │                                                                         │
//! │  CAMPAIGN:                                                             │
//! │  ─────────                                                             │
//! │  1. Send apply { token }                                               │
//! │  2. Wait election timeout (1 second)                                   │
//! │     • tell from anyone          ──► follower (leader exists)           │
//! │     • apply from higher token   ──► follower (defer to stronger)       │
//! │  3. Nobody objected             ──► leader, send tell                  │
//! │                                                                         │
//! │  DUTIES:                                                               │
//! │  ───────                                                               │
//! │  LEADER:   answer apply with tell, tell every heartbeat_interval       │
//! │  FOLLOWER: track last tell, campaign on death or silence               │
//! │                                                                         │
//! │  DUPLICATE LEADERS:                                                    │
//! │  ──────────────────                                                    │
//! │  tell from higher token ──► step down                                  │
//! │  tell from lower token  ──► reassert with tell                         │
//! │                                                                         │
//! │  STATE TRANSITIONS:                                                    │
//! │  ───────────────────                                                   │
//! │                                                                         │
//! │  ┌────────────┐     leader silent/dead    ┌─────────────┐              │
//! │  │  FOLLOWER  │ ──────────────────────▶  │  CANDIDATE  │              │
//! │  └─────▲──────┘                          └──────┬──────┘              │
//! │        │                                        │  no objection        │
//! │        │  tell from higher token                ▼                       │
//! │        │                                 ┌─────────────┐                │
//! │        └─────────────────────────────────│   LEADER    │                │
//! │                                          └─────────────┘                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tabsync_core::{ContextId, Frame, LeaderAction, LeaderMessage};

use crate::config::ElectionSettings;
use crate::error::{SyncError, SyncResult};
use crate::transport::{Subscription, Transport};

// =============================================================================
// Join Outcome
// =============================================================================

/// How the first campaign of a context ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Nobody objected: this context leads.
    Elected,
    /// A leader, or a stronger candidate, was already present.
    Follower,
}

impl std::fmt::Display for JoinOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinOutcome::Elected => write!(f, "elected"),
            JoinOutcome::Follower => write!(f, "follower"),
        }
    }
}

// =============================================================================
// Leader State
// =============================================================================

/// Election view of one context on one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderState {
    /// Set once the join campaign finished.
    pub joined: Option<JoinOutcome>,
    pub is_leader: bool,
    /// Last known leader token (our own when leading).
    pub leader: Option<ContextId>,
}

// =============================================================================
// Election Configuration
// =============================================================================

/// Timing of the election service.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    pub timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        ElectionConfig::from(&ElectionSettings::default())
    }
}

impl From<&ElectionSettings> for ElectionConfig {
    fn from(settings: &ElectionSettings) -> Self {
        ElectionConfig {
            timeout: settings.timeout(),
            heartbeat_interval: settings.heartbeat_interval(),
            heartbeat_timeout: settings.heartbeat_timeout(),
        }
    }
}

// =============================================================================
// Election Service
// =============================================================================

/// Runs the election of one context on one channel.
pub struct ElectionService {
    id: ContextId,
    transport: Transport,
    subscription: Subscription,
    config: ElectionConfig,
    state: Arc<RwLock<LeaderState>>,
    state_tx: watch::Sender<LeaderState>,
    /// When the leader was last heard from.
    last_tell: Instant,
}

/// Handle for interacting with the election service.
#[derive(Clone)]
pub struct ElectionHandle {
    state: Arc<RwLock<LeaderState>>,
    state_rx: watch::Receiver<LeaderState>,
    cmd_tx: mpsc::Sender<ElectionCommand>,
}

/// Commands that can be sent to the election service.
#[derive(Debug)]
pub enum ElectionCommand {
    /// Stop participating; a leader announces its death first.
    Shutdown { ack: oneshot::Sender<()> },
}

/// Outcome of a single campaign.
enum Campaign {
    Won,
    LeaderFound(ContextId),
    Deferred(ContextId),
    Stopped,
}

/// Waits on `rx` until the join campaign finished, returning that state.
pub async fn wait_joined(rx: &mut watch::Receiver<LeaderState>) -> SyncResult<LeaderState> {
    loop {
        {
            let state = rx.borrow_and_update();
            if state.joined.is_some() {
                return Ok(state.clone());
            }
        }
        rx.changed().await.map_err(|_| SyncError::ShuttingDown)?;
    }
}

impl ElectionHandle {
    /// Returns the current election state.
    pub async fn state(&self) -> LeaderState {
        self.state.read().await.clone()
    }

    pub async fn is_leader(&self) -> bool {
        self.state.read().await.is_leader
    }

    /// Waits for the join campaign and returns its outcome.
    pub async fn wait_joined(&self) -> SyncResult<JoinOutcome> {
        let mut rx = self.state_rx.clone();
        let state = wait_joined(&mut rx).await?;
        state.joined.ok_or(SyncError::ShuttingDown)
    }

    /// Whether some context, this one included, currently leads the channel.
    ///
    /// Waits for the join campaign first. While a failover campaign runs
    /// there is no leader.
    pub async fn has_leader(&self) -> SyncResult<bool> {
        self.wait_joined().await?;
        Ok(self.state.read().await.leader.is_some())
    }

    /// Resolves once this context leads the channel.
    pub async fn await_leadership(&self) -> SyncResult<()> {
        let mut rx = self.state_rx.clone();
        loop {
            if rx.borrow_and_update().is_leader {
                return Ok(());
            }
            rx.changed().await.map_err(|_| SyncError::ShuttingDown)?;
        }
    }

    /// Runs `callback` once, when this context first becomes leader.
    pub fn on_become_leader<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            if handle.await_leadership().await.is_ok() {
                callback();
            }
        });
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<LeaderState> {
        self.state_rx.clone()
    }

    /// Stops the service, waiting until a leader has announced its death.
    pub async fn shutdown(&self) -> SyncResult<()> {
        let (ack, done) = oneshot::channel();
        if self.cmd_tx.send(ElectionCommand::Shutdown { ack }).await.is_err() {
            // Already stopped
            return Ok(());
        }
        done.await
            .map_err(|_| SyncError::ChannelError("Election service dropped shutdown ack".into()))
    }
}

impl ElectionService {
    /// Creates the service. Subscribes to the transport immediately so no
    /// reply to our first `apply` can be missed.
    pub fn new(id: ContextId, transport: Transport, config: ElectionConfig) -> Self {
        let (state_tx, _) = watch::channel(LeaderState::default());
        let subscription = transport.subscribe();

        ElectionService {
            id,
            transport,
            subscription,
            config,
            state: Arc::new(RwLock::new(LeaderState::default())),
            state_tx,
            last_tell: Instant::now(),
        }
    }

    /// Starts the election service and returns a handle.
    pub fn start(self) -> ElectionHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let state_rx = self.state_tx.subscribe();

        let handle = ElectionHandle {
            state: self.state.clone(),
            state_rx,
            cmd_tx,
        };

        tokio::spawn(async move {
            self.run(cmd_rx).await;
        });

        handle
    }

    /// Main election loop.
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<ElectionCommand>) {
        let channel = self.transport.channel().to_string();
        info!(channel = %channel, context = %self.id, "Election service started");

        let outcome = match self.campaign(&mut cmd_rx).await {
            Campaign::Stopped => return,
            Campaign::Won => JoinOutcome::Elected,
            Campaign::LeaderFound(leader) => {
                debug!(channel = %channel, leader = %leader, "Existing leader answered");
                JoinOutcome::Follower
            }
            Campaign::Deferred(candidate) => {
                debug!(channel = %channel, candidate = %candidate, "Stronger candidate campaigning");
                JoinOutcome::Follower
            }
        };
        self.update(|s| s.joined = Some(outcome)).await;
        info!(channel = %channel, outcome = %outcome, "Joined channel election");

        let start = Instant::now() + self.config.heartbeat_interval;
        let mut heartbeat = interval_at(start, self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ElectionCommand::Shutdown { ack }) => {
                            self.resign().await;
                            let _ = ack.send(());
                            break;
                        }
                        None => {
                            self.resign().await;
                            break;
                        }
                    }
                }
                frame = self.subscription.recv() => {
                    match frame {
                        Some(Frame::Leader(msg)) => {
                            if !self.handle_message(msg, &mut cmd_rx).await {
                                break;
                            }
                        }
                        Some(Frame::Data(_)) => {}
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if !self.on_heartbeat(&mut cmd_rx).await {
                        break;
                    }
                }
            }
        }

        info!(channel = %channel, context = %self.id, "Election service stopped");
    }

    /// Handles one leader frame. Returns false when the service must stop.
    async fn handle_message(
        &mut self,
        msg: LeaderMessage,
        cmd_rx: &mut mpsc::Receiver<ElectionCommand>,
    ) -> bool {
        let is_leader = self.state.read().await.is_leader;

        match msg.action {
            LeaderAction::Apply => {
                if is_leader {
                    debug!(candidate = %msg.token, "Answering apply");
                    self.tell();
                }
            }
            LeaderAction::Tell => {
                if is_leader {
                    if msg.token > self.id {
                        warn!(
                            new_leader = %msg.token,
                            "Duplicate leader with higher token - stepping down"
                        );
                        self.follow(msg.token).await;
                    } else {
                        debug!(other = %msg.token, "Duplicate leader with lower token - reasserting");
                        self.tell();
                    }
                } else {
                    self.follow(msg.token).await;
                }
            }
            LeaderAction::Death => {
                let leader = self.state.read().await.leader;
                if !is_leader && leader == Some(msg.token) {
                    info!(leader = %msg.token, "Leader terminated - campaigning");
                    self.update(|s| s.leader = None).await;
                    return self.recampaign(cmd_rx).await;
                }
            }
        }
        true
    }

    /// Heartbeat tick. Returns false when the service must stop.
    async fn on_heartbeat(&mut self, cmd_rx: &mut mpsc::Receiver<ElectionCommand>) -> bool {
        if self.state.read().await.is_leader {
            self.tell();
            return true;
        }

        if self.last_tell.elapsed() > self.config.heartbeat_timeout {
            warn!(
                channel = %self.transport.channel(),
                silent_ms = self.last_tell.elapsed().as_millis() as u64,
                "Leader heartbeat timeout - campaigning"
            );
            self.update(|s| s.leader = None).await;
            return self.recampaign(cmd_rx).await;
        }
        true
    }

    async fn recampaign(&mut self, cmd_rx: &mut mpsc::Receiver<ElectionCommand>) -> bool {
        !matches!(self.campaign(cmd_rx).await, Campaign::Stopped)
    }

    /// Sends `apply` and waits out the election timeout for objections.
    async fn campaign(&mut self, cmd_rx: &mut mpsc::Receiver<ElectionCommand>) -> Campaign {
        debug!(channel = %self.transport.channel(), token = %self.id, "Campaigning");
        self.transport.publish(Frame::leader(LeaderAction::Apply, self.id));
        let deadline = Instant::now() + self.config.timeout;

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    self.become_leader().await;
                    return Campaign::Won;
                }
                cmd = cmd_rx.recv() => {
                    if let Some(ElectionCommand::Shutdown { ack }) = cmd {
                        let _ = ack.send(());
                    }
                    return Campaign::Stopped;
                }
                frame = self.subscription.recv() => {
                    match frame {
                        Some(Frame::Leader(msg)) => match msg.action {
                            LeaderAction::Tell => {
                                self.follow(msg.token).await;
                                return Campaign::LeaderFound(msg.token);
                            }
                            LeaderAction::Apply if msg.token > self.id => {
                                debug!(candidate = %msg.token, "Deferring to stronger candidate");
                                self.last_tell = Instant::now();
                                return Campaign::Deferred(msg.token);
                            }
                            _ => {}
                        },
                        Some(Frame::Data(_)) => {}
                        None => return Campaign::Stopped,
                    }
                }
            }
        }
    }

    fn tell(&self) {
        self.transport.publish(Frame::leader(LeaderAction::Tell, self.id));
    }

    async fn become_leader(&mut self) {
        let id = self.id;
        self.update(|s| {
            s.is_leader = true;
            s.leader = Some(id);
        })
        .await;
        info!(channel = %self.transport.channel(), context = %self.id, "Became leader");
        self.tell();
    }

    async fn follow(&mut self, leader: ContextId) {
        self.last_tell = Instant::now();
        self.update(|s| {
            s.is_leader = false;
            s.leader = Some(leader);
        })
        .await;
    }

    /// Leaves the election, announcing death when leading.
    async fn resign(&mut self) {
        if self.state.read().await.is_leader {
            info!(channel = %self.transport.channel(), "Leader resigning");
            self.transport.publish(Frame::leader(LeaderAction::Death, self.id));
        }
        self.update(|s| {
            s.is_leader = false;
            s.leader = None;
        })
        .await;
    }

    /// Applies a change and notifies watchers when something changed.
    async fn update(&self, apply: impl FnOnce(&mut LeaderState)) {
        let mut state = self.state.write().await;
        let before = state.clone();
        apply(&mut state);
        if *state != before {
            let _ = self.state_tx.send(state.clone());
        }
    }
}
