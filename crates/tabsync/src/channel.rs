//! # Channel State Machine
//!
//! The per-channel role and join state, driven by discrete events.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Channel State Machine                              │
//! │                                                                         │
//! │                  Joined { leader_found: false }                        │
//! │  ┌───────────────┐ ─────────────────────────────▶ ┌──────────┐         │
//! │  │ UNINITIALIZED │                                │  LEADER  │         │
//! │  └───────┬───────┘                                └────▲─────┘         │
//! │          │ Joined { leader_found: true }               │ BecameLeader  │
//! │          │ ──► AskLeader                               │               │
//! │          ▼                                             │               │
//! │  ┌──────────────────────┐   PeerReply    ┌─────────────┴──────┐        │
//! │  │ FOLLOWER (awaiting)  │ ─────────────▶ │ FOLLOWER (steady)  │        │
//! │  └──────────────────────┘                └────────────────────┘        │
//! │                                                                         │
//! │  While awaiting, local writes are stored but never broadcast.          │
//! │  Promotion does not clear `awaiting`; only an inbound value does.      │
//! │  Terminated returns any state to UNINITIALIZED.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::debug;

/// Role of a context on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Not joined yet, or closed.
    #[default]
    Uninitialized,
    Leader,
    Follower,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Uninitialized => write!(f, "uninitialized"),
            Role::Leader => write!(f, "leader"),
            Role::Follower => write!(f, "follower"),
        }
    }
}

/// Events that drive the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The join campaign finished.
    Joined { leader_found: bool },
    /// A peer asked the leader for the current value.
    PeerQuery,
    /// A peer sent a well-formed value.
    PeerReply,
    /// A peer acknowledged processing.
    EchoClear,
    /// The election promoted this context.
    BecameLeader,
    /// A stronger leader took over.
    SteppedDown,
    /// A different context now leads.
    LeaderChanged,
    /// The channel is closing or restarting.
    Terminated,
}

/// What the store must do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Send `ask_leader_for_state`.
    AskLeader,
    /// Re-broadcast the current value.
    Republish,
    /// Apply the received value as a network-originated write.
    ApplyRemote,
    None,
}

/// Election view of the store: role plus join state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElectionState {
    pub role: Role,
    pub awaiting_initial_state: bool,
}

impl ElectionState {
    /// State of a channel that does not synchronize: its own authority.
    pub fn standalone() -> Self {
        ElectionState {
            role: Role::Leader,
            awaiting_initial_state: false,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    /// Joined and no longer waiting for the leader's value.
    pub fn is_steady(&self) -> bool {
        self.role != Role::Uninitialized && !self.awaiting_initial_state
    }

    /// Whether a write with `do_post` may be broadcast.
    pub fn should_broadcast(&self, do_post: bool, sync_enabled: bool) -> bool {
        do_post && sync_enabled && self.is_steady()
    }

    /// Applies an event and returns the effect to perform.
    pub fn on_event(&mut self, event: ChannelEvent) -> Effect {
        let before = *self;
        let effect = self.transition(event);
        if *self != before {
            debug!(
                ?event,
                from = %before.role,
                to = %self.role,
                awaiting = self.awaiting_initial_state,
                "Channel state changed"
            );
        }
        effect
    }

    fn transition(&mut self, event: ChannelEvent) -> Effect {
        match (self.role, event) {
            (Role::Uninitialized, ChannelEvent::Joined { leader_found: true }) => {
                self.role = Role::Follower;
                self.awaiting_initial_state = true;
                Effect::AskLeader
            }
            (Role::Uninitialized, ChannelEvent::Joined { leader_found: false }) => {
                self.role = Role::Leader;
                self.awaiting_initial_state = false;
                Effect::None
            }
            // Before joining, nothing else applies
            (Role::Uninitialized, _) => Effect::None,

            (_, ChannelEvent::Joined { .. }) => Effect::None,

            (Role::Leader, ChannelEvent::PeerQuery) => Effect::Republish,
            (Role::Follower, ChannelEvent::PeerQuery) => Effect::None,

            (_, ChannelEvent::PeerReply) => {
                self.awaiting_initial_state = false;
                Effect::ApplyRemote
            }

            (_, ChannelEvent::EchoClear) => Effect::None,

            (_, ChannelEvent::BecameLeader) => {
                self.role = Role::Leader;
                Effect::None
            }

            (_, ChannelEvent::SteppedDown) => {
                self.role = Role::Follower;
                Effect::None
            }

            (Role::Follower, ChannelEvent::LeaderChanged) if self.awaiting_initial_state => {
                Effect::AskLeader
            }
            (_, ChannelEvent::LeaderChanged) => Effect::None,

            (_, ChannelEvent::Terminated) => {
                *self = ElectionState::default();
                Effect::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_without_leader() {
        let mut state = ElectionState::default();
        assert!(!state.should_broadcast(true, true));

        assert_eq!(state.on_event(ChannelEvent::Joined { leader_found: false }), Effect::None);
        assert!(state.is_leader());
        assert!(state.is_steady());
        assert!(state.should_broadcast(true, true));
        assert!(!state.should_broadcast(false, true));
        assert!(!state.should_broadcast(true, false));
    }

    #[test]
    fn test_join_with_leader_awaits_reply() {
        let mut state = ElectionState::default();
        assert_eq!(
            state.on_event(ChannelEvent::Joined { leader_found: true }),
            Effect::AskLeader
        );
        assert_eq!(state.role, Role::Follower);
        assert!(state.awaiting_initial_state);
        assert!(!state.should_broadcast(true, true));

        // Queries are for the leader only
        assert_eq!(state.on_event(ChannelEvent::PeerQuery), Effect::None);
        assert_eq!(state.on_event(ChannelEvent::EchoClear), Effect::None);

        assert_eq!(state.on_event(ChannelEvent::PeerReply), Effect::ApplyRemote);
        assert!(state.is_steady());
        assert!(state.should_broadcast(true, true));
    }

    #[test]
    fn test_leader_change_while_awaiting_asks_again() {
        let mut state = ElectionState::default();
        state.on_event(ChannelEvent::Joined { leader_found: true });
        assert_eq!(state.on_event(ChannelEvent::LeaderChanged), Effect::AskLeader);

        state.on_event(ChannelEvent::PeerReply);
        assert_eq!(state.on_event(ChannelEvent::LeaderChanged), Effect::None);
    }

    #[test]
    fn test_promotion_keeps_awaiting() {
        let mut state = ElectionState::default();
        state.on_event(ChannelEvent::Joined { leader_found: true });
        state.on_event(ChannelEvent::BecameLeader);
        assert!(state.is_leader());
        assert!(state.awaiting_initial_state);
        assert_eq!(state.on_event(ChannelEvent::PeerQuery), Effect::Republish);

        state.on_event(ChannelEvent::SteppedDown);
        assert_eq!(state.role, Role::Follower);
    }

    #[test]
    fn test_terminated_resets() {
        let mut state = ElectionState::default();
        state.on_event(ChannelEvent::Joined { leader_found: false });
        state.on_event(ChannelEvent::Terminated);
        assert_eq!(state, ElectionState::default());
        assert_eq!(state.on_event(ChannelEvent::PeerReply), Effect::None);
        assert_eq!(state.on_event(ChannelEvent::PeerQuery), Effect::None);
    }

    #[test]
    fn test_duplicate_join_ignored() {
        let mut state = ElectionState::default();
        state.on_event(ChannelEvent::Joined { leader_found: false });
        assert_eq!(
            state.on_event(ChannelEvent::Joined { leader_found: true }),
            Effect::None
        );
        assert!(state.is_leader());
    }

    #[test]
    fn test_standalone() {
        let state = ElectionState::standalone();
        assert!(state.is_leader());
        assert!(state.should_broadcast(true, true));
        assert!(!state.should_broadcast(true, false));
    }
}
