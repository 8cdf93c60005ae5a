//! Link State Machine
//!
//! Defines the valid link state transitions and which of them end a
//! connection lifecycle.

use std::fmt;

/// State of the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
        }
    }
}

/// Events that can trigger link state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    /// A connect was requested
    ConnectRequested,
    /// The transport opened the stream
    Opened,
    /// The transport could not open the stream
    Failed,
    /// The open stream broke or reached end of stream
    Lost,
    /// Explicit close
    Closed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed, for a superseding connect)
    Success(LinkState),
    /// The lifecycle that started from `from` is over; state is now `Disconnected`.
    /// The owner must deliver exactly one disconnect notification.
    Ended { from: LinkState },
    /// Nothing to do (closing an already closed link)
    Unchanged,
    /// Transition was invalid from current state
    Invalid { from: LinkState, event: LinkTransition },
}

/// The single holder of truth for link state
#[derive(Debug, Default)]
pub struct LinkStateMachine {
    current_state: LinkState,
    connections: u64,
}

impl LinkStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> LinkState {
        self.current_state
    }

    /// Number of successful connections so far
    pub fn connections(&self) -> u64 {
        self.connections
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LinkTransition) -> TransitionResult {
        use LinkState::*;
        use LinkTransition::*;

        match (self.current_state, event) {
            // A pending attempt may be superseded; the lifecycle carries on
            (Disconnected | Connecting, ConnectRequested) => {
                self.current_state = Connecting;
                TransitionResult::Success(Connecting)
            }

            (Connecting, Opened) => {
                self.current_state = Connected;
                self.connections += 1;
                TransitionResult::Success(Connected)
            }

            (Connecting, Failed) | (Connected, Lost) | (Connecting | Connected, Closed) => {
                let from = self.current_state;
                self.current_state = Disconnected;
                TransitionResult::Ended { from }
            }

            (Disconnected, Closed) => TransitionResult::Unchanged,

            // Connected links must be closed before a new connect
            (from, event) => TransitionResult::Invalid { from, event },
        }
    }
}
