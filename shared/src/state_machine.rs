//! Session State Machine
//!
//! Defines the connection lifecycle of a device session and which
//! transitions are legal.

use std::fmt;

/// Connection lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Connect or link failure; recoverable by connecting again
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Caller asked to connect
    ConnectRequested,
    /// Transport is up (and authenticated, where applicable)
    Established,
    /// Transport could not be brought up
    ConnectFailed { reason: String },
    /// Transport failed after the session was established
    LinkLost { reason: String },
    /// Caller asked to disconnect
    DisconnectRequested,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid; carries the new state
    Success(SessionState),
    /// Transition was invalid from current state; state is unchanged
    Invalid { from: SessionState, event: SessionEvent },
}

impl TransitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success(_))
    }
}

/// The session lifecycle state machine
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    current_state: SessionState,
    last_failure: Option<String>,
}

impl SessionStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.current_state
    }

    /// Sends are only legal on an established session
    pub fn can_send(&self) -> bool {
        self.current_state == SessionState::Connected
    }

    /// Reason of the most recent connect or link failure
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: SessionEvent) -> TransitionResult {
        match self.get_next_state(&event) {
            Some(state) => {
                match &event {
                    SessionEvent::ConnectFailed { reason } | SessionEvent::LinkLost { reason } => {
                        self.last_failure = Some(reason.clone());
                    }
                    SessionEvent::Established | SessionEvent::DisconnectRequested => {
                        self.last_failure = None;
                    }
                    SessionEvent::ConnectRequested => {}
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self.current_state, event) {
            // Disconnect is accepted from anywhere and is idempotent
            (_, DisconnectRequested) => Some(Disconnected),

            (Disconnected | Failed, ConnectRequested) => Some(Connecting),

            (Connecting, Established) => Some(Connected),
            (Connecting, ConnectFailed { .. }) => Some(Failed),

            (Connected, LinkLost { .. }) => Some(Failed),

            _ => None,
        }
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;

    match (from, to) {
        (_, Disconnected) => true,
        (Disconnected | Failed, Connecting) => true,
        (Connecting, Connected | Failed) => true,
        (Connected, Failed) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(reason: &str) -> SessionEvent {
        SessionEvent::ConnectFailed {
            reason: reason.into(),
        }
    }

    #[test]
    fn test_initial_state() {
        let fsm = SessionStateMachine::new();
        assert_eq!(fsm.state(), SessionState::Disconnected);
        assert!(!fsm.can_send());
    }

    #[test]
    fn test_connect_flow() {
        let mut fsm = SessionStateMachine::new();

        let result = fsm.process_event(SessionEvent::ConnectRequested);
        assert_eq!(result, TransitionResult::Success(SessionState::Connecting));
        assert!(!fsm.can_send());

        let result = fsm.process_event(SessionEvent::Established);
        assert_eq!(result, TransitionResult::Success(SessionState::Connected));
        assert!(fsm.can_send());

        let result = fsm.process_event(SessionEvent::DisconnectRequested);
        assert_eq!(result, TransitionResult::Success(SessionState::Disconnected));
        assert!(!fsm.can_send());
    }

    #[test]
    fn test_failed_is_recoverable() {
        let mut fsm = SessionStateMachine::new();
        fsm.process_event(SessionEvent::ConnectRequested);
        fsm.process_event(failed("port busy"));
        assert_eq!(fsm.state(), SessionState::Failed);
        assert_eq!(fsm.last_failure(), Some("port busy"));

        assert!(fsm.process_event(SessionEvent::ConnectRequested).is_success());
        assert!(fsm.process_event(SessionEvent::Established).is_success());
        assert_eq!(fsm.state(), SessionState::Connected);
        assert_eq!(fsm.last_failure(), None);
    }

    #[test]
    fn test_link_lost_moves_to_failed() {
        let mut fsm = SessionStateMachine::new();
        fsm.process_event(SessionEvent::ConnectRequested);
        fsm.process_event(SessionEvent::Established);

        let result = fsm.process_event(SessionEvent::LinkLost {
            reason: "peer closed".into(),
        });
        assert_eq!(result, TransitionResult::Success(SessionState::Failed));
        assert!(!fsm.can_send());
    }

    #[test]
    fn test_disconnect_idempotent_from_any_state() {
        let mut fsm = SessionStateMachine::new();
        assert!(fsm.process_event(SessionEvent::DisconnectRequested).is_success());
        assert!(fsm.process_event(SessionEvent::DisconnectRequested).is_success());

        fsm.process_event(SessionEvent::ConnectRequested);
        assert!(fsm.process_event(SessionEvent::DisconnectRequested).is_success());
        assert_eq!(fsm.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_invalid_transition() {
        let mut fsm = SessionStateMachine::new();

        // Cannot be established without connecting first
        let result = fsm.process_event(SessionEvent::Established);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), SessionState::Disconnected);

        fsm.process_event(SessionEvent::ConnectRequested);
        fsm.process_event(SessionEvent::Established);
        let result = fsm.process_event(SessionEvent::ConnectRequested);
        assert!(matches!(result, TransitionResult::Invalid { from: SessionState::Connected, .. }));
    }

    #[test]
    fn test_transition_table() {
        use SessionState::*;
        assert!(is_valid_transition(Connected, Disconnected));
        assert!(is_valid_transition(Failed, Connecting));
        assert!(!is_valid_transition(Disconnected, Connected));
        assert!(!is_valid_transition(Failed, Connected));
    }
}
