use std::sync::atomic::{AtomicU8, Ordering};

/// Connection state of one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
            ConnectionState::Failed => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Whether a session (socket or poll handle) may be live in this state
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }
}

/// Connection state shared between a connection and its loop task.
///
/// The loop and `disconnect()` race to leave `Connected`; `transition` makes
/// exactly one of them win so the terminal notification is emitted once.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Move `from -> to`; returns false if the state was no longer `from`
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_only_from_expected_state() {
        let cell = StateCell::default();
        assert!(!cell.transition(ConnectionState::Connected, ConnectionState::Disconnected));
        assert_eq!(cell.get(), ConnectionState::Disconnected);

        cell.set(ConnectionState::Connected);
        assert!(cell.transition(ConnectionState::Connected, ConnectionState::Disconnected));
        assert!(!cell.transition(ConnectionState::Connected, ConnectionState::Disconnected));
    }

    #[test]
    fn test_round_trip_all_states() {
        let cell = StateCell::default();
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Failed,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }
}
