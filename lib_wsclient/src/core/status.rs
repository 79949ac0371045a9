//! # Connection Status
//!
//! The connection lifecycle state machine. Transitions are validated by a
//! closed table; every non-terminal state may additionally fail into
//! `Error`, and the explicit close command may take any live state to
//! `Closed`. Both `Error` and `Closed` are terminal.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use thiserror::Error;

/// Lifecycle states of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Created, no connection attempt yet.
    #[default]
    Initialized,
    /// TCP/TLS connect in flight.
    Connecting,
    /// Socket established, upgrade not complete.
    Connected,
    /// RFC 6455 handshake complete; frames flow.
    WebsocketConnected,
    /// Transport lost; reconnection not yet scheduled.
    Disconnected,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
    /// Terminal failure; no further transitions.
    Error,
    /// Terminal clean shutdown via the close command.
    Closed,
}

impl ConnectionStatus {
    /// True for the two states no transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionStatus::Error | ConnectionStatus::Closed)
    }

    /// Whether the state machine permits `self -> to`.
    pub fn can_transition_to(self, to: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        if self.is_terminal() {
            return false;
        }
        // Every live state may fail into Error or be closed explicitly.
        if to == Error || to == Closed {
            return true;
        }
        matches!(
            (self, to),
            (Initialized, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, WebsocketConnected)
                | (Connected, Disconnected)
                | (WebsocketConnected, Disconnected)
                | (Disconnected, Reconnecting)
                | (Disconnected, Connecting)
                | (Reconnecting, Connecting)
                | (Reconnecting, Disconnected)
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionStatus::Initialized => "initialized",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::WebsocketConnected => "websocket_connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// State-machine violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The requested transition is not in the table.
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        /// State the machine was in.
        from: ConnectionStatus,
        /// State that was requested.
        to: ConnectionStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionStatus::*;

    const ALL: [ConnectionStatus; 8] = [
        Initialized,
        Connecting,
        Connected,
        WebsocketConnected,
        Disconnected,
        Reconnecting,
        Error,
        Closed,
    ];

    #[test]
    fn table_matches_the_design() {
        let allowed: &[(ConnectionStatus, ConnectionStatus)] = &[
            (Initialized, Connecting),
            (Connecting, Connected),
            (Connecting, Disconnected),
            (Connected, WebsocketConnected),
            (Connected, Disconnected),
            (WebsocketConnected, Disconnected),
            (Disconnected, Reconnecting),
            (Disconnected, Connecting),
            (Reconnecting, Connecting),
            (Reconnecting, Disconnected),
        ];
        for from in ALL {
            for to in ALL {
                let expected = if from.is_terminal() {
                    false
                } else if to == Error || to == Closed {
                    true
                } else {
                    allowed.contains(&(from, to))
                };
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for to in ALL {
            assert!(!Error.can_transition_to(to), "error -> {}", to);
            assert!(!Closed.can_transition_to(to), "closed -> {}", to);
        }
    }
}
