//! # Connection Manager
//!
//! Drives the connection state machine: validated transitions with their
//! entry side effects, terminal-error classification, and the reconnection
//! decision (`handle_reconnection`) that either yields the next backoff
//! delay or pushes the machine into its terminal `Error` state.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use thiserror::Error;

use super::state::ConnectionState;
use super::status::{ConnectionStatus, StateError};
use crate::reconnect::ReconnectPolicy;
use crate::transport::events::DownReason;

/// Optional inputs to a transition.
#[derive(Debug, Default, Clone)]
pub struct TransitionParams {
    /// Recorded as `last_error` on entry into `Disconnected` or `Error`.
    pub reason: Option<DownReason>,
}

impl TransitionParams {
    /// Params carrying a reason.
    pub fn with_reason(reason: DownReason) -> Self {
        Self {
            reason: Some(reason),
        }
    }
}

/// Why no reconnection will be attempted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconnectError {
    /// The recorded error forbids reconnection.
    #[error("terminal_error")]
    TerminalError,
    /// The attempt budget is spent.
    #[error("max_attempts_reached")]
    MaxAttemptsReached,
    /// The state machine rejected the transition.
    #[error(transparent)]
    State(#[from] StateError),
}

/// # Connection Manager
///
/// Owns the transport-local [`ConnectionState`] plus the retry accounting.
/// All mutation goes through [`transition`](ConnectionManager::transition),
/// which keeps the status, side effects and error record consistent.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ConnectionManager {
    /// A manager in `Initialized` with zero attempts.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::new(),
            policy,
            attempts: 0,
        }
    }

    /// Current machine status.
    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    /// Read access to the transport-local state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Mutable access to the transport-local state.
    pub fn state_mut(&mut self) -> &mut ConnectionState {
        &mut self.state
    }

    /// Reconnection attempts consumed since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The configured reconnection policy.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Replaces the policy (canonical state re-sync after ownership
    /// transfer).
    pub fn set_policy(&mut self, policy: ReconnectPolicy) {
        self.policy = policy;
    }

    /// Validated transition with entry side effects:
    /// - `Connected` resets the attempt counter;
    /// - `Disconnected` records `params.reason` (when given) as the last
    ///   error;
    /// - `Error` always records a reason (falling back to `fatal_error`).
    ///
    /// Invalid transitions leave the state untouched.
    pub fn transition(
        &mut self,
        to: ConnectionStatus,
        params: TransitionParams,
    ) -> Result<(), StateError> {
        let from = self.state.status();
        if !from.can_transition_to(to) {
            return Err(StateError::InvalidTransition { from, to });
        }
        self.state.set_status(to);
        match to {
            ConnectionStatus::Connected => {
                self.attempts = 0;
            }
            ConnectionStatus::Disconnected => {
                if let Some(reason) = params.reason {
                    self.state.record_error(reason);
                }
            }
            ConnectionStatus::Error => {
                let reason = params
                    .reason
                    .or_else(|| self.state.last_error().cloned())
                    .unwrap_or_else(|| DownReason::Fatal("unspecified".to_string()));
                self.state.record_error(reason);
            }
            _ => {}
        }
        log::debug!("connection status {} -> {}", from, to);
        Ok(())
    }

    /// Decides whether (and when) to reconnect. Decision order:
    ///
    /// 1. already in `Error` — refuse;
    /// 2. the last error is terminal — transition to `Error`, refuse;
    /// 3. attempt budget spent — transition to `Error`, refuse;
    /// 4. otherwise compute the delay for the next attempt, consume one
    ///    attempt, transition to `Reconnecting`.
    pub fn handle_reconnection(&mut self) -> Result<Duration, ReconnectError> {
        if self.status() == ConnectionStatus::Error {
            return Err(ReconnectError::TerminalError);
        }
        if let Some(last) = self.state.last_error() {
            if last.is_terminal() {
                let reason = last.clone();
                self.transition(
                    ConnectionStatus::Error,
                    TransitionParams::with_reason(reason),
                )?;
                return Err(ReconnectError::TerminalError);
            }
        }
        if self.policy.attempts_exhausted(self.attempts) {
            self.transition(ConnectionStatus::Error, TransitionParams::default())?;
            return Err(ReconnectError::MaxAttemptsReached);
        }
        let delay = self.policy.delay(self.attempts + 1);
        self.attempts += 1;
        self.transition(ConnectionStatus::Reconnecting, TransitionParams::default())?;
        Ok(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::BackoffType;

    fn linear_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            strategy: BackoffType::Linear,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            max_attempts: Some(max_attempts),
            jitter_factor: 0.0,
        }
    }

    fn disconnected_manager(max_attempts: u32) -> ConnectionManager {
        let mut manager = ConnectionManager::new(linear_policy(max_attempts));
        manager
            .transition(ConnectionStatus::Connecting, TransitionParams::default())
            .unwrap();
        manager
            .transition(
                ConnectionStatus::Disconnected,
                TransitionParams::with_reason(DownReason::Timeout),
            )
            .unwrap();
        manager
    }

    #[test]
    fn invalid_transition_leaves_state_unchanged() {
        let mut manager = ConnectionManager::new(linear_policy(3));
        let err = manager
            .transition(
                ConnectionStatus::WebsocketConnected,
                TransitionParams::default(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidTransition {
                from: ConnectionStatus::Initialized,
                to: ConnectionStatus::WebsocketConnected,
            }
        );
        assert_eq!(manager.status(), ConnectionStatus::Initialized);
    }

    #[test]
    fn linear_backoff_with_cap() {
        let mut manager = disconnected_manager(3);
        for _ in 0..3 {
            let delay = manager.handle_reconnection().unwrap();
            assert_eq!(delay, Duration::from_millis(500));
            // Model a failed attempt: back to disconnected.
            manager
                .transition(ConnectionStatus::Connecting, TransitionParams::default())
                .unwrap();
            manager
                .transition(
                    ConnectionStatus::Disconnected,
                    TransitionParams::with_reason(DownReason::Timeout),
                )
                .unwrap();
        }
        assert_eq!(
            manager.handle_reconnection(),
            Err(ReconnectError::MaxAttemptsReached)
        );
        assert_eq!(manager.status(), ConnectionStatus::Error);
    }

    #[test]
    fn terminal_error_drives_error_in_one_step() {
        let mut manager = ConnectionManager::new(linear_policy(3));
        manager
            .transition(ConnectionStatus::Connecting, TransitionParams::default())
            .unwrap();
        manager
            .transition(
                ConnectionStatus::Disconnected,
                TransitionParams::with_reason(DownReason::Closed),
            )
            .unwrap();
        assert_eq!(
            manager.handle_reconnection(),
            Err(ReconnectError::TerminalError)
        );
        assert_eq!(manager.status(), ConnectionStatus::Error);
        assert_eq!(manager.state().last_error(), Some(&DownReason::Closed));
    }

    #[test]
    fn connected_resets_attempts() {
        let mut manager = disconnected_manager(5);
        manager.handle_reconnection().unwrap();
        assert_eq!(manager.attempts(), 1);
        manager
            .transition(ConnectionStatus::Connecting, TransitionParams::default())
            .unwrap();
        manager
            .transition(ConnectionStatus::Connected, TransitionParams::default())
            .unwrap();
        assert_eq!(manager.attempts(), 0);
    }

    #[test]
    fn error_status_refuses_immediately() {
        let mut manager = ConnectionManager::new(linear_policy(3));
        manager
            .transition(
                ConnectionStatus::Error,
                TransitionParams::with_reason(DownReason::Fatal("bad state".into())),
            )
            .unwrap();
        assert_eq!(
            manager.handle_reconnection(),
            Err(ReconnectError::TerminalError)
        );
    }
}
