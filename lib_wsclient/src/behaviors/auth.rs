//! # Auth Handler
//!
//! Builds authentication requests from stored credentials and classifies the
//! server's answers. Venue-specific signature schemes override this; the
//! default speaks a neutral `{"method":"auth", ...}` shape and never puts
//! the API secret on the wire.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use serde_json::{json, Value};
use thiserror::Error;

use crate::core::status::ConnectionStatus;
use crate::session::{ClientConn, Credentials};

/// Authentication failures surfaced to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No usable credentials on the session.
    #[error("missing_credentials")]
    MissingCredentials,
    /// The connection is not in a state that can authenticate.
    #[error("invalid_state: {0}")]
    InvalidState(ConnectionStatus),
    /// The server rejected the credentials.
    #[error("auth rejected: {0}")]
    Rejected(String),
}

/// Classification of an inbound message against the auth protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Positive acknowledgement.
    Authenticated,
    /// Negative acknowledgement; terminal for the connection.
    Rejected {
        /// Server-supplied reason.
        reason: String,
    },
    /// The message is not part of the auth exchange.
    Unrelated,
}

/// Authentication behavior.
pub trait AuthHandler: Send + Sync {
    /// Builds the auth request payload. The default prefers a pre-issued
    /// token and falls back to the API key; it never includes the secret.
    fn build_auth_request(
        &self,
        credentials: &Credentials,
        conn: &mut ClientConn,
    ) -> Result<Value, AuthError> {
        let _ = conn;
        if let Some(token) = &credentials.token {
            return Ok(json!({"method": "auth", "params": {"token": token}}));
        }
        match &credentials.api_key {
            Some(api_key) => Ok(json!({"method": "auth", "params": {"api_key": api_key}})),
            None => Err(AuthError::MissingCredentials),
        }
    }

    /// Classifies an inbound message. The default recognizes
    /// `{"type":"auth","status":"ok"|...}`.
    fn classify_auth_response(&self, message: &Value, conn: &mut ClientConn) -> AuthOutcome {
        let _ = conn;
        if message.get("type").and_then(Value::as_str) != Some("auth") {
            return AuthOutcome::Unrelated;
        }
        match message.get("status").and_then(Value::as_str) {
            Some("ok") | Some("success") => AuthOutcome::Authenticated,
            _ => AuthOutcome::Rejected {
                reason: message
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("authentication rejected")
                    .to_string(),
            },
        }
    }
}

/// The neutral-protocol implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAuthHandler;

impl AuthHandler for DefaultAuthHandler {}
