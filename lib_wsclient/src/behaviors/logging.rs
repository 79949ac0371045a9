//! # Logging Handler
//!
//! Structured logging hooks for the three event families the runtime emits.
//! The default routes through `tracing` so adopters inherit whatever
//! subscriber their application installed; credentials never reach these
//! hooks.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use serde_json::Value;

/// Logging behavior.
pub trait LoggingHandler: Send + Sync {
    /// Connection lifecycle events (connects, upgrades, disconnects).
    fn log_connection_event(&self, event: &str, details: &Value) {
        tracing::info!(target: "lib_wsclient::connection", event, details = %details);
    }

    /// Message-path events (inbound/outbound frames, replies).
    fn log_message_event(&self, event: &str, details: &Value) {
        tracing::debug!(target: "lib_wsclient::message", event, details = %details);
    }

    /// Error-path events.
    fn log_error_event(&self, event: &str, details: &Value) {
        tracing::error!(target: "lib_wsclient::error", event, details = %details);
    }
}

/// Tracing-backed implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLoggingHandler;

impl LoggingHandler for DefaultLoggingHandler {}
