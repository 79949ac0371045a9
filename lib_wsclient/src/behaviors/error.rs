//! # Error Handler
//!
//! Classification and policy for transport faults that are not clean
//! disconnects.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use serde_json::Value;

use crate::session::ClientConn;

/// A transport fault with whatever context the transport attached.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Fault description.
    pub reason: String,
    /// Free-form context (stream, endpoint, ...).
    pub context: Value,
}

/// Return contract of `handle_error`.
#[derive(Debug)]
pub enum ErrorOutcome {
    /// Logged, nothing else.
    Continue,
    /// Schedule a reconnection per the configured policy.
    Reconnect,
    /// Reconnect after a handler-chosen delay.
    Retry {
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Terminate the runtime.
    Stop {
        /// Stop reason.
        reason: String,
    },
}

/// Transport-error behavior. `log_error` always runs before
/// `handle_error`, so even a policy of `Continue` leaves a trace.
pub trait ErrorHandler: Send + Sync {
    /// Records the fault.
    fn log_error(&self, info: &ErrorInfo) {
        log::error!("transport error: {} context={}", info.reason, info.context);
    }

    /// Decides what the fault means for the connection.
    fn handle_error(&self, info: &ErrorInfo, conn: &mut ClientConn) -> ErrorOutcome {
        let _ = (info, conn);
        ErrorOutcome::Continue
    }
}

/// Log-and-continue implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {}
