//! # Connection Handler
//!
//! Lifecycle callbacks: connect, disconnect, raw frames. Every return is a
//! closed outcome enum the bridge matches exhaustively; there is no way for
//! a handler to raise across the actor boundary.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use crate::codec::Frame;
use crate::session::ClientConn;
use crate::transport::events::{DownReason, StreamRef};

/// What the handler learns when a connection (or upgrade) completes.
#[derive(Debug, Clone, Default)]
pub struct ConnectInfo {
    /// Negotiated wire protocol (`"http"` pre-upgrade, the accepted
    /// subprotocol after it, when the server picked one).
    pub protocol: Option<String>,
    /// Upgrade response headers (empty for the pre-upgrade call).
    pub headers: Vec<(String, String)>,
    /// The upgraded stream, once one exists.
    pub stream: Option<StreamRef>,
}

/// Normalized cause handed to `handle_disconnect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The remote closed the stream (clean shutdowns land here as 1000).
    Remote {
        /// Close status code.
        code: u16,
        /// Close reason text.
        message: String,
    },
    /// A transport-level failure.
    Error(DownReason),
}

/// Disconnect context.
#[derive(Debug, Clone)]
pub struct DisconnectInfo {
    /// Normalized cause.
    pub cause: DisconnectCause,
    /// Reconnection attempts already consumed.
    pub attempts: u32,
}

/// Return contract of `handle_connect`.
#[derive(Debug)]
pub enum ConnectOutcome {
    /// Proceed.
    Continue,
    /// Queue a frame send (best-effort before the upgrade).
    Reply(Frame),
    /// Tear the connection down with a close frame.
    Close {
        /// Close status code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Terminate the runtime.
    Stop {
        /// Stop reason.
        reason: String,
    },
}

/// Return contract of `handle_disconnect`.
#[derive(Debug)]
pub enum DisconnectOutcome {
    /// Accept the disconnect, do nothing.
    Continue,
    /// Schedule a reconnection per the configured policy.
    Reconnect,
    /// Terminate the runtime.
    Stop {
        /// Stop reason.
        reason: String,
    },
}

/// Return contract of `handle_frame`.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Proceed (text frames continue into the message pipeline).
    Continue,
    /// Send a frame on the same stream.
    Reply(Frame),
    /// Tear the connection down with a close frame.
    Close {
        /// Close status code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Surface an error through the error handler.
    Error {
        /// Error description.
        reason: String,
    },
}

/// Connection lifecycle behavior. All methods have defaults so an adopter
/// overrides only what they need; the default posture is the resilient one
/// (reconnect on disconnect).
pub trait ConnectionHandler: Send + Sync {
    /// Called on transport-up and again on WebSocket upgrade.
    fn handle_connect(&self, info: &ConnectInfo, conn: &mut ClientConn) -> ConnectOutcome {
        let _ = (info, conn);
        ConnectOutcome::Continue
    }

    /// Called when the transport goes down.
    fn handle_disconnect(&self, info: &DisconnectInfo, conn: &mut ClientConn) -> DisconnectOutcome {
        let _ = (info, conn);
        DisconnectOutcome::Reconnect
    }

    /// Called for every inbound frame.
    fn handle_frame(
        &self,
        stream: StreamRef,
        frame: &Frame,
        conn: &mut ClientConn,
    ) -> FrameOutcome {
        let _ = (stream, frame, conn);
        FrameOutcome::Continue
    }
}

/// The do-nothing, reconnect-by-default implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnectionHandler;

impl ConnectionHandler for DefaultConnectionHandler {}
