//! # Message Handler
//!
//! The JSON message pipeline behind text frames: validation, application
//! dispatch, and encoding of replies.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use serde_json::Value;

use crate::codec::Frame;
use crate::session::ClientConn;

/// Return contract of `handle_message`.
#[derive(Debug)]
pub enum MessageOutcome {
    /// Nothing to send back.
    Continue,
    /// Encode and send one reply on the same stream.
    Reply(Value),
    /// Multiple replies. Only the first is currently sent; see the bridge.
    ReplyMany(Vec<Value>),
    /// Tear the connection down with a close frame.
    Close {
        /// Close status code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Surface a message-level error (logged, connection continues).
    Error {
        /// Error description.
        reason: String,
    },
}

/// Application message behavior for decoded JSON payloads.
pub trait MessageHandler: Send + Sync {
    /// Structural validation before dispatch. Failures are logged and the
    /// message is dropped; the connection is unaffected.
    fn validate_message(&self, message: &Value) -> Result<(), String> {
        let _ = message;
        Ok(())
    }

    /// Application dispatch of one validated message.
    fn handle_message(&self, message: &Value, conn: &mut ClientConn) -> MessageOutcome {
        let _ = (message, conn);
        MessageOutcome::Continue
    }

    /// Encodes an outbound reply into a frame.
    fn encode_message(&self, message: &Value) -> Result<Frame, String> {
        Ok(Frame::Text(message.to_string()))
    }
}

/// Accept-everything implementation with JSON text encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMessageHandler;

impl MessageHandler for DefaultMessageHandler {}
