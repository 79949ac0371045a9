//! # Frame Representation
//!
//! The internal, transport-independent representation of a single WebSocket
//! protocol message unit. Every frame that enters or leaves the runtime is
//! expressed as a [`Frame`] and only translated to the transport-native type
//! at the codec boundary.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use bytes::Bytes;

use super::validation::CodecError;

/// The five opcodes the codec dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// UTF-8 text payload.
    Text,
    /// Arbitrary binary payload.
    Binary,
    /// Control frame: keepalive probe.
    Ping,
    /// Control frame: keepalive answer.
    Pong,
    /// Control frame: connection close.
    Close,
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Opcode::Text => "text",
            Opcode::Binary => "binary",
            Opcode::Ping => "ping",
            Opcode::Pong => "pong",
            Opcode::Close => "close",
        };
        write!(f, "{}", name)
    }
}

/// # WebSocket Frame
///
/// A single protocol message unit: text, binary, ping, pong, or close.
///
/// Text frames always hold valid UTF-8 (enforced by construction). Control
/// frame payloads are limited to 125 bytes by RFC 6455; the codec's validation
/// pass rejects oversized ones before they reach the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame carrying a UTF-8 payload.
    Text(String),
    /// A binary frame.
    Binary(Bytes),
    /// A ping control frame.
    Ping(Bytes),
    /// A pong control frame.
    Pong(Bytes),
    /// A close control frame with an optional status code and a reason string.
    Close {
        /// RFC 6455 close status code, when one was supplied.
        code: Option<u16>,
        /// Human-readable close reason (may be empty).
        reason: String,
    },
}

impl Frame {
    /// The opcode this frame dispatches on.
    pub fn opcode(&self) -> Opcode {
        match self {
            Frame::Text(_) => Opcode::Text,
            Frame::Binary(_) => Opcode::Binary,
            Frame::Ping(_) => Opcode::Ping,
            Frame::Pong(_) => Opcode::Pong,
            Frame::Close { .. } => Opcode::Close,
        }
    }

    /// True for ping, pong and close frames.
    pub fn is_control(&self) -> bool {
        matches!(
            self.opcode(),
            Opcode::Ping | Opcode::Pong | Opcode::Close
        )
    }

    /// Builds a text frame from raw bytes, rejecting invalid UTF-8.
    pub fn text_from_bytes(data: Vec<u8>) -> Result<Self, CodecError> {
        match String::from_utf8(data) {
            Ok(text) => Ok(Frame::Text(text)),
            Err(_) => Err(CodecError::InvalidTextData),
        }
    }

    /// A close frame with the conventional clean-shutdown code.
    pub fn close_normal(reason: &str) -> Self {
        Frame::Close {
            code: Some(1000),
            reason: reason.to_string(),
        }
    }

    /// Length in bytes of the frame payload.
    pub fn payload_len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) | Frame::Ping(data) | Frame::Pong(data) => data.len(),
            // Close payload on the wire is 2 code bytes plus the reason.
            Frame::Close { code, reason } => {
                reason.len() + if code.is_some() { 2 } else { 0 }
            }
        }
    }
}
