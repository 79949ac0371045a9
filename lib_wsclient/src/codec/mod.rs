//! # Frame Codec Module
//!
//! Translates between the runtime's internal [`Frame`] representation and the
//! transport-native message type, validating payloads on the way.
//!
//! ## Core Components:
//! - **`frame`**: The [`Frame`] enum and its [`Opcode`]s.
//! - **`validation`**: Close-code classification and the RFC 6455
//!   control-frame size limit.
//! - **`handlers`**: One [`FrameHandler`] per opcode plus the runtime-extensible
//!   [`HandlerRegistry`] the codec dispatches through.
//!
//! The codec is constructed per client (no process-wide handler table); every
//! connection spawned by the same client shares one registry, so registering
//! e.g. a compression extension applies to all of them at once.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// The internal frame representation and opcodes.
pub mod frame;
/// Per-opcode encode/decode handlers and the handler registry.
pub mod handlers;
/// Close-code and control-frame validation rules.
pub mod validation;

// --- Public API Re-exports ---
pub use frame::{Frame, Opcode};
pub use handlers::{FrameHandler, HandlerRegistry};
pub use validation::{validate_close_code, validate_control_frame_size, validate_frame, CodecError};

use std::sync::Arc;

use tokio_tungstenite::tungstenite::Message;

/// # Frame Codec
///
/// Dispatches encode/decode/validate by opcode through the handler registry.
#[derive(Clone)]
pub struct FrameCodec {
    registry: Arc<HandlerRegistry>,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// A codec with the five standard opcode handlers registered.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(HandlerRegistry::with_defaults()),
        }
    }

    /// The shared handler registry, for runtime extension.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Registers (or replaces) the handler for an opcode.
    pub fn register_handler(&self, opcode: Opcode, handler: Arc<dyn FrameHandler>) {
        self.registry.register(opcode, handler);
    }

    /// Removes the handler for an opcode.
    pub fn unregister_handler(&self, opcode: Opcode) -> bool {
        self.registry.unregister(opcode)
    }

    /// Validates and encodes a frame into the transport representation.
    pub fn encode(&self, frame: Frame) -> Result<Message, CodecError> {
        let opcode = frame.opcode();
        let handler = self
            .registry
            .get(opcode)
            .ok_or(CodecError::UnhandledOpcode(opcode))?;
        handler.validate(&frame)?;
        handler.encode(frame)
    }

    /// Decodes a transport message. Messages with no registered handler (or
    /// no internal representation at all) fail with `InvalidFrame`.
    pub fn decode(&self, message: Message) -> Result<Frame, CodecError> {
        let opcode = match &message {
            Message::Text(_) => Opcode::Text,
            Message::Binary(_) => Opcode::Binary,
            Message::Ping(_) => Opcode::Ping,
            Message::Pong(_) => Opcode::Pong,
            Message::Close(_) => Opcode::Close,
            // Raw frames never surface from the transport read loop.
            Message::Frame(_) => return Err(CodecError::InvalidFrame),
        };
        let handler = self
            .registry
            .get(opcode)
            .ok_or(CodecError::InvalidFrame)?;
        handler.decode(message)
    }

    /// Validates a frame without encoding it.
    pub fn validate(&self, frame: &Frame) -> Result<(), CodecError> {
        let opcode = frame.opcode();
        let handler = self
            .registry
            .get(opcode)
            .ok_or(CodecError::UnhandledOpcode(opcode))?;
        handler.validate(frame)
    }
}
