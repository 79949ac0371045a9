//! # Per-Opcode Frame Handlers
//!
//! Each opcode is encoded/decoded by a [`FrameHandler`] looked up in a
//! [`HandlerRegistry`]. The registry is created per codec instance (no
//! process-wide table) and is read-mostly: lookups take a shared lock,
//! registration of e.g. a compression extension takes the exclusive lock.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

use super::frame::{Frame, Opcode};
use super::validation::{self, CodecError};

/// Translation contract between [`Frame`] and the transport-native message.
///
/// Implementations must be stateless or internally synchronized; the same
/// handler instance is shared across every connection using the codec.
pub trait FrameHandler: Send + Sync {
    /// Encode an internal frame into the transport representation.
    fn encode(&self, frame: Frame) -> Result<Message, CodecError>;

    /// Decode a transport message into the internal representation.
    fn decode(&self, message: Message) -> Result<Frame, CodecError>;

    /// Validate a frame before it is handed to the transport.
    fn validate(&self, frame: &Frame) -> Result<(), CodecError> {
        validation::validate_frame(frame)
    }
}

/// Text frames. Outbound payloads are `String`, so UTF-8 holds by
/// construction; inbound payloads come pre-validated by the transport.
pub struct TextFrameHandler;

impl FrameHandler for TextFrameHandler {
    fn encode(&self, frame: Frame) -> Result<Message, CodecError> {
        match frame {
            Frame::Text(text) => Ok(Message::Text(Utf8Bytes::from(text))),
            _ => Err(CodecError::InvalidFrame),
        }
    }

    fn decode(&self, message: Message) -> Result<Frame, CodecError> {
        match message {
            Message::Text(text) => Ok(Frame::Text(text.as_str().to_string())),
            _ => Err(CodecError::InvalidFrame),
        }
    }
}

/// Binary frames.
pub struct BinaryFrameHandler;

impl FrameHandler for BinaryFrameHandler {
    fn encode(&self, frame: Frame) -> Result<Message, CodecError> {
        match frame {
            Frame::Binary(data) => Ok(Message::Binary(data)),
            _ => Err(CodecError::InvalidFrame),
        }
    }

    fn decode(&self, message: Message) -> Result<Frame, CodecError> {
        match message {
            Message::Binary(data) => Ok(Frame::Binary(data)),
            _ => Err(CodecError::InvalidFrame),
        }
    }
}

/// Ping control frames.
pub struct PingFrameHandler;

impl FrameHandler for PingFrameHandler {
    fn encode(&self, frame: Frame) -> Result<Message, CodecError> {
        match frame {
            Frame::Ping(data) => {
                validation::validate_control_frame_size(data.len())?;
                Ok(Message::Ping(data))
            }
            _ => Err(CodecError::InvalidFrame),
        }
    }

    fn decode(&self, message: Message) -> Result<Frame, CodecError> {
        match message {
            Message::Ping(data) => Ok(Frame::Ping(data)),
            _ => Err(CodecError::InvalidFrame),
        }
    }
}

/// Pong control frames.
pub struct PongFrameHandler;

impl FrameHandler for PongFrameHandler {
    fn encode(&self, frame: Frame) -> Result<Message, CodecError> {
        match frame {
            Frame::Pong(data) => {
                validation::validate_control_frame_size(data.len())?;
                Ok(Message::Pong(data))
            }
            _ => Err(CodecError::InvalidFrame),
        }
    }

    fn decode(&self, message: Message) -> Result<Frame, CodecError> {
        match message {
            Message::Pong(data) => Ok(Frame::Pong(data)),
            _ => Err(CodecError::InvalidFrame),
        }
    }
}

/// Close control frames. A missing status code encodes as an empty close
/// frame; the reason is dropped in that case since the wire format cannot
/// carry a reason without a code.
pub struct CloseFrameHandler;

impl FrameHandler for CloseFrameHandler {
    fn encode(&self, frame: Frame) -> Result<Message, CodecError> {
        match frame {
            Frame::Close { code, reason } => match code {
                Some(code) => {
                    validation::validate_close_code(code)?;
                    Ok(Message::Close(Some(CloseFrame {
                        code: CloseCode::from(code),
                        reason: Utf8Bytes::from(reason),
                    })))
                }
                None => Ok(Message::Close(None)),
            },
            _ => Err(CodecError::InvalidFrame),
        }
    }

    fn decode(&self, message: Message) -> Result<Frame, CodecError> {
        match message {
            Message::Close(Some(close)) => Ok(Frame::Close {
                code: Some(u16::from(close.code)),
                reason: close.reason.as_str().to_string(),
            }),
            Message::Close(None) => Ok(Frame::Close {
                code: None,
                reason: String::new(),
            }),
            _ => Err(CodecError::InvalidFrame),
        }
    }
}

/// # Handler Registry
///
/// Keyed store mapping opcodes to their handlers. Lookups are shared-lock
/// reads; `register`/`unregister` serialize behind the write lock so a
/// running connection can gain (or lose) an opcode handler at runtime.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<Opcode, Arc<dyn FrameHandler>>>,
}

impl HandlerRegistry {
    /// An empty registry with no handlers at all.
    pub fn empty() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// A registry pre-populated with the five standard opcode handlers.
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register(Opcode::Text, Arc::new(TextFrameHandler));
        registry.register(Opcode::Binary, Arc::new(BinaryFrameHandler));
        registry.register(Opcode::Ping, Arc::new(PingFrameHandler));
        registry.register(Opcode::Pong, Arc::new(PongFrameHandler));
        registry.register(Opcode::Close, Arc::new(CloseFrameHandler));
        registry
    }

    /// Registers (or replaces) the handler for an opcode.
    pub fn register(&self, opcode: Opcode, handler: Arc<dyn FrameHandler>) {
        let mut handlers = self.handlers.write().expect("handler registry lock poisoned");
        handlers.insert(opcode, handler);
    }

    /// Removes the handler for an opcode. Frames with that opcode fail with
    /// `UnhandledOpcode` until a new handler is registered.
    pub fn unregister(&self, opcode: Opcode) -> bool {
        let mut handlers = self.handlers.write().expect("handler registry lock poisoned");
        handlers.remove(&opcode).is_some()
    }

    /// Looks up the handler for an opcode.
    pub fn get(&self, opcode: Opcode) -> Option<Arc<dyn FrameHandler>> {
        let handlers = self.handlers.read().expect("handler registry lock poisoned");
        handlers.get(&opcode).cloned()
    }
}
