//! # Frame Validation
//!
//! Payload validation rules shared by all opcode handlers: close status code
//! classification and the RFC 6455 control-frame size limit.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use thiserror::Error;

use super::frame::Frame;

/// Maximum payload length of a control frame (RFC 6455 §5.5).
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Errors produced while encoding, decoding or validating frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The transport delivered a frame the codec has no representation for.
    #[error("invalid frame")]
    InvalidFrame,

    /// A text payload was not valid UTF-8.
    #[error("invalid text data")]
    InvalidTextData,

    /// A control frame payload exceeded 125 bytes.
    #[error("control frame too large ({0} bytes)")]
    ControlFrameTooLarge(usize),

    /// A close status code outside every acceptable range.
    #[error("invalid close code {0}")]
    InvalidCloseCode(u16),

    /// A close status code reserved by RFC 6455 for internal use.
    #[error("reserved close code {0}")]
    ReservedCloseCode(u16),

    /// No handler is registered for the frame's opcode.
    #[error("no handler registered for opcode {0}")]
    UnhandledOpcode(super::frame::Opcode),
}

/// Validates an RFC 6455 close status code.
///
/// Accepted: 1000–1003, 1007–1011 and the application range 3000–4999.
/// 1004, 1005, 1006 and 1015 are reserved and must never be sent on the wire.
/// Everything else (including all codes below 1000) is invalid.
pub fn validate_close_code(code: u16) -> Result<(), CodecError> {
    match code {
        1000..=1003 | 1007..=1011 | 3000..=4999 => Ok(()),
        1004 | 1005 | 1006 | 1015 => Err(CodecError::ReservedCloseCode(code)),
        _ => Err(CodecError::InvalidCloseCode(code)),
    }
}

/// Enforces the control-frame payload limit.
pub fn validate_control_frame_size(len: usize) -> Result<(), CodecError> {
    if len > MAX_CONTROL_PAYLOAD {
        Err(CodecError::ControlFrameTooLarge(len))
    } else {
        Ok(())
    }
}

/// Runs every rule that applies to the given frame.
pub fn validate_frame(frame: &Frame) -> Result<(), CodecError> {
    match frame {
        Frame::Text(_) | Frame::Binary(_) => Ok(()),
        Frame::Ping(data) | Frame::Pong(data) => validate_control_frame_size(data.len()),
        Frame::Close { code, .. } => {
            validate_control_frame_size(frame.payload_len())?;
            match code {
                Some(code) => validate_close_code(*code),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn close_code_table() {
        for code in [1000, 1001, 1002, 1003, 1007, 1008, 1009, 1010, 1011, 3000, 4999] {
            assert_eq!(validate_close_code(code), Ok(()), "code {}", code);
        }
        for code in [1004, 1005, 1006, 1015] {
            assert_eq!(
                validate_close_code(code),
                Err(CodecError::ReservedCloseCode(code))
            );
        }
        for code in [0, 999, 1012, 1013, 1014, 1016, 2999, 5000] {
            assert_eq!(
                validate_close_code(code),
                Err(CodecError::InvalidCloseCode(code))
            );
        }
    }

    #[test]
    fn oversized_ping_is_rejected() {
        let frame = Frame::Ping(Bytes::from(vec![0u8; 126]));
        assert_eq!(
            validate_frame(&frame),
            Err(CodecError::ControlFrameTooLarge(126))
        );
        let frame = Frame::Ping(Bytes::from(vec![0u8; 125]));
        assert_eq!(validate_frame(&frame), Ok(()));
    }

    #[test]
    fn close_frame_validation() {
        assert_eq!(
            validate_frame(&Frame::Close { code: Some(999), reason: String::new() }),
            Err(CodecError::InvalidCloseCode(999))
        );
        assert_eq!(
            validate_frame(&Frame::Close { code: Some(1005), reason: String::new() }),
            Err(CodecError::ReservedCloseCode(1005))
        );
        assert_eq!(
            validate_frame(&Frame::Close { code: Some(1000), reason: "bye".into() }),
            Ok(())
        );
    }

    #[test]
    fn text_from_bytes_enforces_utf8() {
        assert!(Frame::text_from_bytes(b"hello".to_vec()).is_ok());
        assert_eq!(
            Frame::text_from_bytes(vec![0xff, 0xfe]),
            Err(CodecError::InvalidTextData)
        );
    }
}
