//! # Transport Events
//!
//! The closed vocabulary of events a transport instance delivers to its
//! owner, and the reason type recorded when a transport dies.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// Opaque token identifying one multiplexed stream on a transport. For
/// WebSocket there is exactly one after the upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamRef(u64);

static NEXT_STREAM_REF: AtomicU64 = AtomicU64::new(1);

impl StreamRef {
    /// Mints a fresh, process-unique stream reference.
    pub fn mint() -> Self {
        StreamRef(NEXT_STREAM_REF.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for StreamRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// # Transport Down Reason
///
/// Why a transport instance died. The set of named reasons is deliberately
/// closed: anything the transport cannot classify passes through as
/// `Other` so callers can still log and match on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownReason {
    /// Clean shutdown initiated by either side.
    Normal,
    /// The peer closed the connection and it must not be re-established.
    Closed,
    /// The connection (or an await on it) timed out.
    Timeout,
    /// TCP connection refused.
    ConnectionRefused,
    /// Hostname did not resolve.
    NxDomain,
    /// An unrecoverable fault; carries a description.
    Fatal(String),
    /// Anything outside the closed set, carried verbatim.
    Other(String),
}

impl DownReason {
    /// Terminal reasons forbid any further reconnection attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownReason::Closed
                | DownReason::ConnectionRefused
                | DownReason::NxDomain
                | DownReason::Fatal(_)
        )
    }

    /// Parses a bare reason name.
    pub fn parse(name: &str) -> Self {
        match name {
            "normal" => DownReason::Normal,
            "closed" => DownReason::Closed,
            "timeout" => DownReason::Timeout,
            "econnrefused" | "connection_refused" => DownReason::ConnectionRefused,
            "nxdomain" => DownReason::NxDomain,
            "fatal_error" => DownReason::Fatal(String::new()),
            other => DownReason::Other(other.to_string()),
        }
    }

    /// Extracts a reason from the shapes callers hand over: a bare string,
    /// or a map carrying a `"reason"` key.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(DownReason::parse(name)),
            Value::Object(map) => map
                .get("reason")
                .and_then(Value::as_str)
                .map(DownReason::parse),
            _ => None,
        }
    }
}

impl std::fmt::Display for DownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownReason::Normal => write!(f, "normal"),
            DownReason::Closed => write!(f, "closed"),
            DownReason::Timeout => write!(f, "timeout"),
            DownReason::ConnectionRefused => write!(f, "econnrefused"),
            DownReason::NxDomain => write!(f, "nxdomain"),
            DownReason::Fatal(detail) if detail.is_empty() => write!(f, "fatal_error"),
            DownReason::Fatal(detail) => write!(f, "fatal_error: {}", detail),
            DownReason::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// # Transport Event
///
/// Everything a transport instance can tell its owner. Exactly one owner
/// receives these at any moment; ownership transfer swaps the delivery
/// channel atomically inside the transport task.
#[derive(Debug)]
pub enum TransportEvent {
    /// The socket (TCP or TLS) is established; the upgrade has not run yet.
    Up {
        /// Negotiated wire protocol, `"http"` before the upgrade.
        protocol: String,
    },
    /// The RFC 6455 handshake completed.
    WsUpgrade {
        /// The stream minted for this WebSocket.
        stream: StreamRef,
        /// Response headers, including `Sec-WebSocket-Protocol` when the
        /// server accepted a subprotocol.
        headers: Vec<(String, String)>,
    },
    /// A frame arrived on a stream.
    WsFrame {
        /// The stream the frame arrived on.
        stream: StreamRef,
        /// The transport-native message; the runtime decodes it.
        message: Message,
    },
    /// The transport died.
    Down {
        /// Classified reason.
        reason: DownReason,
        /// Streams that died with it.
        killed_streams: Vec<StreamRef>,
    },
    /// A non-fatal transport fault tied to the connection or one stream.
    Failed {
        /// The stream involved, when the fault is stream-scoped.
        stream: Option<StreamRef>,
        /// Fault description.
        reason: String,
    },
    /// The server answered the upgrade with a plain HTTP response.
    HttpResponse {
        /// The stream the response belongs to.
        stream: StreamRef,
        /// Whether this is the final part of the response.
        fin: bool,
        /// HTTP status code.
        status: u16,
        /// Response headers.
        headers: Vec<(String, String)>,
    },
    /// Body data for a plain HTTP response.
    HttpData {
        /// The stream the data belongs to.
        stream: StreamRef,
        /// Whether this is the final chunk.
        fin: bool,
        /// Raw body bytes.
        data: Bytes,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_classification() {
        assert!(DownReason::Closed.is_terminal());
        assert!(DownReason::ConnectionRefused.is_terminal());
        assert!(DownReason::NxDomain.is_terminal());
        assert!(DownReason::Fatal("assert".into()).is_terminal());
        assert!(!DownReason::Normal.is_terminal());
        assert!(!DownReason::Timeout.is_terminal());
        assert!(!DownReason::Other("flaky_proxy".into()).is_terminal());
    }

    #[test]
    fn reasons_parse_from_every_accepted_shape() {
        assert_eq!(DownReason::parse("econnrefused"), DownReason::ConnectionRefused);
        assert_eq!(
            DownReason::from_json(&json!("nxdomain")),
            Some(DownReason::NxDomain)
        );
        assert_eq!(
            DownReason::from_json(&json!({"reason": "closed", "code": 1006})),
            Some(DownReason::Closed)
        );
        assert_eq!(DownReason::from_json(&json!(42)), None);
        assert_eq!(
            DownReason::parse("flaky_proxy"),
            DownReason::Other("flaky_proxy".into())
        );
    }

    #[test]
    fn stream_refs_are_unique() {
        let a = StreamRef::mint();
        let b = StreamRef::mint();
        assert_ne!(a, b);
    }
}
