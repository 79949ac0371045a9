//! # Transport Handle & Monitor
//!
//! The owner-side view of a running transport task: a cloneable command
//! handle, and a monitor that resolves when the task exits. Handle and
//! monitor are always created together and stored together (both set or both
//! absent on the transport-local state).

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::events::TransportEvent;

/// Errors surfaced by transport interactions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// TCP/TLS connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),
    /// The RFC 6455 handshake failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    /// A frame could not be written to the socket.
    #[error("send failed: {0}")]
    Send(String),
    /// No live socket behind the handle.
    #[error("transport not connected")]
    NotConnected,
    /// The transport task is gone; the command was not delivered.
    #[error("transport command channel closed")]
    ChannelClosed,
    /// A bounded wait on the transport expired.
    #[error("timed out waiting for transport")]
    Timeout,
}

/// Commands the owner sends into the transport task.
#[derive(Debug)]
pub enum TransportCommand {
    /// Write a message to the socket and acknowledge the result.
    Send {
        /// Transport-native message to write.
        message: Message,
        /// Write result, delivered once the sink flush completes.
        ack: oneshot::Sender<Result<(), TransportError>>,
    },
    /// Initiate a close handshake.
    Close {
        /// Close status code, when one should be sent.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
    /// Atomically redirect event delivery to a new owner.
    SetOwner {
        /// The new owner's event channel.
        events: mpsc::UnboundedSender<TransportEvent>,
        /// Acknowledged once every later event goes to the new owner.
        ack: oneshot::Sender<()>,
    },
    /// Drop the socket without a close handshake.
    Shutdown,
}

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// # Transport Handle
///
/// Cloneable command channel into one transport task. Cloning does not
/// change ownership: events keep flowing to whichever channel the task
/// currently holds.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    id: u64,
    cmd_tx: mpsc::UnboundedSender<TransportCommand>,
}

impl TransportHandle {
    pub(crate) fn new(cmd_tx: mpsc::UnboundedSender<TransportCommand>) -> Self {
        Self {
            id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
            cmd_tx,
        }
    }

    /// Process-unique identifier of the underlying transport instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Writes a message and waits for the sink to accept it.
    pub async fn send(&self, message: Message) -> Result<(), TransportError> {
        let (ack, ack_rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCommand::Send { message, ack })
            .map_err(|_| TransportError::ChannelClosed)?;
        ack_rx.await.map_err(|_| TransportError::ChannelClosed)?
    }

    /// Starts the close handshake. Best-effort: a dead task is already
    /// closed.
    pub fn close(&self, code: Option<u16>, reason: &str) {
        let _ = self.cmd_tx.send(TransportCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Redirects event delivery to `events` and waits for the swap.
    pub async fn set_owner(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError> {
        let (ack, ack_rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCommand::SetOwner { events, ack })
            .map_err(|_| TransportError::ChannelClosed)?;
        ack_rx.await.map_err(|_| TransportError::ChannelClosed)
    }

    /// Tears the socket down without a close handshake.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(TransportCommand::Shutdown);
    }
}

/// # Monitor Handle
///
/// Observes transport liveness. The token is cancelled by the transport task
/// on every exit path, so any number of interested parties (the owning
/// runtime, a previous owner after handoff, the supervisor) can await it.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    token: CancellationToken,
}

impl MonitorHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Resolves when the transport task has exited.
    pub async fn down(&self) {
        self.token.cancelled().await;
    }

    /// True once the transport task has exited.
    pub fn is_down(&self) -> bool {
        self.token.is_cancelled()
    }
}
