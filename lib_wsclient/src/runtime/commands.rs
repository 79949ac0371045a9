//! # Runtime Commands
//!
//! The typed mailbox of a connection runtime: user commands with oneshot
//! acknowledgements, and the error vocabulary those acknowledgements carry.
//! Every user-facing call on the client API becomes exactly one command; the
//! runtime serializes them against transport events and timers.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::behaviors::AuthError;
use crate::codec::{CodecError, Frame};
use crate::core::status::ConnectionStatus;
use crate::session::{
    CallbackId, CallbackSender, Credentials, SessionSnapshot, SubscriptionId,
};
use crate::transport::handle::{MonitorHandle, TransportError, TransportHandle};

/// Errors surfaced to client API callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No upgraded WebSocket stream to send on.
    #[error("not_connected")]
    NotConnected,
    /// The targeted stream does not exist on this transport.
    #[error("stream_not_found")]
    StreamNotFound,
    /// The targeted stream exists but cannot carry frames.
    #[error("invalid_stream_status")]
    InvalidStreamStatus,
    /// The rate limiter rejected the request outright.
    #[error("rate_limited")]
    RateLimited,
    /// The rate limiter's wait queue is full.
    #[error("queue_full")]
    QueueFull,
    /// Unknown subscription id.
    #[error("subscription_not_found")]
    SubscriptionNotFound,
    /// The command is not valid in the connection's current state.
    #[error("invalid_state: {0}")]
    InvalidState(ConnectionStatus),
    /// The caller-specified deadline expired.
    #[error("timeout")]
    Timeout,
    /// The stable connection id resolves to no live runtime.
    #[error("connection_not_found")]
    ConnectionNotFound,
    /// The connection was closed.
    #[error("connection closed")]
    Closed,
    /// An ownership handoff did not complete.
    #[error("ownership transfer failed: {0}")]
    TransferFailed(String),
    /// Frame validation or translation failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Connection options failed validation.
    #[error(transparent)]
    Options(#[from] crate::configs::OptionsError),
    /// Rate limiter configuration was invalid.
    #[error(transparent)]
    Limiter(#[from] crate::limiter::RateLimitError),
    /// The URL passed to `open` could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// The transport refused or lost the write.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Authentication failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Acknowledgement channel for a command.
pub type Responder<T> = oneshot::Sender<Result<T, ClientError>>;

/// One mailbox message.
pub enum Command {
    /// Send a frame on the main WebSocket stream.
    SendFrame {
        /// The frame to send.
        frame: Frame,
        /// Acknowledged after rate-limit admission (and the write, when it
        /// runs immediately).
        respond: Responder<()>,
    },
    /// Declare a subscription and issue the subscribe request.
    Subscribe {
        /// Channel name.
        channel: String,
        /// Channel parameters.
        params: Value,
        /// Acknowledged with the new subscription id.
        respond: Responder<SubscriptionId>,
    },
    /// Release a subscription.
    Unsubscribe {
        /// The subscription to release.
        id: SubscriptionId,
        /// Acknowledged once the unsubscribe request is admitted.
        respond: Responder<()>,
    },
    /// Authenticate with stored or freshly supplied credentials.
    Authenticate {
        /// Credentials to store on the session first, when given.
        credentials: Option<Credentials>,
        /// Acknowledged when the server answers the auth exchange.
        respond: Responder<()>,
    },
    /// Read the current machine status.
    Status {
        /// Carries the status back.
        respond: oneshot::Sender<ConnectionStatus>,
    },
    /// Take an immutable snapshot of the canonical session state.
    Snapshot {
        /// Carries the snapshot back.
        respond: oneshot::Sender<SessionSnapshot>,
    },
    /// Register a callback recipient.
    RegisterCallback {
        /// Recipient identity.
        id: CallbackId,
        /// Recipient channel.
        sender: CallbackSender,
        /// False when the id was already registered.
        respond: oneshot::Sender<bool>,
    },
    /// Remove a callback recipient.
    UnregisterCallback {
        /// Recipient identity.
        id: CallbackId,
        /// False when the id was unknown.
        respond: oneshot::Sender<bool>,
    },
    /// Clean close: close frame when upgraded, hard teardown otherwise.
    Close {
        /// Acknowledged once the close is underway.
        respond: Responder<()>,
    },
    /// Hand the transport to another runtime (two-phase protocol).
    TransferOwnership {
        /// The receiving runtime.
        to: RuntimeHandle,
        /// Deadline for the receiver's ready signal.
        ready_timeout: Duration,
        /// Acknowledged when the handoff completes (or is reclaimed).
        respond: Responder<()>,
    },
    /// Adopt a transport handed over by another runtime.
    ReceiveOwnership {
        /// The live transport handle.
        transport: TransportHandle,
        /// Its monitor.
        monitor: MonitorHandle,
        /// The upgraded WebSocket stream on that transport, when one exists.
        stream: Option<crate::transport::events::StreamRef>,
        /// Signalled once this runtime receives events.
        ready: oneshot::Sender<()>,
        /// Acknowledged with the adoption result.
        respond: Responder<()>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::SendFrame { .. } => "SendFrame",
            Command::Subscribe { .. } => "Subscribe",
            Command::Unsubscribe { .. } => "Unsubscribe",
            Command::Authenticate { .. } => "Authenticate",
            Command::Status { .. } => "Status",
            Command::Snapshot { .. } => "Snapshot",
            Command::RegisterCallback { .. } => "RegisterCallback",
            Command::UnregisterCallback { .. } => "UnregisterCallback",
            Command::Close { .. } => "Close",
            Command::TransferOwnership { .. } => "TransferOwnership",
            Command::ReceiveOwnership { .. } => "ReceiveOwnership",
        };
        f.write_str(name)
    }
}

/// # Runtime Handle
///
/// Cloneable mailbox sender for one connection runtime. The client facade
/// resolves stable connection ids to these through the registry; callers
/// never hold one directly.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl RuntimeHandle {
    pub(crate) fn new(cmd_tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { cmd_tx }
    }

    /// Enqueues a command; fails when the runtime is gone.
    pub fn send(&self, command: Command) -> Result<(), ClientError> {
        self.cmd_tx
            .send(command)
            .map_err(|_| ClientError::ConnectionNotFound)
    }

    async fn call<T>(
        &self,
        rx: oneshot::Receiver<Result<T, ClientError>>,
        deadline: Duration,
    ) -> Result<T, ClientError> {
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ConnectionNotFound),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Sends a frame, waiting up to `deadline` for admission.
    pub async fn send_frame(&self, frame: Frame, deadline: Duration) -> Result<(), ClientError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::SendFrame { frame, respond })?;
        self.call(rx, deadline).await
    }

    /// Declares a subscription.
    pub async fn subscribe(
        &self,
        channel: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<SubscriptionId, ClientError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            channel: channel.to_string(),
            params,
            respond,
        })?;
        self.call(rx, deadline).await
    }

    /// Releases a subscription.
    pub async fn unsubscribe(
        &self,
        id: SubscriptionId,
        deadline: Duration,
    ) -> Result<(), ClientError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::Unsubscribe { id, respond })?;
        self.call(rx, deadline).await
    }

    /// Runs the auth exchange.
    pub async fn authenticate(
        &self,
        credentials: Option<Credentials>,
        deadline: Duration,
    ) -> Result<(), ClientError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::Authenticate {
            credentials,
            respond,
        })?;
        self.call(rx, deadline).await
    }

    /// Reads the machine status.
    pub async fn status(&self, deadline: Duration) -> Result<ConnectionStatus, ClientError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::Status { respond })?;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(_)) => Err(ClientError::ConnectionNotFound),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Takes a session snapshot.
    pub async fn snapshot(&self, deadline: Duration) -> Result<SessionSnapshot, ClientError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::Snapshot { respond })?;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) => Err(ClientError::ConnectionNotFound),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Registers a callback recipient.
    pub async fn register_callback(
        &self,
        id: CallbackId,
        sender: CallbackSender,
        deadline: Duration,
    ) -> Result<bool, ClientError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::RegisterCallback {
            id,
            sender,
            respond,
        })?;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(fresh)) => Ok(fresh),
            Ok(Err(_)) => Err(ClientError::ConnectionNotFound),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Removes a callback recipient.
    pub async fn unregister_callback(
        &self,
        id: CallbackId,
        deadline: Duration,
    ) -> Result<bool, ClientError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::UnregisterCallback { id, respond })?;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(removed)) => Ok(removed),
            Ok(Err(_)) => Err(ClientError::ConnectionNotFound),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Closes the connection cleanly.
    pub async fn close(&self, deadline: Duration) -> Result<(), ClientError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::Close { respond })?;
        self.call(rx, deadline).await
    }

    /// Transfers transport ownership to another runtime.
    pub async fn transfer_ownership(
        &self,
        to: RuntimeHandle,
        deadline: Duration,
    ) -> Result<(), ClientError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::TransferOwnership {
            to,
            ready_timeout: deadline,
            respond,
        })?;
        // The handoff itself is bounded by `ready_timeout`; leave headroom
        // for the mailbox round-trip.
        self.call(rx, deadline + Duration::from_secs(1)).await
    }
}
