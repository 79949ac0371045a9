//! # Transport-Local Connection State
//!
//! Everything bound to a single transport instance: the handle/monitor pair,
//! the active streams, the machine status and the last error seen on this
//! transport. Discarded wholesale and rebuilt on every reconnect — canonical
//! session data (credentials, subscriptions, adapter state) deliberately has
//! no field here, so transport churn cannot take it down.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::status::ConnectionStatus;
use crate::transport::events::{DownReason, StreamRef};
use crate::transport::handle::{MonitorHandle, TransportHandle};

/// What a stream multiplexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// The upgraded WebSocket stream.
    Websocket,
    /// A plain HTTP exchange (a failed upgrade surfaces this way).
    Http,
}

/// Metadata kept per active stream.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Stream flavor.
    pub kind: StreamKind,
    /// When the stream was registered.
    pub opened_at: DateTime<Utc>,
}

/// # Connection State
///
/// Transport-local state for one connection. The transport handle and its
/// monitor are set and cleared together; a half-set pair would mean an
/// unobservable socket.
#[derive(Debug, Default)]
pub struct ConnectionState {
    status: ConnectionStatus,
    transport: Option<TransportHandle>,
    monitor: Option<MonitorHandle>,
    active_streams: HashMap<StreamRef, StreamInfo>,
    last_error: Option<DownReason>,
}

impl ConnectionState {
    /// Fresh state in `Initialized` with no transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current machine status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    /// The live transport handle, when one is attached.
    pub fn transport(&self) -> Option<&TransportHandle> {
        self.transport.as_ref()
    }

    /// The monitor for the attached transport.
    pub fn monitor(&self) -> Option<&MonitorHandle> {
        self.monitor.as_ref()
    }

    /// Attaches a transport handle together with its monitor.
    pub fn attach_transport(&mut self, handle: TransportHandle, monitor: MonitorHandle) {
        self.transport = Some(handle);
        self.monitor = Some(monitor);
    }

    /// Detaches the handle/monitor pair and drops all streams, returning the
    /// handle so the caller can still close it.
    pub fn detach_transport(&mut self) -> Option<TransportHandle> {
        self.monitor = None;
        self.active_streams.clear();
        self.transport.take()
    }

    /// True when a handle/monitor pair is attached.
    pub fn has_transport(&self) -> bool {
        // attach/detach keep these in lock-step.
        debug_assert_eq!(self.transport.is_some(), self.monitor.is_some());
        self.transport.is_some()
    }

    /// Registers a stream minted by the transport.
    pub fn register_stream(&mut self, stream: StreamRef, kind: StreamKind) {
        self.active_streams.insert(
            stream,
            StreamInfo {
                kind,
                opened_at: Utc::now(),
            },
        );
    }

    /// Removes the given streams (transport death reports the set it killed).
    pub fn remove_streams(&mut self, streams: &[StreamRef]) {
        for stream in streams {
            self.active_streams.remove(stream);
        }
    }

    /// Metadata for one stream.
    pub fn stream(&self, stream: &StreamRef) -> Option<&StreamInfo> {
        self.active_streams.get(stream)
    }

    /// All active streams.
    pub fn active_streams(&self) -> &HashMap<StreamRef, StreamInfo> {
        &self.active_streams
    }

    /// The WebSocket stream, when the upgrade has completed. There is at
    /// most one per transport instance.
    pub fn websocket_stream(&self) -> Option<StreamRef> {
        self.active_streams
            .iter()
            .find(|(_, info)| info.kind == StreamKind::Websocket)
            .map(|(stream, _)| *stream)
    }

    /// Last error observed on this transport instance.
    pub fn last_error(&self) -> Option<&DownReason> {
        self.last_error.as_ref()
    }

    pub(crate) fn record_error(&mut self, reason: DownReason) {
        self.last_error = Some(reason);
    }

    /// Clears the error record when a fresh transport instance is spawned;
    /// the field is transport-local and must not outlive the instance it
    /// was observed on.
    pub(crate) fn clear_error(&mut self) {
        self.last_error = None;
    }
}
