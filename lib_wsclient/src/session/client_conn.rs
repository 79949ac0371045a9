//! # Canonical Session State
//!
//! [`ClientConn`] is the state that survives transport churn: identity,
//! endpoints, credentials, declared subscriptions, behavior modules,
//! callback recipients and the reconnection policy. The transport-local
//! `ConnectionState` is rebuilt from scratch on every reconnect; nothing in
//! this struct is.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::credentials::Credentials;
use super::subscription::{Subscription, SubscriptionId, SubscriptionStatus};
use crate::behaviors::HandlerSet;
use crate::codec::Frame;
use crate::configs::{TransportKind, TransportOpts};
use crate::core::status::ConnectionStatus;
use crate::reconnect::ReconnectPolicy;
use crate::transport::events::{DownReason, StreamRef};
use crate::transport::handle::TransportHandle;

/// Stable connection identifier. Immutable for the life of the session;
/// consumers hold this, never the runtime task behind it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Mints a fresh random identifier.
    pub fn mint() -> Self {
        ConnectionId(format!("conn-{:012x}", rand::rng().random::<u64>() >> 16))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One target endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Upgrade request path (including any query string).
    pub path: String,
    /// Socket flavor.
    pub transport: TransportKind,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match self.transport {
            TransportKind::Plaintext => "ws",
            TransportKind::Tls => "wss",
        };
        write!(f, "{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

/// Identifier of one registered callback recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

impl CallbackId {
    /// Mints a fresh identifier.
    pub fn mint() -> Self {
        CallbackId(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Channel end that receives [`CallbackEvent`]s.
pub type CallbackSender = mpsc::UnboundedSender<CallbackEvent>;

/// Events delivered to registered callback recipients.
#[derive(Debug, Clone)]
pub enum CallbackEvent {
    /// The socket is up (pre-upgrade).
    ConnectionUp {
        /// Negotiated wire protocol.
        protocol: String,
    },
    /// The transport died.
    ConnectionDown {
        /// Classified reason.
        reason: DownReason,
    },
    /// The WebSocket upgrade completed.
    WebsocketUpgrade {
        /// The upgraded stream.
        stream: StreamRef,
        /// Upgrade response headers.
        headers: Vec<(String, String)>,
    },
    /// An inbound frame.
    WebsocketFrame {
        /// The stream the frame arrived on.
        stream: StreamRef,
        /// The decoded frame.
        frame: Frame,
    },
    /// A transport fault.
    TransportError {
        /// The stream involved, when stream-scoped.
        stream: Option<StreamRef>,
        /// Fault description.
        reason: String,
    },
    /// Plain HTTP response (failed upgrade path).
    HttpResponse {
        /// The stream the response belongs to.
        stream: StreamRef,
        /// Whether this is the final part.
        fin: bool,
        /// HTTP status.
        status: u16,
        /// Response headers.
        headers: Vec<(String, String)>,
    },
    /// Plain HTTP body data.
    HttpData {
        /// The stream the data belongs to.
        stream: StreamRef,
        /// Whether this is the final chunk.
        fin: bool,
        /// Raw bytes.
        data: Bytes,
    },
}

/// Per-behavior free-form settings bags. Keys that do not belong in the
/// transport options map land here, addressed to one behavior.
#[derive(Debug, Clone, Default)]
pub struct HandlerSettings {
    /// ConnectionHandler settings.
    pub connection: Map<String, Value>,
    /// MessageHandler settings.
    pub message: Map<String, Value>,
    /// ErrorHandler settings.
    pub error: Map<String, Value>,
    /// AuthHandler settings.
    pub auth: Map<String, Value>,
    /// SubscriptionHandler settings.
    pub subscription: Map<String, Value>,
    /// RateLimitHandler settings.
    pub rate_limit: Map<String, Value>,
    /// LoggingHandler settings.
    pub logging: Map<String, Value>,
    /// MetricsCollector settings.
    pub metrics: Map<String, Value>,
}

/// Immutable view of the session handed to external observers.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Stable connection identifier.
    pub id: ConnectionId,
    /// Status at snapshot time.
    pub status: ConnectionStatus,
    /// All declared subscriptions with their histories.
    pub subscriptions: Vec<Subscription>,
    /// Last recorded session error.
    pub last_error: Option<DownReason>,
    /// Reconnection attempts consumed since the last successful connect.
    pub reconnect_attempts: u32,
}

/// # Client Connection (canonical state)
///
/// Owned by the connection runtime; external readers only ever see a
/// [`SessionSnapshot`]. Holds no live socket state beyond a mirror of the
/// current status/stream used for ownership transfer.
pub struct ClientConn {
    /// Stable identifier, immutable for the session's life.
    pub id: ConnectionId,
    /// Ordered target endpoints; the runtime connects to the first.
    pub endpoints: Vec<Endpoint>,
    /// Authentication material, if provided.
    pub credentials: Option<Credentials>,
    /// Free-form keyed bag owned by user handlers.
    pub adapter_state: Map<String, Value>,
    /// Declared subscriptions keyed by id.
    pub subscriptions: HashMap<SubscriptionId, Subscription>,
    /// The eight behavior modules.
    pub handlers: HandlerSet,
    /// Registered callback recipients (a set: one entry per id).
    pub callbacks: HashMap<CallbackId, CallbackSender>,
    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,
    /// Normalized transport options.
    pub transport_opts: TransportOpts,
    /// Extra upgrade request headers.
    pub headers: Vec<(String, String)>,
    /// Last session-level error.
    pub last_error: Option<DownReason>,
    /// Per-behavior settings bags.
    pub settings: HandlerSettings,
    /// Mirror of the transport-local status (kept by StateSync).
    pub status: ConnectionStatus,
    /// Mirror of the live transport handle (kept by StateSync; used for
    /// ownership transfer).
    pub transport: Option<TransportHandle>,
    /// Mirror of the main WebSocket stream (kept by StateSync).
    pub main_stream: Option<StreamRef>,
}

impl ClientConn {
    /// A fresh session with no subscriptions or callbacks.
    pub fn new(endpoints: Vec<Endpoint>, handlers: HandlerSet, reconnect: ReconnectPolicy) -> Self {
        Self {
            id: ConnectionId::mint(),
            endpoints,
            credentials: None,
            adapter_state: Map::new(),
            subscriptions: HashMap::new(),
            handlers,
            callbacks: HashMap::new(),
            reconnect,
            transport_opts: TransportOpts::default(),
            headers: Vec::new(),
            last_error: None,
            settings: HandlerSettings::default(),
            status: ConnectionStatus::Initialized,
            transport: None,
            main_stream: None,
        }
    }

    /// The endpoint the runtime connects to.
    pub fn primary_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints.first()
    }

    // --- Subscriptions ---

    /// Declares a new pending subscription and returns its id.
    pub fn add_subscription(&mut self, channel: &str, params: Value) -> SubscriptionId {
        let subscription = Subscription::new(channel, params);
        let id = subscription.id.clone();
        self.subscriptions.insert(id.clone(), subscription);
        id
    }

    /// Looks up a subscription.
    pub fn subscription(&self, id: &SubscriptionId) -> Option<&Subscription> {
        self.subscriptions.get(id)
    }

    /// Moves a subscription to a new status. Returns false for unknown ids.
    pub fn mark_subscription(&mut self, id: &SubscriptionId, status: SubscriptionStatus) -> bool {
        match self.subscriptions.get_mut(id) {
            Some(subscription) => {
                subscription.set_status(status);
                true
            }
            None => false,
        }
    }

    /// Ids of all confirmed subscriptions (the set re-issued after a
    /// reconnect). Order is unspecified.
    pub fn confirmed_subscriptions(&self) -> Vec<SubscriptionId> {
        self.subscriptions
            .values()
            .filter(|subscription| subscription.is_active())
            .map(|subscription| subscription.id.clone())
            .collect()
    }

    /// Ids of pending subscriptions older than the timeout window.
    pub fn timed_out_subscriptions(&self, now: DateTime<Utc>, window_secs: u64) -> Vec<SubscriptionId> {
        let window = ChronoDuration::seconds(window_secs as i64);
        self.subscriptions
            .values()
            .filter(|subscription| {
                subscription.status == SubscriptionStatus::Pending
                    && now - subscription.status_since > window
            })
            .map(|subscription| subscription.id.clone())
            .collect()
    }

    // --- Callbacks ---

    /// Registers a callback recipient. Returns false when the id is already
    /// registered (the set holds no duplicates).
    pub fn register_callback(&mut self, id: CallbackId, sender: CallbackSender) -> bool {
        if self.callbacks.contains_key(&id) {
            return false;
        }
        self.callbacks.insert(id, sender);
        true
    }

    /// Removes a callback recipient. Returns false for unknown ids.
    pub fn unregister_callback(&mut self, id: &CallbackId) -> bool {
        self.callbacks.remove(id).is_some()
    }

    /// Fans an event out to every registered recipient, dropping recipients
    /// whose channel has closed.
    pub fn notify_callbacks(&mut self, event: &CallbackEvent) {
        self.callbacks
            .retain(|id, sender| match sender.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    log::debug!("callback {:?} disconnected, removing", id);
                    false
                }
            });
    }

    /// Immutable snapshot for external observers.
    pub fn snapshot(&self, reconnect_attempts: u32) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            status: self.status,
            subscriptions: self.subscriptions.values().cloned().collect(),
            last_error: self.last_error.clone(),
            reconnect_attempts,
        }
    }
}

impl std::fmt::Debug for ClientConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConn")
            .field("id", &self.id)
            .field("endpoints", &self.endpoints)
            .field("status", &self.status)
            .field("subscriptions", &self.subscriptions.len())
            .field("callbacks", &self.callbacks.len())
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conn() -> ClientConn {
        ClientConn::new(
            vec![Endpoint {
                host: "exchange.test".to_string(),
                port: 443,
                path: "/ws/api/v2".to_string(),
                transport: TransportKind::Tls,
            }],
            HandlerSet::default(),
            ReconnectPolicy::default(),
        )
    }

    #[test]
    fn callback_set_holds_no_duplicates() {
        let mut conn = conn();
        let id = CallbackId::mint();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(conn.register_callback(id, tx.clone()));
        assert!(!conn.register_callback(id, tx));
        assert_eq!(conn.callbacks.len(), 1);
        assert!(conn.unregister_callback(&id));
        assert!(!conn.unregister_callback(&id));
    }

    #[test]
    fn dead_callbacks_are_pruned_on_notify() {
        let mut conn = conn();
        let id = CallbackId::mint();
        let (tx, rx) = mpsc::unbounded_channel();
        conn.register_callback(id, tx);
        drop(rx);
        conn.notify_callbacks(&CallbackEvent::ConnectionUp {
            protocol: "http".to_string(),
        });
        assert!(conn.callbacks.is_empty());
    }

    #[test]
    fn confirmed_set_tracks_status() {
        let mut conn = conn();
        let a = conn.add_subscription("book.BTC", json!({}));
        let b = conn.add_subscription("trades.ETH", json!({}));
        assert!(conn.confirmed_subscriptions().is_empty());

        conn.mark_subscription(&a, SubscriptionStatus::Confirmed);
        conn.mark_subscription(&b, SubscriptionStatus::Failed);
        assert_eq!(conn.confirmed_subscriptions(), vec![a.clone()]);

        conn.mark_subscription(&a, SubscriptionStatus::Unsubscribed);
        assert!(conn.confirmed_subscriptions().is_empty());
    }

    #[test]
    fn endpoint_renders_as_url() {
        let conn = conn();
        assert_eq!(
            conn.primary_endpoint().unwrap().to_string(),
            "wss://exchange.test:443/ws/api/v2"
        );
    }
}
