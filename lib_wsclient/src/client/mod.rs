//! # Client Facade
//!
//! The user-facing surface: open a supervised connection, then address it by
//! its stable id. Every call resolves the id through the registry and talks
//! to the runtime mailbox with an explicit deadline; expiry surfaces as
//! `timeout` to the caller while the in-flight work at the actor proceeds.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::behaviors::HandlerSet;
use crate::codec::{Frame, FrameCodec};
use crate::configs::{self, RetryLimit, TransportKind};
use crate::core::status::ConnectionStatus;
use crate::core::supervisor::{ConnectionSupervisor, SupervisorConfig};
use crate::limiter::RateLimiterConfig;
use crate::reconnect::ReconnectPolicy;
use crate::runtime::{ClientError, RuntimeConfig, RuntimeHandle};
use crate::session::{
    CallbackId, CallbackSender, ClientConn, ConnectionId, Credentials, Endpoint, SessionSnapshot,
    SubscriptionId,
};
use crate::transport::handle::{MonitorHandle, TransportHandle};

/// Everything `open` accepts besides the URL. `Default` gives a plaintext
/// connection with default handlers, exponential backoff and a 60-token
/// limiter.
pub struct OpenOptions {
    /// Raw transport options map (whitelisted keys: `transport`,
    /// `protocols`, `retry`, `ws_opts`, `backoff_type`, `base_backoff`).
    pub transport_opts: Value,
    /// Extra upgrade request headers.
    pub headers: Vec<(String, String)>,
    /// Initial callback recipient for connection events.
    pub callback: Option<CallbackSender>,
    /// Reconnection policy; derived from the transport options when absent.
    pub reconnection: Option<ReconnectPolicy>,
    /// The eight behavior modules.
    pub handlers: HandlerSet,
    /// Credentials stored on the session for later `authenticate` calls.
    pub credentials: Option<Credentials>,
    /// Rate limiter configuration.
    pub limiter: RateLimiterConfig,
    /// Window after which a pending subscription times out.
    pub subscription_timeout_secs: u64,
    /// Client heartbeat interval, when enabled.
    pub ping_interval: Option<Duration>,
    /// Silent-failure watchdog window, when enabled.
    pub inactivity_timeout: Option<Duration>,
    /// Default deadline applied to facade calls.
    pub call_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            transport_opts: Value::Null,
            headers: Vec::new(),
            callback: None,
            reconnection: None,
            handlers: HandlerSet::default(),
            credentials: None,
            limiter: RateLimiterConfig::default(),
            subscription_timeout_secs: 30,
            ping_interval: None,
            inactivity_timeout: None,
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// # WebSocket Client
///
/// Holds the supervisor, the shared frame codec and the default call
/// deadline. Cheap to share behind an `Arc`; all per-connection state lives
/// in the runtimes.
pub struct WsClient {
    supervisor: ConnectionSupervisor,
    codec: FrameCodec,
    call_timeout: Duration,
}

impl Default for WsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WsClient {
    /// A client with the default supervisor restart budget.
    pub fn new() -> Self {
        Self::with_supervisor(SupervisorConfig::default())
    }

    /// A client with an explicit restart budget.
    pub fn with_supervisor(config: SupervisorConfig) -> Self {
        Self {
            supervisor: ConnectionSupervisor::new(config),
            codec: FrameCodec::new(),
            call_timeout: Duration::from_secs(5),
        }
    }

    /// The shared frame codec (register opcode handlers here).
    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Opens a supervised connection and returns its stable id.
    pub async fn open(&self, url: &str, options: OpenOptions) -> Result<ConnectionId, ClientError> {
        let transport_opts = configs::parse_and_validate(&options.transport_opts)?;
        let endpoint = parse_endpoint(url, &transport_opts.transport)?;

        let reconnect = options.reconnection.unwrap_or_else(|| {
            // Derive the policy from the transport options the way the
            // defaults document it: backoff curve + base delay + retry
            // budget.
            ReconnectPolicy {
                strategy: transport_opts.backoff_type,
                base_delay_ms: transport_opts.base_backoff,
                max_delay_ms: 30_000,
                max_attempts: match transport_opts.retry {
                    RetryLimit::Finite(count) => Some(count),
                    RetryLimit::Infinite => None,
                },
                jitter_factor: 0.1,
            }
        });

        let mut conn = ClientConn::new(vec![endpoint], options.handlers, reconnect);
        conn.transport_opts = transport_opts;
        conn.headers = options.headers;
        conn.credentials = options.credentials;
        if let Some(callback) = options.callback {
            conn.register_callback(CallbackId::mint(), callback);
        }

        let runtime_config = RuntimeConfig {
            limiter: options.limiter,
            subscription_timeout_secs: options.subscription_timeout_secs,
            transport_up_timeout: Duration::from_secs(5),
            ping_interval: options.ping_interval,
            inactivity_timeout: options.inactivity_timeout,
        };
        let id = self
            .supervisor
            .start_connection(conn, self.codec.clone(), runtime_config)?;
        Ok(id)
    }

    /// Closes a connection cleanly and releases its id.
    pub async fn close(&self, id: &ConnectionId) -> Result<(), ClientError> {
        self.handle(id)?.close(self.call_timeout).await
    }

    /// Sends a frame on the connection's WebSocket stream.
    pub async fn send_frame(&self, id: &ConnectionId, frame: Frame) -> Result<(), ClientError> {
        self.send_frame_deadline(id, frame, self.call_timeout).await
    }

    /// `send_frame` with an explicit deadline.
    pub async fn send_frame_deadline(
        &self,
        id: &ConnectionId,
        frame: Frame,
        deadline: Duration,
    ) -> Result<(), ClientError> {
        self.handle(id)?.send_frame(frame, deadline).await
    }

    /// Sends a text frame.
    pub async fn send_text(&self, id: &ConnectionId, text: &str) -> Result<(), ClientError> {
        self.send_frame(id, Frame::Text(text.to_string())).await
    }

    /// Declares a subscription and returns its id.
    pub async fn subscribe(
        &self,
        id: &ConnectionId,
        channel: &str,
        params: Value,
    ) -> Result<SubscriptionId, ClientError> {
        self.handle(id)?
            .subscribe(channel, params, self.call_timeout)
            .await
    }

    /// Releases a subscription.
    pub async fn unsubscribe(
        &self,
        id: &ConnectionId,
        subscription: SubscriptionId,
    ) -> Result<(), ClientError> {
        self.handle(id)?
            .unsubscribe(subscription, self.call_timeout)
            .await
    }

    /// Runs the auth exchange; waits for the server's answer.
    pub async fn authenticate(
        &self,
        id: &ConnectionId,
        credentials: Option<Credentials>,
        deadline: Duration,
    ) -> Result<(), ClientError> {
        self.handle(id)?.authenticate(credentials, deadline).await
    }

    /// Reads the connection's machine status.
    pub async fn status(&self, id: &ConnectionId) -> Result<ConnectionStatus, ClientError> {
        self.handle(id)?.status(self.call_timeout).await
    }

    /// Takes an immutable snapshot of the session state.
    pub async fn snapshot(&self, id: &ConnectionId) -> Result<SessionSnapshot, ClientError> {
        self.handle(id)?.snapshot(self.call_timeout).await
    }

    /// Registers an additional callback recipient.
    pub async fn register_callback(
        &self,
        id: &ConnectionId,
        sender: CallbackSender,
    ) -> Result<CallbackId, ClientError> {
        let callback_id = CallbackId::mint();
        self.handle(id)?
            .register_callback(callback_id, sender, self.call_timeout)
            .await?;
        Ok(callback_id)
    }

    /// Removes a callback recipient. Returns false for unknown ids.
    pub async fn unregister_callback(
        &self,
        id: &ConnectionId,
        callback: CallbackId,
    ) -> Result<bool, ClientError> {
        self.handle(id)?
            .unregister_callback(callback, self.call_timeout)
            .await
    }

    /// Hands the transport of `from` to the runtime behind `to` using the
    /// two-phase ownership protocol.
    pub async fn transfer_ownership(
        &self,
        from: &ConnectionId,
        to: &ConnectionId,
    ) -> Result<(), ClientError> {
        if from == to {
            return Err(ClientError::TransferFailed(
                "cannot transfer a transport to its own runtime".to_string(),
            ));
        }
        let source = self.handle(from)?;
        let target = self.handle(to)?;
        source.transfer_ownership(target, self.call_timeout).await
    }

    /// Adopts a transport handle into the runtime behind `id` (the receiving
    /// half of an out-of-band handoff).
    pub async fn receive_ownership(
        &self,
        id: &ConnectionId,
        transport: TransportHandle,
        monitor: MonitorHandle,
        stream: Option<crate::transport::StreamRef>,
    ) -> Result<(), ClientError> {
        let handle = self.handle(id)?;
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let (respond, respond_rx) = tokio::sync::oneshot::channel();
        handle.send(crate::runtime::Command::ReceiveOwnership {
            transport,
            monitor,
            stream,
            ready: ready_tx,
            respond,
        })?;
        let _ = ready_rx;
        match tokio::time::timeout(self.call_timeout, respond_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ConnectionNotFound),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Closes every connection and stops further restarts.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }

    fn handle(&self, id: &ConnectionId) -> Result<RuntimeHandle, ClientError> {
        self.supervisor
            .registry()
            .lookup(id)
            .ok_or(ClientError::ConnectionNotFound)
    }
}

fn parse_endpoint(url: &str, fallback: &TransportKind) -> Result<Endpoint, ClientError> {
    let parsed = Url::parse(url).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
    let transport = match parsed.scheme() {
        "ws" | "http" => TransportKind::Plaintext,
        "wss" | "https" => TransportKind::Tls,
        "" => *fallback,
        other => return Err(ClientError::InvalidUrl(format!("unsupported scheme '{}'", other))),
    };
    let host = parsed
        .host_str()
        .ok_or_else(|| ClientError::InvalidUrl("missing host".to_string()))?
        .to_string();
    let port = parsed.port_or_known_default().unwrap_or(match transport {
        TransportKind::Plaintext => 80,
        TransportKind::Tls => 443,
    });
    let mut path = parsed.path().to_string();
    if path.is_empty() {
        path.push('/');
    }
    if let Some(query) = parsed.query() {
        path.push('?');
        path.push_str(query);
    }
    Ok(Endpoint {
        host,
        port,
        path,
        transport,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parsing() {
        let endpoint = parse_endpoint("wss://venue.example/ws/api/v2?x=1", &TransportKind::Plaintext)
            .unwrap();
        assert_eq!(endpoint.host, "venue.example");
        assert_eq!(endpoint.port, 443);
        assert_eq!(endpoint.path, "/ws/api/v2?x=1");
        assert_eq!(endpoint.transport, TransportKind::Tls);

        let endpoint = parse_endpoint("ws://127.0.0.1:9001/stream", &TransportKind::Plaintext).unwrap();
        assert_eq!(endpoint.port, 9001);
        assert_eq!(endpoint.transport, TransportKind::Plaintext);

        assert!(parse_endpoint("ftp://venue.example", &TransportKind::Plaintext).is_err());
    }
}
