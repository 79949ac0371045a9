//! # Connection Runtime
//!
//! The per-connection actor. One task owns the canonical session state and
//! the transport-local state, and serializes everything that touches them:
//! user commands from the mailbox, transport events, the rate-limiter tick,
//! the subscription-timeout scan, the reconnect timer and the transport
//! monitor. All network I/O happens in the transport task; the runtime only
//! issues commands to it.
//!
//! ## Core Components:
//! - **`commands`**: the typed mailbox ([`Command`]) and the
//!   [`RuntimeHandle`] the client facade talks through.
//! - **[`ConnectionRuntime`]**: the actor itself and its `run` loop.
//!
//! Outbound frames pass the rate limiter before they reach the transport;
//! deferred sends keep their acknowledgement channel inside the limiter
//! queue, so callers simply observe their deadline if the queue is slow.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// The typed mailbox and runtime handle.
pub mod commands;

// --- Public API Re-exports ---
pub use commands::{ClientError, Command, Responder, RuntimeHandle};

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::behaviors::AuthOutcome;
use crate::bridge::{BehaviorBridge, BridgeDirective};
use crate::codec::{Frame, FrameCodec};
use crate::core::manager::{ConnectionManager, ReconnectError, TransitionParams};
use crate::core::state::StreamKind;
use crate::core::status::ConnectionStatus;
use crate::limiter::{RateDecision, RateLimitError, RateLimiter, RateLimiterConfig, RateRequest, RejectReason};
use crate::session::{CallbackEvent, ClientConn, SubscriptionStatus};
use crate::sync::StateSync;
use crate::transport::events::{DownReason, StreamRef, TransportEvent};
use crate::transport::handle::TransportError;

/// Runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Rate limiter configuration.
    pub limiter: RateLimiterConfig,
    /// Window after which a pending subscription times out.
    pub subscription_timeout_secs: u64,
    /// Bounded wait for transport-up during establishment.
    pub transport_up_timeout: Duration,
    /// Client heartbeat: a Ping frame every interval while upgraded.
    pub ping_interval: Option<Duration>,
    /// Silent-failure watchdog: force a reconnect when no traffic arrives
    /// within the window.
    pub inactivity_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            limiter: RateLimiterConfig::default(),
            subscription_timeout_secs: 30,
            transport_up_timeout: Duration::from_secs(5),
            ping_interval: None,
            inactivity_timeout: None,
        }
    }
}

/// How the runtime's task ended. The supervisor restarts `Stopped` exits
/// (transient policy) and lets `Clean` ones go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    /// Closed by the user or all handles dropped.
    Clean,
    /// A behavior directed the runtime to stop.
    Stopped {
        /// Stop reason.
        reason: String,
    },
}

/// An outbound frame waiting on (or released by) the rate limiter.
struct PendingSend {
    frame: Frame,
    stream: Option<StreamRef>,
    respond: Option<Responder<()>>,
}

/// # Connection Runtime
///
/// Owns one [`ClientConn`] and one [`ConnectionManager`]; everything is
/// mutated from the single `run` loop.
pub struct ConnectionRuntime {
    conn: ClientConn,
    manager: ConnectionManager,
    codec: FrameCodec,
    limiter: RateLimiter<PendingSend>,
    config: RuntimeConfig,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_rx: mpsc::UnboundedReceiver<TransportEvent>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    reconnect_at: Option<tokio::time::Instant>,
    pending_auth: Option<Responder<()>>,
    last_activity: Instant,
    exit: Option<RunExit>,
    limiter_tick: tokio::time::Interval,
    scan_tick: tokio::time::Interval,
    ping_tick: tokio::time::Interval,
}

impl ConnectionRuntime {
    /// Builds the actor and its mailbox handle. The caller registers the
    /// handle (so the stable id resolves before any command is accepted)
    /// and then spawns [`run`](Self::run).
    pub fn new(
        conn: ClientConn,
        codec: FrameCodec,
        config: RuntimeConfig,
    ) -> Result<(Self, RuntimeHandle), RateLimitError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let limiter = RateLimiter::new(config.limiter.clone(), Instant::now())?;
        let manager = ConnectionManager::new(conn.reconnect.clone());
        let limiter_tick = tokio::time::interval(config.limiter.refill_interval);
        let scan_tick = tokio::time::interval(Duration::from_secs(1));
        let ping_tick = tokio::time::interval(
            config
                .ping_interval
                .unwrap_or_else(|| Duration::from_secs(24 * 3600)),
        );
        let runtime = Self {
            conn,
            manager,
            codec,
            limiter,
            config,
            cmd_rx,
            event_rx,
            event_tx,
            reconnect_at: None,
            pending_auth: None,
            last_activity: Instant::now(),
            exit: None,
            limiter_tick,
            scan_tick,
            ping_tick,
        };
        let handle = RuntimeHandle::new(cmd_tx);
        Ok((runtime, handle))
    }

    /// Convenience: build and spawn in one step.
    pub fn spawn(
        conn: ClientConn,
        codec: FrameCodec,
        config: RuntimeConfig,
    ) -> Result<(RuntimeHandle, JoinHandle<(RunExit, ClientConn)>), RateLimitError> {
        let (runtime, handle) = Self::new(conn, codec, config)?;
        let join = tokio::spawn(runtime.run());
        Ok((handle, join))
    }

    /// The actor loop. Runs until the user closes the connection, every
    /// handle is dropped, or a behavior directs a stop. The canonical
    /// session state is handed back so a supervisor restart preserves it.
    pub async fn run(mut self) -> (RunExit, ClientConn) {
        if let Err(err) = self.start_connection().await {
            log::warn!("{}: initial connect failed: {}", self.conn.id, err);
            self.schedule_reconnect();
        }
        loop {
            if let Some(exit) = self.exit.take() {
                log::info!("{}: runtime exiting ({:?})", self.conn.id, exit);
                return (exit, self.conn);
            }
            let monitor = self.manager.state().monitor().cloned();
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => return (RunExit::Clean, self.conn),
                },
                event = self.event_rx.recv() => {
                    if let Some(event) = event {
                        self.on_transport_event(event).await;
                    }
                },
                _ = async {
                    match &monitor {
                        Some(monitor) => monitor.down().await,
                        None => std::future::pending().await,
                    }
                }, if monitor.is_some() => {
                    self.on_monitor_down().await;
                },
                _ = tokio::time::sleep_until(
                    reconnect_at.unwrap_or_else(tokio::time::Instant::now)
                ), if reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.attempt_reconnect().await;
                },
                _ = self.limiter_tick.tick() => self.drain_limiter().await,
                _ = self.scan_tick.tick() => self.periodic_scan().await,
                _ = self.ping_tick.tick() => self.send_heartbeat().await,
            }
        }
    }

    // --- Connection establishment ---

    /// Opens a transport, waits (bounded) for transport-up and publishes the
    /// resulting lifecycle events. Connect failures land in `Disconnected`
    /// with the reason recorded, so `handle_reconnection` can rule on them.
    async fn start_connection(&mut self) -> Result<(), ClientError> {
        let from = self.manager.status();
        self.manager
            .transition(ConnectionStatus::Connecting, TransitionParams::default())
            .map_err(|_| ClientError::InvalidState(from))?;

        let transport_config = match StateSync::extract_transport_state(&self.conn) {
            Some(config) => config,
            None => {
                let _ = self.manager.transition(
                    ConnectionStatus::Error,
                    TransitionParams::with_reason(DownReason::Fatal(
                        "no endpoint configured".to_string(),
                    )),
                );
                StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
                return Err(ClientError::InvalidState(ConnectionStatus::Error));
            }
        };

        log::info!(
            "{}: connecting to {}:{}{}",
            self.conn.id,
            transport_config.host,
            transport_config.port,
            transport_config.path
        );
        let (handle, monitor) = crate::transport::actor::spawn(transport_config, self.event_tx.clone());
        self.manager.state_mut().clear_error();
        self.manager.state_mut().attach_transport(handle, monitor);
        StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);

        let deadline = tokio::time::Instant::now() + self.config.transport_up_timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.event_rx.recv()).await {
                Ok(Some(TransportEvent::Up { protocol })) => {
                    self.on_transport_up(&protocol).await;
                    return Ok(());
                }
                Ok(Some(TransportEvent::Down {
                    reason,
                    killed_streams,
                })) => {
                    self.manager.state_mut().remove_streams(&killed_streams);
                    self.manager.state_mut().detach_transport();
                    let _ = self.manager.transition(
                        ConnectionStatus::Disconnected,
                        TransitionParams::with_reason(reason.clone()),
                    );
                    StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
                    self.conn.notify_callbacks(&CallbackEvent::ConnectionDown {
                        reason: reason.clone(),
                    });
                    return Err(ClientError::Transport(TransportError::Connect(
                        reason.to_string(),
                    )));
                }
                Ok(Some(other)) => self.on_transport_event(other).await,
                Ok(None) => return Err(ClientError::ConnectionNotFound),
                Err(_) => {
                    if let Some(handle) = self.manager.state_mut().detach_transport() {
                        handle.shutdown();
                    }
                    let _ = self.manager.transition(
                        ConnectionStatus::Disconnected,
                        TransitionParams::with_reason(DownReason::Timeout),
                    );
                    StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
                    return Err(ClientError::Transport(TransportError::Timeout));
                }
            }
        }
    }

    async fn attempt_reconnect(&mut self) {
        if self.manager.status() != ConnectionStatus::Reconnecting {
            return;
        }
        if let Err(err) = self.start_connection().await {
            log::warn!("{}: reconnect attempt failed: {}", self.conn.id, err);
            self.schedule_reconnect();
        }
    }

    /// Tears down any live transport before a reconnect decision: a
    /// behavior may direct a reconnect while the socket is still up.
    fn ensure_disconnected(&mut self) {
        if let Some(handle) = self.manager.state_mut().detach_transport() {
            handle.shutdown();
        }
        if matches!(
            self.manager.status(),
            ConnectionStatus::Connecting
                | ConnectionStatus::Connected
                | ConnectionStatus::WebsocketConnected
        ) {
            let _ = self
                .manager
                .transition(ConnectionStatus::Disconnected, TransitionParams::default());
        }
    }

    fn schedule_reconnect(&mut self) {
        self.ensure_disconnected();
        match self.manager.handle_reconnection() {
            Ok(delay) => {
                self.conn
                    .handlers
                    .metrics
                    .increment_counter("reconnect_attempts", 1);
                log::info!(
                    "{}: reconnecting in {}ms (attempt {})",
                    self.conn.id,
                    delay.as_millis(),
                    self.manager.attempts()
                );
                self.reconnect_at = Some(tokio::time::Instant::now() + delay);
                StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
            }
            Err(err) => self.on_reconnect_refused(err),
        }
    }

    fn on_reconnect_refused(&mut self, err: ReconnectError) {
        self.reconnect_at = None;
        StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
        self.conn.handlers.logging.log_error_event(
            "reconnect_refused",
            &json!({"connection": self.conn.id.to_string(), "reason": err.to_string()}),
        );
        log::error!("{}: will not reconnect: {}", self.conn.id, err);
    }

    // --- Transport events ---

    async fn on_transport_event(&mut self, event: TransportEvent) {
        if self.manager.status() == ConnectionStatus::Closed {
            return;
        }
        match event {
            TransportEvent::Up { protocol } => self.on_transport_up(&protocol).await,
            TransportEvent::WsUpgrade { stream, headers } => {
                self.on_ws_upgrade(stream, headers).await
            }
            TransportEvent::WsFrame { stream, message } => {
                self.on_ws_frame(stream, message).await
            }
            TransportEvent::Down {
                reason,
                killed_streams,
            } => self.handle_transport_down(reason, killed_streams).await,
            TransportEvent::Failed { stream, reason } => {
                self.conn.notify_callbacks(&CallbackEvent::TransportError {
                    stream,
                    reason: reason.clone(),
                });
                let context = match stream {
                    Some(stream) => json!({"stream": stream.to_string()}),
                    None => Value::Null,
                };
                let directive = BehaviorBridge::on_transport_error(&reason, context, &mut self.conn);
                self.apply_directive(directive).await;
            }
            TransportEvent::HttpResponse {
                stream,
                fin,
                status,
                headers,
            } => {
                self.manager.state_mut().register_stream(stream, StreamKind::Http);
                self.conn.notify_callbacks(&CallbackEvent::HttpResponse {
                    stream,
                    fin,
                    status,
                    headers,
                });
            }
            TransportEvent::HttpData { stream, fin, data } => {
                self.conn
                    .notify_callbacks(&CallbackEvent::HttpData { stream, fin, data });
            }
        }
    }

    async fn on_transport_up(&mut self, protocol: &str) {
        let _ = self
            .manager
            .transition(ConnectionStatus::Connected, TransitionParams::default());
        StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
        self.conn.notify_callbacks(&CallbackEvent::ConnectionUp {
            protocol: protocol.to_string(),
        });
        self.conn
            .handlers
            .metrics
            .increment_counter("transport_up", 1);
        self.conn.handlers.logging.log_connection_event(
            "transport_up",
            &json!({"connection": self.conn.id.to_string(), "protocol": protocol}),
        );
        let directive = BehaviorBridge::on_transport_up(protocol, &mut self.conn);
        self.apply_directive(directive).await;
    }

    async fn on_ws_upgrade(&mut self, stream: StreamRef, headers: Vec<(String, String)>) {
        let _ = self.manager.transition(
            ConnectionStatus::WebsocketConnected,
            TransitionParams::default(),
        );
        self.manager
            .state_mut()
            .register_stream(stream, StreamKind::Websocket);
        self.last_activity = Instant::now();
        StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
        self.conn.notify_callbacks(&CallbackEvent::WebsocketUpgrade {
            stream,
            headers: headers.clone(),
        });
        self.conn.handlers.logging.log_connection_event(
            "websocket_upgrade",
            &json!({"connection": self.conn.id.to_string(), "stream": stream.to_string()}),
        );
        let directive = BehaviorBridge::on_ws_upgrade(stream, &headers, &mut self.conn);
        self.apply_directive(directive).await;
        self.reissue_confirmed_subscriptions().await;
    }

    async fn on_ws_frame(&mut self, stream: StreamRef, message: tokio_tungstenite::tungstenite::Message) {
        self.last_activity = Instant::now();
        if self.manager.state().stream(&stream).is_none() {
            // First frame after an ownership adoption: the stream was minted
            // before this runtime owned the transport.
            self.manager
                .state_mut()
                .register_stream(stream, StreamKind::Websocket);
            StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
        }
        let frame = match self.codec.decode(message) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("{}: dropping undecodable frame: {}", self.conn.id, err);
                self.conn
                    .handlers
                    .metrics
                    .increment_counter("invalid_frames", 1);
                return;
            }
        };
        self.conn
            .handlers
            .metrics
            .increment_counter("frames_in", 1);
        self.conn.notify_callbacks(&CallbackEvent::WebsocketFrame {
            stream,
            frame: frame.clone(),
        });
        let output = BehaviorBridge::on_ws_frame(stream, &frame, &mut self.conn);
        if let Some(outcome) = output.auth {
            self.resolve_auth(outcome);
        }
        self.apply_directive(output.directive).await;
    }

    /// Transport death observed through the monitor rather than a `Down`
    /// event (task panic, watchdog shutdown).
    async fn on_monitor_down(&mut self) {
        if !self.manager.state().has_transport() {
            return;
        }
        let reason = self
            .manager
            .state()
            .last_error()
            .cloned()
            .unwrap_or_else(|| DownReason::Other("transport_task_exited".to_string()));
        let killed: Vec<StreamRef> = self
            .manager
            .state()
            .active_streams()
            .keys()
            .copied()
            .collect();
        self.handle_transport_down(reason, killed).await;
    }

    async fn handle_transport_down(&mut self, reason: DownReason, killed: Vec<StreamRef>) {
        let status = self.manager.status();
        if status.is_terminal() {
            self.manager.state_mut().detach_transport();
            return;
        }
        // A monitor firing after the Down event was already processed.
        if !self.manager.state().has_transport()
            && !matches!(
                status,
                ConnectionStatus::Connecting
                    | ConnectionStatus::Connected
                    | ConnectionStatus::WebsocketConnected
            )
        {
            return;
        }
        log::warn!("{}: transport down: {}", self.conn.id, reason);
        self.manager.state_mut().remove_streams(&killed);
        self.manager.state_mut().detach_transport();
        let _ = self.manager.transition(
            ConnectionStatus::Disconnected,
            TransitionParams::with_reason(reason.clone()),
        );
        StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
        self.conn.notify_callbacks(&CallbackEvent::ConnectionDown {
            reason: reason.clone(),
        });
        self.conn
            .handlers
            .metrics
            .increment_counter("transport_down", 1);
        self.conn.handlers.logging.log_connection_event(
            "transport_down",
            &json!({"connection": self.conn.id.to_string(), "reason": reason.to_string()}),
        );
        let directive =
            BehaviorBridge::on_transport_down(&reason, self.manager.attempts(), &mut self.conn);
        self.apply_directive(directive).await;
    }

    // --- Directives ---

    async fn apply_directive(&mut self, directive: BridgeDirective) {
        match directive {
            BridgeDirective::Continue => {}
            BridgeDirective::SendFrame { stream, frame } => {
                self.request_send(frame, stream, None, "frame", 0).await;
            }
            BridgeDirective::Reconnect => self.schedule_reconnect(),
            BridgeDirective::RetryAfter(delay) => {
                self.ensure_disconnected();
                match self.manager.handle_reconnection() {
                    Ok(_) => {
                        // The handler picked the delay; the attempt
                        // accounting still came from the policy.
                        self.reconnect_at = Some(tokio::time::Instant::now() + delay);
                    }
                    Err(err) => self.on_reconnect_refused(err),
                }
            }
            BridgeDirective::CloseConnection { code, reason } => {
                if let Some(transport) = self.manager.state().transport() {
                    transport.close(Some(code), &reason);
                }
            }
            BridgeDirective::Stop { reason } => {
                log::warn!("{}: behavior requested stop: {}", self.conn.id, reason);
                self.exit = Some(RunExit::Stopped { reason });
            }
        }
    }

    fn resolve_auth(&mut self, outcome: AuthOutcome) {
        match outcome {
            AuthOutcome::Authenticated => {
                log::info!("{}: authenticated", self.conn.id);
                if let Some(respond) = self.pending_auth.take() {
                    let _ = respond.send(Ok(()));
                }
            }
            AuthOutcome::Rejected { reason } => {
                log::error!("{}: authentication rejected: {}", self.conn.id, reason);
                if let Some(respond) = self.pending_auth.take() {
                    let _ = respond.send(Err(ClientError::Auth(
                        crate::behaviors::AuthError::Rejected(reason.clone()),
                    )));
                }
                // Auth failures are critical: no reconnection, terminal state.
                self.reconnect_at = None;
                if let Some(handle) = self.manager.state_mut().detach_transport() {
                    handle.shutdown();
                }
                let _ = self.manager.transition(
                    ConnectionStatus::Error,
                    TransitionParams::with_reason(DownReason::Fatal(format!(
                        "auth_rejected: {}",
                        reason
                    ))),
                );
                StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
            }
            AuthOutcome::Unrelated => {}
        }
    }

    // --- Outbound path ---

    /// Admission-controlled send. Bridge-originated frames (`respond:
    /// None`) are best-effort and dropped with an info log when no stream
    /// exists yet; user sends fail with an explicit error instead.
    async fn request_send(
        &mut self,
        frame: Frame,
        stream: Option<StreamRef>,
        respond: Option<Responder<()>>,
        kind: &str,
        priority: i32,
    ) {
        if stream.is_none() && self.manager.state().websocket_stream().is_none() {
            match respond {
                Some(respond) => {
                    let _ = respond.send(Err(ClientError::NotConnected));
                }
                None => log::info!(
                    "{}: dropping outbound frame, no websocket stream yet",
                    self.conn.id
                ),
            }
            return;
        }
        if let Some(target) = stream {
            match self.manager.state().stream(&target) {
                None => {
                    if let Some(respond) = respond {
                        let _ = respond.send(Err(ClientError::StreamNotFound));
                    }
                    return;
                }
                Some(info) if info.kind != StreamKind::Websocket => {
                    if let Some(respond) = respond {
                        let _ = respond.send(Err(ClientError::InvalidStreamStatus));
                    }
                    return;
                }
                Some(_) => {}
            }
        }

        let request = RateRequest {
            kind: kind.to_string(),
            priority,
        };
        if let Some(cost) = self.conn.handlers.rate_limit.cost(&request) {
            self.limiter.override_cost(kind, cost);
        }
        let pending = PendingSend {
            frame,
            stream,
            respond,
        };
        match self.limiter.check(request.clone(), pending) {
            RateDecision::Allow(pending) => self.dispatch_send(pending).await,
            RateDecision::Queued => {
                let rate_limit = self.conn.handlers.rate_limit.clone();
                rate_limit.on_queued(&request, &mut self.conn);
                self.conn
                    .handlers
                    .metrics
                    .increment_counter("sends_queued", 1);
            }
            RateDecision::Reject { reason, item } => {
                let rate_limit = self.conn.handlers.rate_limit.clone();
                rate_limit.on_rejected(&request, reason, &mut self.conn);
                self.conn
                    .handlers
                    .metrics
                    .increment_counter("sends_rejected", 1);
                if let Some(respond) = item.respond {
                    let error = match reason {
                        RejectReason::RateLimitExceeded => ClientError::RateLimited,
                        RejectReason::QueueFull => ClientError::QueueFull,
                    };
                    let _ = respond.send(Err(error));
                }
            }
        }
    }

    /// Encodes and writes a frame the limiter has admitted.
    async fn dispatch_send(&mut self, pending: PendingSend) {
        let PendingSend {
            frame,
            stream,
            respond,
        } = pending;
        if stream
            .or_else(|| self.manager.state().websocket_stream())
            .is_none()
        {
            match respond {
                Some(respond) => {
                    let _ = respond.send(Err(ClientError::NotConnected));
                }
                None => log::info!("{}: dropping queued frame, transport gone", self.conn.id),
            }
            return;
        }
        let message = match self.codec.encode(frame) {
            Ok(message) => message,
            Err(err) => {
                match respond {
                    Some(respond) => {
                        let _ = respond.send(Err(ClientError::Codec(err)));
                    }
                    None => log::warn!("{}: frame encoding failed: {}", self.conn.id, err),
                }
                return;
            }
        };
        let transport = match self.manager.state().transport() {
            Some(transport) => transport.clone(),
            None => {
                if let Some(respond) = respond {
                    let _ = respond.send(Err(ClientError::NotConnected));
                }
                return;
            }
        };
        let result = transport.send(message).await.map_err(ClientError::Transport);
        if result.is_ok() {
            self.conn
                .handlers
                .metrics
                .increment_counter("frames_out", 1);
        }
        match respond {
            Some(respond) => {
                let _ = respond.send(result);
            }
            None => {
                if let Err(err) = result {
                    log::warn!("{}: send failed: {}", self.conn.id, err);
                }
            }
        }
    }

    /// Encodes a JSON payload through the message handler and sends it.
    async fn send_json(&mut self, message: Value, kind: &str, priority: i32) {
        match self.conn.handlers.message.encode_message(&message) {
            Ok(frame) => self.request_send(frame, None, None, kind, priority).await,
            Err(reason) => {
                log::error!("{}: outbound encoding failed: {}", self.conn.id, reason)
            }
        }
    }

    async fn drain_limiter(&mut self) {
        loop {
            match self.limiter.tick(Instant::now()) {
                Some((_, pending)) => self.dispatch_send(pending).await,
                None => break,
            }
        }
    }

    // --- Timers ---

    async fn periodic_scan(&mut self) {
        let timed_out = self
            .conn
            .timed_out_subscriptions(Utc::now(), self.config.subscription_timeout_secs);
        for id in timed_out {
            log::warn!(
                "{}: subscription {} timed out waiting for confirmation",
                self.conn.id,
                id
            );
            self.conn.mark_subscription(&id, SubscriptionStatus::Timeout);
            self.conn
                .handlers
                .metrics
                .increment_counter("subscription_timeouts", 1);
        }

        if let Some(window) = self.config.inactivity_timeout {
            if self.manager.status() == ConnectionStatus::WebsocketConnected
                && self.last_activity.elapsed() > window
            {
                log::warn!(
                    "{}: no traffic for {}s, forcing reconnect",
                    self.conn.id,
                    window.as_secs()
                );
                // Record the cause so the monitor path classifies this as a
                // timeout, then drop the socket.
                self.manager.state_mut().record_error(DownReason::Timeout);
                if let Some(transport) = self.manager.state().transport() {
                    transport.shutdown();
                }
            }
        }
    }

    async fn send_heartbeat(&mut self) {
        if self.config.ping_interval.is_none() {
            return;
        }
        if self.manager.status() != ConnectionStatus::WebsocketConnected {
            return;
        }
        self.request_send(Frame::Ping(bytes::Bytes::new()), None, None, "ping", 5)
            .await;
    }

    // --- Subscriptions ---

    /// After every successful upgrade, confirmed subscriptions are
    /// re-requested exactly once, marked pending first. Subscriptions still
    /// pending (declared before the upgrade, or unanswered on the previous
    /// transport) are issued as well. Issue order is unspecified.
    async fn reissue_confirmed_subscriptions(&mut self) {
        let confirmed = self.conn.confirmed_subscriptions();
        let pending: Vec<_> = self
            .conn
            .subscriptions
            .values()
            .filter(|subscription| subscription.status == SubscriptionStatus::Pending)
            .map(|subscription| subscription.id.clone())
            .collect();
        if confirmed.is_empty() && pending.is_empty() {
            return;
        }
        log::info!(
            "{}: issuing {} confirmed + {} pending subscriptions",
            self.conn.id,
            confirmed.len(),
            pending.len()
        );
        for id in confirmed {
            self.conn.mark_subscription(&id, SubscriptionStatus::Pending);
            self.conn
                .handlers
                .metrics
                .increment_counter("resubscriptions", 1);
            self.issue_subscribe_request(&id).await;
        }
        for id in pending {
            self.issue_subscribe_request(&id).await;
        }
    }

    async fn issue_subscribe_request(&mut self, id: &crate::session::SubscriptionId) {
        let request = match self.conn.subscription(id) {
            Some(subscription) => self
                .conn
                .handlers
                .subscription
                .build_subscribe_request(subscription),
            None => return,
        };
        self.send_json(request, "subscription", 0).await;
    }

    // --- Commands ---

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendFrame { frame, respond } => {
                let status = self.manager.status();
                if status.is_terminal() {
                    let _ = respond.send(Err(ClientError::InvalidState(status)));
                    return;
                }
                self.request_send(frame, None, Some(respond), "frame", 0).await;
            }
            Command::Subscribe {
                channel,
                params,
                respond,
            } => {
                let status = self.manager.status();
                if status.is_terminal() {
                    let _ = respond.send(Err(ClientError::InvalidState(status)));
                    return;
                }
                let id = self.conn.add_subscription(&channel, params);
                if status == ConnectionStatus::WebsocketConnected {
                    let request = match self.conn.subscription(&id) {
                        Some(subscription) => Some(
                            self.conn
                                .handlers
                                .subscription
                                .build_subscribe_request(subscription),
                        ),
                        None => None,
                    };
                    if let Some(request) = request {
                        self.send_json(request, "subscription", 0).await;
                    }
                }
                let _ = respond.send(Ok(id));
            }
            Command::Unsubscribe { id, respond } => {
                let subscription = match self.conn.subscription(&id) {
                    Some(subscription) => subscription.clone(),
                    None => {
                        let _ = respond.send(Err(ClientError::SubscriptionNotFound));
                        return;
                    }
                };
                if self.manager.status() == ConnectionStatus::WebsocketConnected {
                    let request = self
                        .conn
                        .handlers
                        .subscription
                        .build_unsubscribe_request(&subscription);
                    self.send_json(request, "subscription", 0).await;
                } else {
                    // Nothing to tell the server; release locally.
                    self.conn
                        .mark_subscription(&id, SubscriptionStatus::Unsubscribed);
                }
                let _ = respond.send(Ok(()));
            }
            Command::Authenticate {
                credentials,
                respond,
            } => self.handle_authenticate(credentials, respond).await,
            Command::Status { respond } => {
                let _ = respond.send(self.manager.status());
            }
            Command::Snapshot { respond } => {
                let _ = respond.send(self.conn.snapshot(self.manager.attempts()));
            }
            Command::RegisterCallback {
                id,
                sender,
                respond,
            } => {
                let fresh = StateSync::register_callback(&mut self.conn, id, sender);
                let _ = respond.send(fresh);
            }
            Command::UnregisterCallback { id, respond } => {
                let removed = StateSync::unregister_callback(&mut self.conn, &id);
                let _ = respond.send(removed);
            }
            Command::Close { respond } => self.handle_close(respond),
            Command::TransferOwnership {
                to,
                ready_timeout,
                respond,
            } => self.handle_transfer(to, ready_timeout, respond).await,
            Command::ReceiveOwnership {
                transport,
                monitor,
                stream,
                ready,
                respond,
            } => {
                self.handle_receive_ownership(transport, monitor, stream, ready, respond)
                    .await
            }
        }
    }

    async fn handle_authenticate(
        &mut self,
        credentials: Option<crate::session::Credentials>,
        respond: Responder<()>,
    ) {
        if let Some(credentials) = credentials {
            self.conn.credentials = Some(credentials);
        }
        let creds = match &self.conn.credentials {
            Some(creds) if !creds.is_empty() => creds.clone(),
            _ => {
                let _ = respond.send(Err(ClientError::Auth(
                    crate::behaviors::AuthError::MissingCredentials,
                )));
                return;
            }
        };
        let status = self.manager.status();
        if status != ConnectionStatus::WebsocketConnected || self.pending_auth.is_some() {
            let _ = respond.send(Err(ClientError::InvalidState(status)));
            return;
        }
        let auth_handler = self.conn.handlers.auth.clone();
        match auth_handler.build_auth_request(&creds, &mut self.conn) {
            Ok(request) => {
                self.pending_auth = Some(respond);
                // Auth outranks data traffic in the wait queue.
                self.send_json(request, "auth", 10).await;
            }
            Err(err) => {
                let _ = respond.send(Err(ClientError::Auth(err)));
            }
        }
    }

    fn handle_close(&mut self, respond: Responder<()>) {
        self.reconnect_at = None;
        let status = self.manager.status();
        if status.is_terminal() {
            let _ = respond.send(Ok(()));
            self.exit = Some(RunExit::Clean);
            return;
        }
        if let Some(transport) = self.manager.state().transport() {
            if status == ConnectionStatus::WebsocketConnected {
                transport.close(Some(1000), "Client closing");
            } else {
                transport.shutdown();
            }
        }
        self.manager.state_mut().detach_transport();
        let _ = self
            .manager
            .transition(ConnectionStatus::Closed, TransitionParams::default());
        StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
        for pending in self.limiter.drain() {
            if let Some(respond) = pending.respond {
                let _ = respond.send(Err(ClientError::Closed));
            }
        }
        if let Some(pending) = self.pending_auth.take() {
            let _ = pending.send(Err(ClientError::Closed));
        }
        self.conn.handlers.logging.log_connection_event(
            "closed",
            &json!({"connection": self.conn.id.to_string()}),
        );
        let _ = respond.send(Ok(()));
        self.exit = Some(RunExit::Clean);
    }

    // --- Ownership transfer ---

    /// Phase 1+2 of the handoff: tell the receiver to expect ownership, wait
    /// for its ready signal, reclaim on deadline expiry. Until the receiver
    /// acknowledges, events keep flowing here.
    async fn handle_transfer(
        &mut self,
        to: RuntimeHandle,
        ready_timeout: Duration,
        respond: Responder<()>,
    ) {
        let (transport, monitor) = match (
            self.manager.state().transport().cloned(),
            self.manager.state().monitor().cloned(),
        ) {
            (Some(transport), Some(monitor)) => (transport, monitor),
            _ => {
                let _ = respond.send(Err(ClientError::NotConnected));
                return;
            }
        };
        let (ready_tx, ready_rx) = oneshot::channel();
        let (adopt_tx, _adopt_rx) = oneshot::channel();
        if to
            .send(Command::ReceiveOwnership {
                transport: transport.clone(),
                monitor: monitor.clone(),
                stream: self.manager.state().websocket_stream(),
                ready: ready_tx,
                respond: adopt_tx,
            })
            .is_err()
        {
            let _ = respond.send(Err(ClientError::TransferFailed(
                "receiving runtime is gone".to_string(),
            )));
            return;
        }
        match tokio::time::timeout(ready_timeout, ready_rx).await {
            Ok(Ok(())) => {
                // Handoff complete. Keep watching the transport from the old
                // side so its death is still observed somewhere.
                tokio::spawn(async move {
                    monitor.down().await;
                    log::info!("transferred transport exited");
                });
                self.reconnect_at = None;
                self.manager.state_mut().detach_transport();
                let _ = self.manager.transition(
                    ConnectionStatus::Disconnected,
                    TransitionParams::with_reason(DownReason::Other(
                        "ownership_transferred".to_string(),
                    )),
                );
                StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
                let _ = respond.send(Ok(()));
            }
            _ => {
                // Phase 3 not observed within the deadline: reclaim.
                log::warn!("{}: ownership handoff timed out, reclaiming", self.conn.id);
                let reclaim = transport.set_owner(self.event_tx.clone()).await;
                let _ = respond.send(Err(ClientError::TransferFailed(match reclaim {
                    Ok(()) => "ready signal not observed, transport reclaimed".to_string(),
                    Err(err) => format!("ready signal not observed, reclaim failed: {}", err),
                })));
            }
        }
    }

    /// The receiving half: redirect event delivery to this runtime, adopt
    /// the handle/monitor pair and signal ready.
    async fn handle_receive_ownership(
        &mut self,
        transport: crate::transport::handle::TransportHandle,
        monitor: crate::transport::handle::MonitorHandle,
        stream: Option<StreamRef>,
        ready: oneshot::Sender<()>,
        respond: Responder<()>,
    ) {
        match transport.set_owner(self.event_tx.clone()).await {
            Ok(()) => {
                // Drop whatever transport this runtime held: its task exits
                // quietly once the handle is gone, and its stale streams
                // must not shadow the adopted one.
                if let Some(old) = self.manager.state_mut().detach_transport() {
                    old.shutdown();
                }
                self.manager.state_mut().attach_transport(transport, monitor);
                if let Some(stream) = stream {
                    self.manager
                        .state_mut()
                        .register_stream(stream, StreamKind::Websocket);
                }
                // Walk the machine up to the live state.
                let _ = self
                    .manager
                    .transition(ConnectionStatus::Connecting, TransitionParams::default());
                let _ = self
                    .manager
                    .transition(ConnectionStatus::Connected, TransitionParams::default());
                let _ = self.manager.transition(
                    ConnectionStatus::WebsocketConnected,
                    TransitionParams::default(),
                );
                StateSync::sync_manager_from_client(&mut self.manager, &self.conn);
                StateSync::update_client_conn_from_transport(&mut self.conn, &self.manager);
                log::info!("{}: adopted transport ownership", self.conn.id);
                let _ = ready.send(());
                let _ = respond.send(Ok(()));
            }
            Err(err) => {
                let _ = respond.send(Err(ClientError::Transport(err)));
            }
        }
    }
}
