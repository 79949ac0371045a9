//! In-process WebSocket peer for integration tests.
//!
//! Speaks the neutral shapes the library's default handlers understand:
//! `{"method":"subscribe"}` is acknowledged with `{"type":"subscribed"}`,
//! `{"method":"auth"}` with `{"type":"auth"}`, everything else is echoed.
//! Behavior knobs let individual tests simulate a flaky venue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use lib_wsclient::core::status::ConnectionStatus;
use lib_wsclient::session::ConnectionId;
use lib_wsclient::WsClient;

/// Installs a fmt tracing subscriber honoring `RUST_LOG`; safe to call from
/// every test (later calls are no-ops).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

/// Behavior knobs for one [`MockVenue`].
#[derive(Debug, Clone)]
pub struct VenueBehavior {
    /// Answer auth requests positively.
    pub auth_ok: bool,
    /// Acknowledge subscribe requests at all.
    pub ack_subscribes: bool,
    /// Abruptly drop the FIRST accepted connection after this many
    /// subscription acks (later connections are served normally).
    pub drop_first_conn_after_acks: Option<usize>,
    /// Echo unrecognized text frames back.
    pub echo: bool,
}

impl Default for VenueBehavior {
    fn default() -> Self {
        Self {
            auth_ok: true,
            ack_subscribes: true,
            drop_first_conn_after_acks: None,
            echo: true,
        }
    }
}

/// Counters shared between the venue task and the test body.
#[derive(Debug, Default)]
pub struct VenueStats {
    /// Accepted WebSocket connections.
    pub connections: AtomicUsize,
    /// Subscribe requests seen (across all connections).
    pub subscribe_requests: AtomicUsize,
    /// Text frames seen that were not subscription/auth traffic.
    pub data_frames: AtomicUsize,
}

/// An in-process venue: listener address, stats and the accept-loop task.
pub struct MockVenue {
    pub addr: SocketAddr,
    pub stats: Arc<VenueStats>,
    accept_task: JoinHandle<()>,
}

impl MockVenue {
    /// Binds a listener on an ephemeral port and starts accepting.
    pub async fn start(behavior: VenueBehavior) -> MockVenue {
        init_logging();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(VenueStats::default());
        let loop_stats = Arc::clone(&stats);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _peer)) = listener.accept().await else {
                    break;
                };
                let behavior = behavior.clone();
                let stats = Arc::clone(&loop_stats);
                tokio::spawn(serve_connection(stream, behavior, stats));
            }
        });
        MockVenue {
            addr,
            stats,
            accept_task,
        }
    }

    /// `ws://` URL of the venue.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Stops accepting new connections.
    pub fn stop(&self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(stream: TcpStream, behavior: VenueBehavior, stats: Arc<VenueStats>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let conn_index = stats.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let mut acks = 0usize;

    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Text(text) => {
                let parsed: Option<Value> = serde_json::from_str(&text).ok();
                match parsed {
                    Some(request) if request["method"] == "subscribe" => {
                        stats.subscribe_requests.fetch_add(1, Ordering::SeqCst);
                        if !behavior.ack_subscribes {
                            continue;
                        }
                        let id = request["id"].as_str().unwrap_or_default();
                        let ack = json!({"type": "subscribed", "id": id}).to_string();
                        let _ = ws.send(Message::Text(ack.into())).await;
                        acks += 1;
                        if conn_index == 1 && behavior.drop_first_conn_after_acks == Some(acks) {
                            // Abrupt TCP drop, no close handshake.
                            return;
                        }
                    }
                    Some(request) if request["method"] == "unsubscribe" => {
                        let id = request["id"].as_str().unwrap_or_default();
                        let ack = json!({"type": "unsubscribed", "id": id}).to_string();
                        let _ = ws.send(Message::Text(ack.into())).await;
                    }
                    Some(request) if request["method"] == "auth" => {
                        let answer = if behavior.auth_ok {
                            json!({"type": "auth", "status": "ok"})
                        } else {
                            json!({"type": "auth", "status": "denied", "reason": "bad key"})
                        };
                        let _ = ws.send(Message::Text(answer.to_string().into())).await;
                    }
                    _ => {
                        stats.data_frames.fetch_add(1, Ordering::SeqCst);
                        if behavior.echo {
                            let _ = ws.send(Message::Text(text)).await;
                        }
                    }
                }
            }
            Message::Ping(payload) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Polls the connection status until it matches (true) or the timeout
/// elapses (false).
pub async fn wait_for_status(
    client: &WsClient,
    id: &ConnectionId,
    want: ConnectionStatus,
    timeout_ms: u64,
) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if client.status(id).await.ok() == Some(want) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// Polls `probe` every 25ms until it returns true or `timeout_ms` elapses.
pub async fn wait_until<F, Fut>(timeout_ms: u64, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if probe().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
