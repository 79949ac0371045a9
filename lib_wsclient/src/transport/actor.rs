//! # Transport Actor
//!
//! A dedicated task owning one socket. Establishment is two-phase so the
//! owner observes the full lifecycle: the TCP connect emits `Up`, the
//! RFC 6455 handshake emits `WsUpgrade` with the response headers. After the
//! upgrade the task serves the owner protocol — frames out on command,
//! events in to whichever owner channel is currently installed — until the
//! socket dies, a close handshake completes, or the owner shuts it down.
//!
//! Every exit path cancels the monitor token, so both the current owner and
//! any previous owner (after an ownership handoff) observe transport death.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};
use tokio_util::sync::CancellationToken;

use super::events::{DownReason, StreamRef, TransportEvent};
use super::handle::{MonitorHandle, TransportCommand, TransportError, TransportHandle};
use crate::configs::TransportKind;

/// Configuration for one transport instance.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Upgrade request path (including any query string).
    pub path: String,
    /// Socket flavor.
    pub kind: TransportKind,
    /// Extra upgrade request headers.
    pub headers: Vec<(String, String)>,
    /// Subprotocols proposed via `Sec-WebSocket-Protocol`.
    pub subprotocols: Vec<String>,
    /// Bound on the TCP connect.
    pub connect_timeout: Duration,
}

impl TransportConfig {
    /// Config with default timeout and no extra headers.
    pub fn new(host: &str, port: u16, path: &str, kind: TransportKind) -> Self {
        Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
            kind,
            headers: Vec::new(),
            subprotocols: Vec::new(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Spawns a transport task. The returned handle/monitor pair is stored
/// together on the transport-local state; events flow to `events` until the
/// owner is changed with [`TransportCommand::SetOwner`].
pub fn spawn(
    config: TransportConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> (TransportHandle, MonitorHandle) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();
    let handle = TransportHandle::new(cmd_tx);
    let monitor = MonitorHandle::new(token.clone());
    tokio::spawn(run_transport(config, events, cmd_rx, token));
    (handle, monitor)
}

async fn run_transport(
    config: TransportConfig,
    mut events: mpsc::UnboundedSender<TransportEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>,
    token: CancellationToken,
) {
    // Cancelling on every exit path is what makes the monitor trustworthy.
    let _guard = token.drop_guard();

    // --- Phase 1: socket establishment ---
    let address = (config.host.as_str(), config.port);
    let tcp = match timeout(config.connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(tcp)) => tcp,
        Ok(Err(err)) => {
            let reason = classify_io_error(&err);
            log::warn!("connect to {}:{} failed: {}", config.host, config.port, err);
            let _ = events.send(TransportEvent::Down {
                reason,
                killed_streams: Vec::new(),
            });
            return;
        }
        Err(_) => {
            let _ = events.send(TransportEvent::Down {
                reason: DownReason::Timeout,
                killed_streams: Vec::new(),
            });
            return;
        }
    };
    let _ = events.send(TransportEvent::Up {
        protocol: "http".to_string(),
    });

    // --- Phase 2: RFC 6455 upgrade ---
    let request = match build_upgrade_request(&config) {
        Ok(request) => request,
        Err(err) => {
            let _ = events.send(TransportEvent::Failed {
                stream: None,
                reason: format!("invalid upgrade request: {}", err),
            });
            let _ = events.send(TransportEvent::Down {
                reason: DownReason::Fatal(format!("invalid upgrade request: {}", err)),
                killed_streams: Vec::new(),
            });
            return;
        }
    };

    let (ws, response) =
        match tokio_tungstenite::client_async_tls_with_config(request, tcp, None, None).await {
            Ok(upgraded) => upgraded,
            Err(WsError::Http(response)) => {
                // The server answered with plain HTTP instead of 101.
                let stream = StreamRef::mint();
                let status = response.status().as_u16();
                let headers = collect_headers(response.headers());
                let body = response.into_body();
                let fin = body.is_none();
                let _ = events.send(TransportEvent::HttpResponse {
                    stream,
                    fin,
                    status,
                    headers,
                });
                if let Some(body) = body {
                    let _ = events.send(TransportEvent::HttpData {
                        stream,
                        fin: true,
                        data: Bytes::from(body),
                    });
                }
                let _ = events.send(TransportEvent::Down {
                    reason: DownReason::Other(format!("upgrade_rejected_{}", status)),
                    killed_streams: vec![stream],
                });
                return;
            }
            Err(err) => {
                let reason = classify_ws_error(&err);
                let _ = events.send(TransportEvent::Failed {
                    stream: None,
                    reason: format!("websocket handshake failed: {}", err),
                });
                let _ = events.send(TransportEvent::Down {
                    reason,
                    killed_streams: Vec::new(),
                });
                return;
            }
        };

    let stream = StreamRef::mint();
    let _ = events.send(TransportEvent::WsUpgrade {
        stream,
        headers: collect_headers(response.headers()),
    });

    // --- Phase 3: frame pumping ---
    let (mut sink, mut frames) = ws.split();
    let mut closing = false;

    loop {
        tokio::select! {
            command = cmd_rx.recv() => match command {
                None | Some(TransportCommand::Shutdown) => {
                    // Owner dropped the handle or asked for a hard teardown.
                    let _ = sink.close().await;
                    return;
                }
                Some(TransportCommand::Send { message, ack }) => {
                    let result = sink
                        .send(message)
                        .await
                        .map_err(|err| TransportError::Send(err.to_string()));
                    let failed = result.is_err();
                    let _ = ack.send(result);
                    if failed {
                        let _ = events.send(TransportEvent::Down {
                            reason: DownReason::Other("send_failed".to_string()),
                            killed_streams: vec![stream],
                        });
                        return;
                    }
                }
                Some(TransportCommand::Close { code, reason }) => {
                    closing = true;
                    let frame = CloseFrame {
                        code: CloseCode::from(code.unwrap_or(1000)),
                        reason: Utf8Bytes::from(reason),
                    };
                    if sink.send(Message::Close(Some(frame))).await.is_err() {
                        let _ = events.send(TransportEvent::Down {
                            reason: DownReason::Normal,
                            killed_streams: vec![stream],
                        });
                        return;
                    }
                    // Keep reading: the peer echoes the close and the read
                    // side ends the session.
                }
                Some(TransportCommand::SetOwner { events: new_owner, ack }) => {
                    events = new_owner;
                    let _ = ack.send(());
                }
            },
            message = frames.next() => match message {
                Some(Ok(message)) => {
                    let _ = events.send(TransportEvent::WsFrame { stream, message });
                }
                Some(Err(err)) => {
                    let reason = if closing {
                        DownReason::Normal
                    } else {
                        classify_ws_error(&err)
                    };
                    let _ = events.send(TransportEvent::Down {
                        reason,
                        killed_streams: vec![stream],
                    });
                    return;
                }
                None => {
                    let _ = events.send(TransportEvent::Down {
                        reason: DownReason::Normal,
                        killed_streams: vec![stream],
                    });
                    return;
                }
            },
        }
    }
}

fn build_upgrade_request(config: &TransportConfig) -> Result<http::Request<()>, http::Error> {
    let scheme = match config.kind {
        TransportKind::Plaintext => "ws",
        TransportKind::Tls => "wss",
    };
    let uri = format!("{}://{}:{}{}", scheme, config.host, config.port, config.path);

    let mut builder = http::Request::builder()
        .method("GET")
        .uri(&uri)
        .header("Host", format!("{}:{}", config.host, config.port))
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key());
    if !config.subprotocols.is_empty() {
        builder = builder.header("Sec-WebSocket-Protocol", config.subprotocols.join(", "));
    }
    for (name, value) in &config.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(())
}

fn collect_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect()
}

fn classify_io_error(err: &std::io::Error) -> DownReason {
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused => DownReason::ConnectionRefused,
        std::io::ErrorKind::TimedOut => DownReason::Timeout,
        _ => {
            // DNS failures surface as uncategorized io errors; match on the
            // resolver's message.
            let message = err.to_string();
            if message.contains("failed to lookup address") || message.contains("Name or service not known") {
                DownReason::NxDomain
            } else {
                DownReason::Other(message)
            }
        }
    }
}

fn classify_ws_error(err: &WsError) -> DownReason {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => DownReason::Normal,
        WsError::Io(io) => classify_io_error(io),
        other => DownReason::Other(other.to_string()),
    }
}
