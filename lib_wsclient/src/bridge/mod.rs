//! # Behavior Bridge
//!
//! Translates transport events into behavior callbacks and interprets their
//! return contracts as runtime directives. The bridge is pure over the
//! canonical session state: it mutates `ClientConn` (subscription statuses,
//! adapter state via the handlers) but never touches the transport-local
//! state or performs I/O — the runtime executes whatever directive comes
//! back.
//!
//! Dispatch is total by construction: every behavior returns a closed
//! outcome enum, matched exhaustively below.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use serde_json::{json, Value};

use crate::behaviors::{
    AuthOutcome, ConnectInfo, ConnectOutcome, DisconnectCause, DisconnectInfo, DisconnectOutcome,
    ErrorInfo, ErrorOutcome, FrameOutcome, MessageOutcome, SubscriptionResponse,
};
use crate::codec::Frame;
use crate::session::{ClientConn, SubscriptionStatus};
use crate::transport::events::{DownReason, StreamRef};

/// What the runtime must do after a bridged event.
#[derive(Debug)]
pub enum BridgeDirective {
    /// Nothing further.
    Continue,
    /// Send a frame. `stream: None` targets the main WebSocket stream and is
    /// best-effort — dropped with an info log when no stream exists yet.
    SendFrame {
        /// Target stream, when pinned.
        stream: Option<StreamRef>,
        /// The frame to send.
        frame: Frame,
    },
    /// Schedule a reconnection per the configured policy.
    Reconnect,
    /// Reconnect after a handler-chosen delay.
    RetryAfter(Duration),
    /// Initiate a clean close with the given code.
    CloseConnection {
        /// Close status code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Terminate the runtime with this reason.
    Stop {
        /// Stop reason.
        reason: String,
    },
}

/// Result of bridging one inbound frame: the directive plus any session
/// protocol classifications the runtime needs to resolve pending commands.
#[derive(Debug)]
pub struct FrameOutput {
    /// What to do next.
    pub directive: BridgeDirective,
    /// Set when the frame answered the auth exchange.
    pub auth: Option<AuthOutcome>,
    /// Set when the frame answered the subscription exchange.
    pub subscription: Option<SubscriptionResponse>,
}

impl FrameOutput {
    fn directive(directive: BridgeDirective) -> Self {
        Self {
            directive,
            auth: None,
            subscription: None,
        }
    }
}

/// # Behavior Bridge
///
/// Stateless translation layer; all methods are associated functions taking
/// the session state explicitly.
pub struct BehaviorBridge;

impl BehaviorBridge {
    /// Transport is up (socket established, pre-upgrade).
    pub fn on_transport_up(protocol: &str, conn: &mut ClientConn) -> BridgeDirective {
        let handler = conn.handlers.connection.clone();
        let info = ConnectInfo {
            protocol: Some(protocol.to_string()),
            headers: Vec::new(),
            stream: None,
        };
        Self::map_connect_outcome(handler.handle_connect(&info, conn))
    }

    /// The WebSocket upgrade completed; the handler sees the response
    /// headers and the minted stream.
    pub fn on_ws_upgrade(
        stream: StreamRef,
        headers: &[(String, String)],
        conn: &mut ClientConn,
    ) -> BridgeDirective {
        let handler = conn.handlers.connection.clone();
        let protocol = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("sec-websocket-protocol"))
            .map(|(_, value)| value.clone());
        let info = ConnectInfo {
            protocol,
            headers: headers.to_vec(),
            stream: Some(stream),
        };
        Self::map_connect_outcome(handler.handle_connect(&info, conn))
    }

    /// Normalizes a raw transport-down reason into what the connection
    /// handler sees. The named set is closed; everything else passes
    /// through untouched.
    pub fn normalize_down_reason(reason: &DownReason) -> DisconnectCause {
        match reason {
            DownReason::Normal | DownReason::Closed => DisconnectCause::Remote {
                code: 1000,
                message: "closed".to_string(),
            },
            DownReason::Timeout => DisconnectCause::Error(DownReason::Timeout),
            DownReason::ConnectionRefused => {
                DisconnectCause::Error(DownReason::ConnectionRefused)
            }
            other => DisconnectCause::Error(other.clone()),
        }
    }

    /// The transport died. Stream cleanup is the runtime's job (it owns the
    /// transport-local state); the bridge only consults the handler.
    pub fn on_transport_down(
        reason: &DownReason,
        attempts: u32,
        conn: &mut ClientConn,
    ) -> BridgeDirective {
        let handler = conn.handlers.connection.clone();
        let info = DisconnectInfo {
            cause: Self::normalize_down_reason(reason),
            attempts,
        };
        match handler.handle_disconnect(&info, conn) {
            DisconnectOutcome::Continue => BridgeDirective::Continue,
            DisconnectOutcome::Reconnect => BridgeDirective::Reconnect,
            DisconnectOutcome::Stop { reason } => BridgeDirective::Stop { reason },
        }
    }

    /// An inbound frame. Text frames that pass `handle_frame` continue into
    /// the JSON message pipeline: decode, session protocol classification
    /// (auth/subscription acknowledgements update the session directly),
    /// `validate_message`, then `handle_message`.
    pub fn on_ws_frame(stream: StreamRef, frame: &Frame, conn: &mut ClientConn) -> FrameOutput {
        let handler = conn.handlers.connection.clone();
        match handler.handle_frame(stream, frame, conn) {
            FrameOutcome::Continue => {}
            FrameOutcome::Reply(reply) => {
                return FrameOutput::directive(BridgeDirective::SendFrame {
                    stream: Some(stream),
                    frame: reply,
                })
            }
            FrameOutcome::Close { code, reason } => {
                return FrameOutput::directive(BridgeDirective::CloseConnection { code, reason })
            }
            FrameOutcome::Error { reason } => {
                conn.handlers.error.log_error(&ErrorInfo {
                    reason,
                    context: json!({"stream": stream.to_string()}),
                });
                return FrameOutput::directive(BridgeDirective::Continue);
            }
        }

        let text = match frame {
            Frame::Text(text) => text,
            _ => return FrameOutput::directive(BridgeDirective::Continue),
        };

        let message: Value = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                // Malformed payloads are a message error: log and carry on.
                log::debug!("inbound text frame is not JSON ({}), skipping pipeline", err);
                return FrameOutput::directive(BridgeDirective::Continue);
            }
        };

        let auth = Self::classify_auth(&message, conn);
        let subscription = Self::classify_subscription(&message, conn);

        let message_handler = conn.handlers.message.clone();
        if let Err(reason) = message_handler.validate_message(&message) {
            conn.handlers.error.log_error(&ErrorInfo {
                reason: format!("message validation failed: {}", reason),
                context: message.clone(),
            });
            return FrameOutput {
                directive: BridgeDirective::Continue,
                auth,
                subscription,
            };
        }

        let directive = match message_handler.handle_message(&message, conn) {
            MessageOutcome::Continue => BridgeDirective::Continue,
            MessageOutcome::Reply(reply) => {
                Self::encode_reply(&reply, stream, conn).unwrap_or(BridgeDirective::Continue)
            }
            MessageOutcome::ReplyMany(replies) => {
                // TODO: extend this path to send every element in order once a
                // consumer protocol relies on more than one reply per inbound
                // message; today only the head is delivered.
                log::warn!(
                    "reply_many returned {} messages, sending only the first",
                    replies.len()
                );
                match replies.first() {
                    Some(reply) => Self::encode_reply(reply, stream, conn)
                        .unwrap_or(BridgeDirective::Continue),
                    None => BridgeDirective::Continue,
                }
            }
            MessageOutcome::Close { code, reason } => {
                BridgeDirective::CloseConnection { code, reason }
            }
            MessageOutcome::Error { reason } => {
                conn.handlers.error.log_error(&ErrorInfo {
                    reason,
                    context: message,
                });
                BridgeDirective::Continue
            }
        };

        FrameOutput {
            directive,
            auth,
            subscription,
        }
    }

    /// A transport fault: log first, then apply the handler's policy.
    pub fn on_transport_error(
        reason: &str,
        context: Value,
        conn: &mut ClientConn,
    ) -> BridgeDirective {
        let handler = conn.handlers.error.clone();
        let info = ErrorInfo {
            reason: reason.to_string(),
            context,
        };
        handler.log_error(&info);
        match handler.handle_error(&info, conn) {
            ErrorOutcome::Continue => BridgeDirective::Continue,
            ErrorOutcome::Reconnect => BridgeDirective::Reconnect,
            ErrorOutcome::Retry { delay } => BridgeDirective::RetryAfter(delay),
            ErrorOutcome::Stop { reason } => BridgeDirective::Stop { reason },
        }
    }

    fn map_connect_outcome(outcome: ConnectOutcome) -> BridgeDirective {
        match outcome {
            ConnectOutcome::Continue => BridgeDirective::Continue,
            ConnectOutcome::Reply(frame) => BridgeDirective::SendFrame {
                stream: None,
                frame,
            },
            ConnectOutcome::Close { code, reason } => {
                BridgeDirective::CloseConnection { code, reason }
            }
            ConnectOutcome::Stop { reason } => BridgeDirective::Stop { reason },
        }
    }

    fn encode_reply(
        reply: &Value,
        stream: StreamRef,
        conn: &mut ClientConn,
    ) -> Option<BridgeDirective> {
        match conn.handlers.message.encode_message(reply) {
            Ok(frame) => Some(BridgeDirective::SendFrame {
                stream: Some(stream),
                frame,
            }),
            Err(reason) => {
                conn.handlers.error.log_error(&ErrorInfo {
                    reason: format!("reply encoding failed: {}", reason),
                    context: reply.clone(),
                });
                None
            }
        }
    }

    fn classify_auth(message: &Value, conn: &mut ClientConn) -> Option<AuthOutcome> {
        let handler = conn.handlers.auth.clone();
        match handler.classify_auth_response(message, conn) {
            AuthOutcome::Unrelated => None,
            outcome => Some(outcome),
        }
    }

    /// Subscription acknowledgements update the session in place; the
    /// classification is still surfaced so the runtime can log it.
    fn classify_subscription(
        message: &Value,
        conn: &mut ClientConn,
    ) -> Option<SubscriptionResponse> {
        let handler = conn.handlers.subscription.clone();
        let response = handler.classify_response(message);
        match &response {
            SubscriptionResponse::Confirmed { id } => {
                if !conn.mark_subscription(id, SubscriptionStatus::Confirmed) {
                    log::debug!("ack for unknown subscription {}", id);
                }
            }
            SubscriptionResponse::Rejected { id, reason } => {
                log::warn!("subscription {} rejected: {}", id, reason);
                conn.mark_subscription(id, SubscriptionStatus::Failed);
            }
            SubscriptionResponse::Unsubscribed { id } => {
                conn.mark_subscription(id, SubscriptionStatus::Unsubscribed);
            }
            SubscriptionResponse::Unrelated => return None,
        }
        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::{ConnectionHandler, HandlerSet, MessageHandler};
    use crate::configs::TransportKind;
    use crate::reconnect::ReconnectPolicy;
    use crate::session::Endpoint;
    use std::sync::Arc;

    fn conn_with(handlers: HandlerSet) -> ClientConn {
        ClientConn::new(
            vec![Endpoint {
                host: "venue.test".to_string(),
                port: 8080,
                path: "/ws".to_string(),
                transport: TransportKind::Plaintext,
            }],
            handlers,
            ReconnectPolicy::default(),
        )
    }

    #[test]
    fn down_reason_normalization_is_the_closed_set() {
        let cases = [
            (
                DownReason::Normal,
                DisconnectCause::Remote {
                    code: 1000,
                    message: "closed".to_string(),
                },
            ),
            (
                DownReason::Closed,
                DisconnectCause::Remote {
                    code: 1000,
                    message: "closed".to_string(),
                },
            ),
            (DownReason::Timeout, DisconnectCause::Error(DownReason::Timeout)),
            (
                DownReason::ConnectionRefused,
                DisconnectCause::Error(DownReason::ConnectionRefused),
            ),
            (
                DownReason::Other("proxy_reset".into()),
                DisconnectCause::Error(DownReason::Other("proxy_reset".into())),
            ),
        ];
        for (raw, expected) in cases {
            assert_eq!(BehaviorBridge::normalize_down_reason(&raw), expected);
        }
    }

    #[test]
    fn default_disconnect_asks_for_reconnect() {
        let mut conn = conn_with(HandlerSet::default());
        let directive = BehaviorBridge::on_transport_down(&DownReason::Timeout, 0, &mut conn);
        assert!(matches!(directive, BridgeDirective::Reconnect));
    }

    #[test]
    fn subscription_ack_confirms_in_place() {
        let mut conn = conn_with(HandlerSet::default());
        let id = conn.add_subscription("book.BTC", json!({}));
        let ack = Frame::Text(
            json!({"type": "subscribed", "id": id.as_str()}).to_string(),
        );
        let output = BehaviorBridge::on_ws_frame(StreamRef::mint(), &ack, &mut conn);
        assert!(matches!(output.directive, BridgeDirective::Continue));
        assert!(matches!(
            output.subscription,
            Some(SubscriptionResponse::Confirmed { .. })
        ));
        assert_eq!(
            conn.subscription(&id).unwrap().status,
            SubscriptionStatus::Confirmed
        );
    }

    #[test]
    fn auth_rejection_is_surfaced() {
        let mut conn = conn_with(HandlerSet::default());
        let nack = Frame::Text(
            json!({"type": "auth", "status": "denied", "reason": "bad key"}).to_string(),
        );
        let output = BehaviorBridge::on_ws_frame(StreamRef::mint(), &nack, &mut conn);
        assert_eq!(
            output.auth,
            Some(AuthOutcome::Rejected {
                reason: "bad key".to_string()
            })
        );
    }

    struct EchoMessageHandler;
    impl MessageHandler for EchoMessageHandler {
        fn handle_message(&self, message: &Value, _conn: &mut ClientConn) -> MessageOutcome {
            MessageOutcome::Reply(json!({"echo": message}))
        }
    }

    #[test]
    fn reply_is_encoded_onto_the_same_stream() {
        let handlers = HandlerSet::default().with_message(Arc::new(EchoMessageHandler));
        let mut conn = conn_with(handlers);
        let stream = StreamRef::mint();
        let frame = Frame::Text(json!({"ping": 1}).to_string());
        let output = BehaviorBridge::on_ws_frame(stream, &frame, &mut conn);
        match output.directive {
            BridgeDirective::SendFrame {
                stream: Some(target),
                frame: Frame::Text(_),
            } => assert_eq!(target, stream),
            other => panic!("expected SendFrame, got {:?}", other),
        }
    }

    struct FanoutMessageHandler;
    impl MessageHandler for FanoutMessageHandler {
        fn handle_message(&self, _message: &Value, _conn: &mut ClientConn) -> MessageOutcome {
            MessageOutcome::ReplyMany(vec![json!({"n": 1}), json!({"n": 2})])
        }
    }

    #[test]
    fn reply_many_sends_only_the_head() {
        let handlers = HandlerSet::default().with_message(Arc::new(FanoutMessageHandler));
        let mut conn = conn_with(handlers);
        let output = BehaviorBridge::on_ws_frame(
            StreamRef::mint(),
            &Frame::Text("{}".to_string()),
            &mut conn,
        );
        match output.directive {
            BridgeDirective::SendFrame {
                frame: Frame::Text(text),
                ..
            } => assert_eq!(text, json!({"n": 1}).to_string()),
            other => panic!("expected SendFrame, got {:?}", other),
        }
    }

    struct StopOnConnect;
    impl ConnectionHandler for StopOnConnect {
        fn handle_connect(&self, _info: &ConnectInfo, _conn: &mut ClientConn) -> ConnectOutcome {
            ConnectOutcome::Stop {
                reason: "maintenance".to_string(),
            }
        }
    }

    #[test]
    fn connect_stop_propagates() {
        let handlers = HandlerSet::default().with_connection(Arc::new(StopOnConnect));
        let mut conn = conn_with(handlers);
        let directive = BehaviorBridge::on_transport_up("http", &mut conn);
        assert!(matches!(directive, BridgeDirective::Stop { .. }));
    }

    #[test]
    fn non_json_text_skips_the_pipeline() {
        let mut conn = conn_with(HandlerSet::default());
        let output = BehaviorBridge::on_ws_frame(
            StreamRef::mint(),
            &Frame::Text("not json".to_string()),
            &mut conn,
        );
        assert!(matches!(output.directive, BridgeDirective::Continue));
        assert!(output.auth.is_none());
        assert!(output.subscription.is_none());
    }
}
