//! # State Synchronization
//!
//! Bidirectional propagation between the canonical session state
//! ([`ClientConn`]) and the transport-local side ([`ConnectionState`] inside
//! its [`ConnectionManager`]). The two layers are deliberately separate
//! types; these functions are the only place fields cross the boundary, and
//! handles/streams never leave the transport side except as read-only
//! mirrors.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use serde_json::Value;

use crate::behaviors::HandlerSet;
use crate::core::manager::ConnectionManager;
use crate::reconnect::ReconnectPolicy;
use crate::session::{CallbackId, CallbackSender, ClientConn};
use crate::transport::actor::TransportConfig;

/// # State Sync
///
/// Stateless function set; all methods take both sides explicitly.
pub struct StateSync;

impl StateSync {
    /// Builds the transport configuration for the next connection attempt
    /// from the canonical state: primary endpoint, upgrade headers, and any
    /// subprotocols declared in `ws_opts`. Returns `None` when the session
    /// has no endpoint.
    pub fn extract_transport_state(conn: &ClientConn) -> Option<TransportConfig> {
        let endpoint = conn.primary_endpoint()?;
        let mut config = TransportConfig::new(
            &endpoint.host,
            endpoint.port,
            &endpoint.path,
            endpoint.transport,
        );
        config.headers = conn.headers.clone();
        if let Some(subprotocols) = conn
            .transport_opts
            .ws_opts
            .get("subprotocols")
            .and_then(Value::as_array)
        {
            config.subprotocols = subprotocols
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        Some(config)
    }

    /// Propagates the transport-local view outward: status, last error,
    /// transport handle mirror and the main WebSocket stream.
    pub fn update_client_conn_from_transport(conn: &mut ClientConn, manager: &ConnectionManager) {
        let state = manager.state();
        conn.status = state.status();
        if let Some(error) = state.last_error() {
            conn.last_error = Some(error.clone());
        }
        conn.transport = state.transport().cloned();
        conn.main_stream = state.websocket_stream();
    }

    /// Propagates configuration inward after the canonical state changed
    /// (ownership transfer hands over a whole session). The transport
    /// handle, monitor and active streams on the transport side are
    /// deliberately untouched.
    pub fn sync_manager_from_client(manager: &mut ConnectionManager, conn: &ClientConn) {
        manager.set_policy(conn.reconnect.clone());
    }

    /// Registers a callback recipient on the session. Returns false on a
    /// duplicate id.
    pub fn register_callback(conn: &mut ClientConn, id: CallbackId, sender: CallbackSender) -> bool {
        conn.register_callback(id, sender)
    }

    /// Unregisters a callback recipient. Returns false for unknown ids.
    pub fn unregister_callback(conn: &mut ClientConn, id: &CallbackId) -> bool {
        conn.unregister_callback(id)
    }

    /// Builds (or refreshes) a canonical session from the transport side —
    /// the receiving half of an ownership transfer. An existing session is
    /// updated in place; otherwise a bare one is created around default
    /// handlers.
    pub fn create_client_conn(
        existing: Option<ClientConn>,
        manager: &ConnectionManager,
    ) -> ClientConn {
        let mut conn = existing.unwrap_or_else(|| {
            ClientConn::new(Vec::new(), HandlerSet::default(), ReconnectPolicy::default())
        });
        Self::update_client_conn_from_transport(&mut conn, manager);
        conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::TransportKind;
    use crate::core::manager::TransitionParams;
    use crate::core::status::ConnectionStatus;
    use crate::session::Endpoint;
    use serde_json::json;

    fn conn() -> ClientConn {
        let mut conn = ClientConn::new(
            vec![Endpoint {
                host: "venue.test".to_string(),
                port: 9443,
                path: "/stream".to_string(),
                transport: TransportKind::Tls,
            }],
            HandlerSet::default(),
            ReconnectPolicy::default(),
        );
        conn.headers
            .push(("x-client".to_string(), "lib_wsclient".to_string()));
        conn.transport_opts
            .ws_opts
            .insert("subprotocols".to_string(), json!(["jsonrpc-2.0"]));
        conn
    }

    #[test]
    fn transport_config_comes_from_the_primary_endpoint() {
        let conn = conn();
        let config = StateSync::extract_transport_state(&conn).unwrap();
        assert_eq!(config.host, "venue.test");
        assert_eq!(config.port, 9443);
        assert_eq!(config.path, "/stream");
        assert_eq!(config.kind, TransportKind::Tls);
        assert_eq!(config.subprotocols, vec!["jsonrpc-2.0".to_string()]);
        assert_eq!(
            config.headers,
            vec![("x-client".to_string(), "lib_wsclient".to_string())]
        );
    }

    #[test]
    fn status_and_error_propagate_outward() {
        let mut conn = conn();
        let mut manager = ConnectionManager::new(conn.reconnect.clone());
        manager
            .transition(ConnectionStatus::Connecting, TransitionParams::default())
            .unwrap();
        StateSync::update_client_conn_from_transport(&mut conn, &manager);
        assert_eq!(conn.status, ConnectionStatus::Connecting);
        assert!(conn.transport.is_none());
        assert!(conn.main_stream.is_none());
    }

    #[test]
    fn create_client_conn_reuses_the_existing_session() {
        let mut original = conn();
        let id = original.id.clone();
        original.add_subscription("book.BTC", json!({}));
        let manager = ConnectionManager::new(original.reconnect.clone());
        let rebuilt = StateSync::create_client_conn(Some(original), &manager);
        assert_eq!(rebuilt.id, id);
        assert_eq!(rebuilt.subscriptions.len(), 1);
    }
}
