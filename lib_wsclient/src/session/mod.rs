//! # Session Module
//!
//! The canonical, reconnect-surviving side of the two-layer state split.
//!
//! ## Core Components:
//! - **`client_conn`**: [`ClientConn`] — identity, endpoints, subscriptions,
//!   behavior modules, callback recipients, reconnection policy.
//! - **`subscription`**: subscription lifecycle with append-only history.
//! - **`credentials`**: auth material with a redacting `Debug`.
//!
//! The transport-local counterpart lives in `core::state`; the split is
//! load-bearing and type-enforced — nothing here holds a socket, nothing
//! there holds credentials or subscriptions.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Canonical per-connection session state.
pub mod client_conn;
/// Authentication material.
pub mod credentials;
/// Subscription lifecycle and history.
pub mod subscription;

// --- Public API Re-exports ---
pub use client_conn::{
    CallbackEvent, CallbackId, CallbackSender, ClientConn, ConnectionId, Endpoint,
    HandlerSettings, SessionSnapshot,
};
pub use credentials::Credentials;
pub use subscription::{Subscription, SubscriptionId, SubscriptionStatus};
