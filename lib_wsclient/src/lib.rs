//! # lib_wsclient
//!
//! A supervised, reconnecting WebSocket client runtime for long-lived,
//! latency-sensitive connections (exchange feeds speaking JSON-RPC 2.0 over
//! WebSocket and the like).
//!
//! One actor task per connection owns both state layers: the canonical
//! session ([`session::ClientConn`] — credentials, subscriptions, behavior
//! modules, reconnection policy) that survives transport churn, and the
//! transport-local state ([`core::ConnectionState`]) that is discarded and
//! rebuilt on every reconnect. Outbound traffic passes a token-bucket rate
//! limiter; inbound transport events are translated into calls on the eight
//! pluggable behaviors; confirmed subscriptions are re-issued automatically
//! after every successful reconnect.

// Declare the modules to re-export
pub mod behaviors;
pub mod bridge;
pub mod client;
pub mod codec;
pub mod configs;
pub mod core;
pub mod limiter;
pub mod reconnect;
pub mod runtime;
pub mod session;
pub mod sync;
pub mod transport;

// Re-export the primary surface
pub use behaviors::{
    AuthHandler, ConnectionHandler, ErrorHandler, HandlerSet, LoggingHandler, MessageHandler,
    MetricsCollector, RateLimitHandler, SubscriptionHandler,
};
pub use client::{OpenOptions, WsClient};
pub use codec::{Frame, FrameCodec, Opcode};
pub use core::{ConnectionStatus, ConnectionSupervisor, SupervisorConfig};
pub use limiter::{LimiterMode, RateLimiterConfig, RateRequest};
pub use reconnect::{BackoffType, ReconnectPolicy};
pub use runtime::{ClientError, RuntimeConfig};
pub use session::{
    CallbackEvent, CallbackId, ClientConn, ConnectionId, Credentials, SessionSnapshot,
    Subscription, SubscriptionId, SubscriptionStatus,
};
pub use transport::{DownReason, StreamRef};
