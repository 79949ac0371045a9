//! # Behaviors Module
//!
//! The eight pluggable contracts the runtime invokes. Every method has a
//! default implementation, so an adopter can take the core into production
//! by overriding a single method of a single trait; the bridge interprets
//! the returned outcome enums and nothing else.
//!
//! ## Contained Behaviors:
//! - **`connection`**: connect/disconnect/frame lifecycle.
//! - **`message`**: the JSON message pipeline behind text frames.
//! - **`error`**: transport-fault classification and policy.
//! - **`auth`**: authentication request building and response
//!   classification.
//! - **`subscription`**: subscribe/unsubscribe protocol.
//! - **`rate_limit`**: cost overrides and limiter notifications.
//! - **`logging`**: structured event logging hooks.
//! - **`metrics`**: the minimal counter/histogram interface.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Authentication behavior.
pub mod auth;
/// Connection lifecycle behavior.
pub mod connection;
/// Transport-fault behavior.
pub mod error;
/// Rate-limit behavior.
pub mod rate_limit;
/// Logging behavior.
pub mod logging;
/// Message-pipeline behavior.
pub mod message;
/// Metrics behavior.
pub mod metrics;
/// Subscription-protocol behavior.
pub mod subscription;

// --- Public API Re-exports ---
pub use auth::{AuthError, AuthHandler, AuthOutcome, DefaultAuthHandler};
pub use connection::{
    ConnectInfo, ConnectOutcome, ConnectionHandler, DefaultConnectionHandler, DisconnectCause,
    DisconnectInfo, DisconnectOutcome, FrameOutcome,
};
pub use error::{DefaultErrorHandler, ErrorHandler, ErrorInfo, ErrorOutcome};
pub use logging::{DefaultLoggingHandler, LoggingHandler};
pub use message::{DefaultMessageHandler, MessageHandler, MessageOutcome};
pub use metrics::{DefaultMetricsCollector, MetricsCollector};
pub use rate_limit::{DefaultRateLimitHandler, RateLimitHandler};
pub use subscription::{DefaultSubscriptionHandler, SubscriptionHandler, SubscriptionResponse};

use std::sync::Arc;

/// # Handler Set
///
/// The behavior modules referenced by a session: shared, stateless (or
/// internally synchronized) trait objects, not per-connection state.
#[derive(Clone)]
pub struct HandlerSet {
    /// Connection lifecycle behavior.
    pub connection: Arc<dyn ConnectionHandler>,
    /// Message-pipeline behavior.
    pub message: Arc<dyn MessageHandler>,
    /// Transport-fault behavior.
    pub error: Arc<dyn ErrorHandler>,
    /// Authentication behavior.
    pub auth: Arc<dyn AuthHandler>,
    /// Subscription-protocol behavior.
    pub subscription: Arc<dyn SubscriptionHandler>,
    /// Rate-limit behavior.
    pub rate_limit: Arc<dyn RateLimitHandler>,
    /// Logging behavior.
    pub logging: Arc<dyn LoggingHandler>,
    /// Metrics behavior.
    pub metrics: Arc<dyn MetricsCollector>,
}

impl Default for HandlerSet {
    fn default() -> Self {
        Self {
            connection: Arc::new(DefaultConnectionHandler),
            message: Arc::new(DefaultMessageHandler),
            error: Arc::new(DefaultErrorHandler),
            auth: Arc::new(DefaultAuthHandler),
            subscription: Arc::new(DefaultSubscriptionHandler),
            rate_limit: Arc::new(DefaultRateLimitHandler),
            logging: Arc::new(DefaultLoggingHandler),
            metrics: Arc::new(DefaultMetricsCollector),
        }
    }
}

impl HandlerSet {
    /// Replaces the connection handler.
    pub fn with_connection(mut self, handler: Arc<dyn ConnectionHandler>) -> Self {
        self.connection = handler;
        self
    }

    /// Replaces the message handler.
    pub fn with_message(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.message = handler;
        self
    }

    /// Replaces the error handler.
    pub fn with_error(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error = handler;
        self
    }

    /// Replaces the auth handler.
    pub fn with_auth(mut self, handler: Arc<dyn AuthHandler>) -> Self {
        self.auth = handler;
        self
    }

    /// Replaces the subscription handler.
    pub fn with_subscription(mut self, handler: Arc<dyn SubscriptionHandler>) -> Self {
        self.subscription = handler;
        self
    }

    /// Replaces the rate-limit handler.
    pub fn with_rate_limit(mut self, handler: Arc<dyn RateLimitHandler>) -> Self {
        self.rate_limit = handler;
        self
    }

    /// Replaces the logging handler.
    pub fn with_logging(mut self, handler: Arc<dyn LoggingHandler>) -> Self {
        self.logging = handler;
        self
    }

    /// Replaces the metrics collector.
    pub fn with_metrics(mut self, handler: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = handler;
        self
    }
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HandlerSet { .. }")
    }
}
