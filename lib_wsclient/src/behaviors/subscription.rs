//! # Subscription Handler
//!
//! Builds subscribe/unsubscribe requests and classifies server
//! acknowledgements. The default speaks a neutral shape
//! (`{"method":"subscribe", ...}` out, `{"type":"subscribed","id":...}` in)
//! that venue adapters replace wholesale.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use serde_json::{json, Value};

use crate::session::{Subscription, SubscriptionId};

/// Classification of an inbound message against the subscription protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionResponse {
    /// Positive acknowledgement for the given subscription.
    Confirmed {
        /// The acknowledged subscription.
        id: SubscriptionId,
    },
    /// Negative acknowledgement.
    Rejected {
        /// The rejected subscription.
        id: SubscriptionId,
        /// Server-supplied reason.
        reason: String,
    },
    /// Clean unsubscribe acknowledgement.
    Unsubscribed {
        /// The released subscription.
        id: SubscriptionId,
    },
    /// The message is not part of the subscription exchange.
    Unrelated,
}

/// Subscription protocol behavior.
pub trait SubscriptionHandler: Send + Sync {
    /// Builds the subscribe request for a declared subscription.
    fn build_subscribe_request(&self, subscription: &Subscription) -> Value {
        json!({
            "method": "subscribe",
            "params": {
                "channel": subscription.channel,
                "args": subscription.params,
            },
            "id": subscription.id.as_str(),
        })
    }

    /// Builds the unsubscribe request.
    fn build_unsubscribe_request(&self, subscription: &Subscription) -> Value {
        json!({
            "method": "unsubscribe",
            "params": {
                "channel": subscription.channel,
            },
            "id": subscription.id.as_str(),
        })
    }

    /// Classifies an inbound message.
    fn classify_response(&self, message: &Value) -> SubscriptionResponse {
        let id = match message.get("id").and_then(Value::as_str) {
            Some(id) => SubscriptionId::from_raw(id),
            None => return SubscriptionResponse::Unrelated,
        };
        match message.get("type").and_then(Value::as_str) {
            Some("subscribed") => SubscriptionResponse::Confirmed { id },
            Some("unsubscribed") => SubscriptionResponse::Unsubscribed { id },
            Some("subscription_error") => SubscriptionResponse::Rejected {
                id,
                reason: message
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("subscription rejected")
                    .to_string(),
            },
            _ => SubscriptionResponse::Unrelated,
        }
    }
}

/// The neutral-protocol implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSubscriptionHandler;

impl SubscriptionHandler for DefaultSubscriptionHandler {}
