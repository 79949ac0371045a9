//! # Subscriptions
//!
//! Declared channel subscriptions with their lifecycle and an append-only
//! status history. Only `confirmed` subscriptions count as active; confirmed
//! subscriptions are re-requested automatically after every successful
//! reconnection.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque subscription identifier, stable across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Mints a fresh random identifier.
    pub fn mint() -> Self {
        SubscriptionId(format!("sub-{:016x}", rand::rng().random::<u64>()))
    }

    /// Wraps an identifier received from outside (e.g. a server ack echo).
    pub fn from_raw(raw: &str) -> Self {
        SubscriptionId(raw.to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Requested, no server answer yet.
    Pending,
    /// Positively acknowledged by the server.
    Confirmed,
    /// Negatively acknowledged.
    Failed,
    /// No answer within the subscription timeout window.
    Timeout,
    /// Cleanly unsubscribed.
    Unsubscribed,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Confirmed => "confirmed",
            SubscriptionStatus::Failed => "failed",
            SubscriptionStatus::Timeout => "timeout",
            SubscriptionStatus::Unsubscribed => "unsubscribed",
        };
        write!(f, "{}", name)
    }
}

/// # Subscription
///
/// One declared channel subscription. `history` is append-only; the head of
/// the lifecycle is always `(Pending, creation time)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Stable identifier.
    pub id: SubscriptionId,
    /// Channel name, e.g. `"book.BTC"`.
    pub channel: String,
    /// Channel parameters forwarded to the subscription handler.
    pub params: Value,
    /// Current lifecycle status.
    pub status: SubscriptionStatus,
    /// When the current status was entered.
    pub status_since: DateTime<Utc>,
    /// Append-only record of every status this subscription has held.
    pub history: Vec<(SubscriptionStatus, DateTime<Utc>)>,
}

impl Subscription {
    /// A fresh pending subscription.
    pub fn new(channel: &str, params: Value) -> Self {
        let now = Utc::now();
        Self {
            id: SubscriptionId::mint(),
            channel: channel.to_string(),
            params,
            status: SubscriptionStatus::Pending,
            status_since: now,
            history: vec![(SubscriptionStatus::Pending, now)],
        }
    }

    /// Moves to a new status, appending to the history.
    pub fn set_status(&mut self, status: SubscriptionStatus) {
        let now = Utc::now();
        self.status = status;
        self.status_since = now;
        self.history.push((status, now));
    }

    /// Only confirmed subscriptions count as active.
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_is_append_only() {
        let mut sub = Subscription::new("book.BTC", json!({"depth": 10}));
        assert_eq!(sub.status, SubscriptionStatus::Pending);
        assert_eq!(sub.history.len(), 1);

        sub.set_status(SubscriptionStatus::Confirmed);
        sub.set_status(SubscriptionStatus::Unsubscribed);
        assert_eq!(sub.history.len(), 3);
        assert_eq!(sub.history[0].0, SubscriptionStatus::Pending);
        assert_eq!(sub.history[1].0, SubscriptionStatus::Confirmed);
        assert_eq!(sub.history[2].0, SubscriptionStatus::Unsubscribed);
    }

    #[test]
    fn only_confirmed_is_active() {
        let mut sub = Subscription::new("trades.ETH", Value::Null);
        assert!(!sub.is_active());
        sub.set_status(SubscriptionStatus::Confirmed);
        assert!(sub.is_active());
        sub.set_status(SubscriptionStatus::Timeout);
        assert!(!sub.is_active());
    }
}
