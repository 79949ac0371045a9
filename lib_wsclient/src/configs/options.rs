//! # Transport Option Normalization
//!
//! Raw transport options arrive as a free-form JSON map (exactly what a
//! config file or an upstream caller hands over). `parse_and_validate`
//! normalizes them against a closed whitelist, applies defaults, and rejects
//! values outside the validated domains. Keys outside the whitelist are
//! dropped with a warning: behavior-specific settings belong in the
//! per-handler settings bags, never in the transport map.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use serde_json::{Map, Value};
use thiserror::Error;

use crate::reconnect::BackoffType;

/// Keys the transport options map may carry; everything else is dropped.
const OPTION_WHITELIST: &[&str] = &[
    "transport",
    "protocols",
    "retry",
    "ws_opts",
    "backoff_type",
    "base_backoff",
];

/// Socket flavor for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Plain TCP.
    #[default]
    Plaintext,
    /// TLS over TCP.
    Tls,
}

impl TransportKind {
    /// Parses a transport name from the options map.
    pub fn parse(name: &str) -> Result<Self, OptionsError> {
        match name {
            "plaintext" | "tcp" => Ok(TransportKind::Plaintext),
            "tls" | "ssl" => Ok(TransportKind::Tls),
            other => Err(OptionsError::InvalidTransport(other.to_string())),
        }
    }
}

/// Connection-attempt budget: a finite count or retry-forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Give up after this many attempts.
    Finite(u32),
    /// Never give up.
    Infinite,
}

impl Default for RetryLimit {
    fn default() -> Self {
        RetryLimit::Finite(5)
    }
}

/// Errors from transport option validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptionsError {
    /// The raw options were not a JSON object.
    #[error("transport options must be a map")]
    NotAMap,
    /// `transport` outside `plaintext | tls`.
    #[error("invalid transport '{0}'")]
    InvalidTransport(String),
    /// `protocols` was not a list of strings.
    #[error("protocols must be a list of strings")]
    InvalidProtocols,
    /// `retry` was not a non-negative integer or `"infinity"`.
    #[error("invalid retry value: {0}")]
    InvalidRetry(String),
    /// `ws_opts` was not a map.
    #[error("ws_opts must be a map")]
    InvalidWsOpts,
    /// `backoff_type` outside `linear | exponential | jittered`.
    #[error("invalid backoff_type '{0}'")]
    InvalidBackoffType(String),
    /// `base_backoff` was not a positive integer.
    #[error("invalid base_backoff: {0}")]
    InvalidBaseBackoff(String),
}

/// # Normalized Transport Options
///
/// The validated, defaulted form of the raw transport map.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOpts {
    /// Socket flavor.
    pub transport: TransportKind,
    /// Upgrade protocols proposed to the server.
    pub protocols: Vec<String>,
    /// Connection-attempt budget.
    pub retry: RetryLimit,
    /// Opaque WebSocket options forwarded to the transport.
    pub ws_opts: Map<String, Value>,
    /// Delay curve used between reconnection attempts.
    pub backoff_type: BackoffType,
    /// Base reconnection delay in milliseconds.
    pub base_backoff: u64,
}

impl Default for TransportOpts {
    fn default() -> Self {
        Self {
            transport: TransportKind::Plaintext,
            protocols: vec!["http".to_string()],
            retry: RetryLimit::default(),
            ws_opts: Map::new(),
            backoff_type: BackoffType::Exponential,
            base_backoff: 1_000,
        }
    }
}

/// Normalizes and validates a raw transport options map.
pub fn parse_and_validate(raw: &Value) -> Result<TransportOpts, OptionsError> {
    let map = match raw {
        Value::Object(map) => map,
        Value::Null => return Ok(TransportOpts::default()),
        _ => return Err(OptionsError::NotAMap),
    };

    for key in map.keys() {
        if !OPTION_WHITELIST.contains(&key.as_str()) {
            log::warn!(
                "dropping transport option '{}': not in the whitelist, use a handler settings bag",
                key
            );
        }
    }

    let mut opts = TransportOpts::default();

    if let Some(value) = map.get("transport") {
        let name = value
            .as_str()
            .ok_or_else(|| OptionsError::InvalidTransport(value.to_string()))?;
        opts.transport = TransportKind::parse(name)?;
    }

    if let Some(value) = map.get("protocols") {
        let list = value.as_array().ok_or(OptionsError::InvalidProtocols)?;
        let mut protocols = Vec::with_capacity(list.len());
        for entry in list {
            let protocol = entry.as_str().ok_or(OptionsError::InvalidProtocols)?;
            protocols.push(protocol.to_string());
        }
        opts.protocols = protocols;
    }

    if let Some(value) = map.get("retry") {
        opts.retry = parse_retry(value)?;
    }

    if let Some(value) = map.get("ws_opts") {
        let ws_opts = value.as_object().ok_or(OptionsError::InvalidWsOpts)?;
        opts.ws_opts = ws_opts.clone();
    }

    if let Some(value) = map.get("backoff_type") {
        let name = value
            .as_str()
            .ok_or_else(|| OptionsError::InvalidBackoffType(value.to_string()))?;
        opts.backoff_type = parse_backoff_type(name)?;
    }

    if let Some(value) = map.get("base_backoff") {
        let millis = value
            .as_u64()
            .filter(|millis| *millis > 0)
            .ok_or_else(|| OptionsError::InvalidBaseBackoff(value.to_string()))?;
        opts.base_backoff = millis;
    }

    Ok(opts)
}

fn parse_retry(value: &Value) -> Result<RetryLimit, OptionsError> {
    match value {
        Value::String(s) if s == "infinity" => Ok(RetryLimit::Infinite),
        Value::Number(n) => n
            .as_u64()
            .filter(|count| *count <= u32::MAX as u64)
            .map(|count| RetryLimit::Finite(count as u32))
            .ok_or_else(|| OptionsError::InvalidRetry(value.to_string())),
        other => Err(OptionsError::InvalidRetry(other.to_string())),
    }
}

fn parse_backoff_type(name: &str) -> Result<BackoffType, OptionsError> {
    match name {
        "linear" => Ok(BackoffType::Linear),
        "exponential" => Ok(BackoffType::Exponential),
        "jittered" => Ok(BackoffType::Jittered),
        other => Err(OptionsError::InvalidBackoffType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_to_empty_input() {
        let opts = parse_and_validate(&json!({})).unwrap();
        assert_eq!(opts, TransportOpts::default());
        assert_eq!(opts.transport, TransportKind::Plaintext);
        assert_eq!(opts.protocols, vec!["http".to_string()]);
        assert_eq!(opts.retry, RetryLimit::Finite(5));
        assert_eq!(opts.backoff_type, BackoffType::Exponential);
        assert_eq!(opts.base_backoff, 1_000);
    }

    #[test]
    fn whitelisted_keys_are_parsed() {
        let opts = parse_and_validate(&json!({
            "transport": "tls",
            "protocols": ["http"],
            "retry": "infinity",
            "backoff_type": "jittered",
            "base_backoff": 250,
            "ws_opts": {"compress": true},
        }))
        .unwrap();
        assert_eq!(opts.transport, TransportKind::Tls);
        assert_eq!(opts.retry, RetryLimit::Infinite);
        assert_eq!(opts.backoff_type, BackoffType::Jittered);
        assert_eq!(opts.base_backoff, 250);
        assert_eq!(opts.ws_opts.get("compress"), Some(&json!(true)));
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let opts = parse_and_validate(&json!({
            "transport": "plaintext",
            "auth_signature_window": 30,
        }))
        .unwrap();
        assert_eq!(opts, TransportOpts::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            parse_and_validate(&json!({"transport": "carrier-pigeon"})),
            Err(OptionsError::InvalidTransport("carrier-pigeon".to_string()))
        );
        assert_eq!(
            parse_and_validate(&json!({"protocols": "http"})),
            Err(OptionsError::InvalidProtocols)
        );
        assert!(matches!(
            parse_and_validate(&json!({"retry": -1})),
            Err(OptionsError::InvalidRetry(_))
        ));
        assert!(matches!(
            parse_and_validate(&json!({"base_backoff": 0})),
            Err(OptionsError::InvalidBaseBackoff(_))
        ));
        assert_eq!(
            parse_and_validate(&json!([1, 2, 3])),
            Err(OptionsError::NotAMap)
        );
    }
}
