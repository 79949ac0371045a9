//! # Credentials
//!
//! Authentication material held by the canonical session state. The struct
//! deliberately has a redacting `Debug` implementation: credentials survive
//! reconnects inside the runtime and must never reach a log line or leave
//! the actor boundary except through the AuthHandler callbacks.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use serde_json::{Map, Value};

/// API credentials for the remote endpoint.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Public API key / client id.
    pub api_key: Option<String>,
    /// Secret used by the auth handler to sign requests.
    pub api_secret: Option<String>,
    /// A pre-issued session token, when the venue uses token auth.
    pub token: Option<String>,
    /// Venue-specific extras consumed only by the auth handler.
    pub extra: Map<String, Value>,
}

impl Credentials {
    /// True when no field carries any material.
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.api_secret.is_none()
            && self.token.is_none()
            && self.extra.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(field: &Option<String>) -> &'static str {
            if field.is_some() {
                "\"***\""
            } else {
                "None"
            }
        }
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &mask(&self.api_secret))
            .field("token", &mask(&self.token))
            .field("extra_keys", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_material() {
        let credentials = Credentials {
            api_key: Some("AK-123".to_string()),
            api_secret: Some("very-secret".to_string()),
            token: None,
            extra: Map::new(),
        };
        let rendered = format!("{:?}", credentials);
        assert!(!rendered.contains("AK-123"));
        assert!(!rendered.contains("very-secret"));
    }
}
