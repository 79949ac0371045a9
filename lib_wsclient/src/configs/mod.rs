//! # Configuration Module
//!
//! Normalization and validation of connection configuration. The transport
//! options map is the only free-form input the core accepts; everything else
//! is typed at the client API boundary.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Transport option whitelisting, defaults and validation.
pub mod options;

// --- Public API Re-exports ---
pub use options::{parse_and_validate, OptionsError, RetryLimit, TransportKind, TransportOpts};
