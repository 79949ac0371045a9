//! # Core Module
//!
//! The connection state machine and its supervision.
//!
//! ## Core Components:
//! - **`status`**: the lifecycle state enum and the validated transition
//!   table.
//! - **`state`**: transport-local state (handle/monitor pair, active
//!   streams, last error) — discarded and rebuilt on every reconnect.
//! - **`manager`**: transitions with side effects, terminal-error
//!   classification and the reconnection decision.
//! - **`registry`**: stable connection id → runtime mailbox.
//! - **`supervisor`**: transient restart policy over connection runtimes.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Transitions, side effects and the reconnection decision.
pub mod manager;
/// Stable-id registry of live runtimes.
pub mod registry;
/// Transport-local connection state.
pub mod state;
/// The lifecycle state machine.
pub mod status;
/// Transient-restart supervision.
pub mod supervisor;

// --- Public API Re-exports ---
pub use manager::{ConnectionManager, ReconnectError, TransitionParams};
pub use registry::ConnectionRegistry;
pub use state::{ConnectionState, StreamInfo, StreamKind};
pub use status::{ConnectionStatus, StateError};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig};
