//! # Transport Module
//!
//! The socket-owning side of a connection.
//!
//! ## Core Components:
//! - **`events`**: the closed event vocabulary a transport delivers to its
//!   owner, plus stream references and down-reason classification.
//! - **`handle`**: the owner-side command handle and the liveness monitor.
//! - **`actor`**: the spawned task that owns the socket, performs the
//!   two-phase establishment and pumps frames.
//!
//! Exactly one owner receives events at any moment; the ownership-transfer
//! protocol in the runtime swaps the delivery channel atomically via
//! [`TransportCommand::SetOwner`](handle::TransportCommand).

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// The socket-owning task.
pub mod actor;
/// Transport events and down reasons.
pub mod events;
/// Owner-side handles.
pub mod handle;

// --- Public API Re-exports ---
pub use actor::{spawn, TransportConfig};
pub use events::{DownReason, StreamRef, TransportEvent};
pub use handle::{MonitorHandle, TransportCommand, TransportError, TransportHandle};
