//! Test support for the workspace integration tests: an in-process
//! WebSocket peer speaking the neutral subscription/auth shapes the
//! library's default handlers understand.

pub mod support;
