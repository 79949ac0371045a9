//! # Rate Limit Handler
//!
//! Per-request cost overrides and notifications when the limiter defers or
//! rejects a request.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use crate::limiter::{RateRequest, RejectReason};
use crate::session::ClientConn;

/// Rate-limit behavior.
pub trait RateLimitHandler: Send + Sync {
    /// Overrides the cost of a request; `None` falls back to the limiter's
    /// cost map.
    fn cost(&self, request: &RateRequest) -> Option<u32> {
        let _ = request;
        None
    }

    /// Notification: the request was parked in the wait queue.
    fn on_queued(&self, request: &RateRequest, conn: &mut ClientConn) {
        let _ = conn;
        log::debug!("rate limiter queued {} request", request.kind);
    }

    /// Notification: the request was rejected outright.
    fn on_rejected(&self, request: &RateRequest, reason: RejectReason, conn: &mut ClientConn) {
        let _ = conn;
        log::warn!("rate limiter rejected {} request: {}", request.kind, reason);
    }
}

/// Cost-map-only implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRateLimitHandler;

impl RateLimitHandler for DefaultRateLimitHandler {}
