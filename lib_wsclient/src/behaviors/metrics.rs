//! # Metrics Collector
//!
//! Minimal counter/histogram interface. The runtime reports frames in/out,
//! reconnect attempts and limiter rejections; sinks beyond this interface
//! are out of scope, so the default implementation only traces.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Metrics behavior.
pub trait MetricsCollector: Send + Sync {
    /// Adds `value` to a named counter.
    fn increment_counter(&self, name: &str, value: u64) {
        log::trace!("counter {} += {}", name, value);
    }

    /// Records one observation of a named histogram.
    fn observe_histogram(&self, name: &str, value: f64) {
        log::trace!("histogram {} <- {}", name, value);
    }
}

/// Trace-only implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMetricsCollector;

impl MetricsCollector for DefaultMetricsCollector {}
