//! # Token-Bucket Rate Limiter
//!
//! Admission control for outbound requests. Tokens refill at a fixed rate up
//! to a cap; each admitted request consumes a configurable cost. Requests
//! that cannot be admitted immediately wait in a bounded queue ordered by
//! priority (FIFO within the same priority) and are drained by the runtime's
//! tick timer as tokens become available.
//!
//! The limiter is a pure state machine: it performs no I/O and holds no
//! clock. The owning runtime feeds it monotonic instants on every tick, which
//! keeps the refill arithmetic trivially testable.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Admission mode, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimiterMode {
    /// Token-bucket admission with queueing.
    #[default]
    Normal,
    /// Admit everything without touching the bucket.
    AlwaysAllow,
    /// Queue everything (subject to the queue limit).
    AlwaysQueue,
    /// Reject everything.
    AlwaysReject,
}

impl LimiterMode {
    /// Parses a mode name, rejecting anything outside the closed set.
    pub fn parse(name: &str) -> Result<Self, RateLimitError> {
        match name {
            "normal" => Ok(LimiterMode::Normal),
            "always_allow" => Ok(LimiterMode::AlwaysAllow),
            "always_queue" => Ok(LimiterMode::AlwaysQueue),
            "always_reject" => Ok(LimiterMode::AlwaysReject),
            other => Err(RateLimitError::InvalidMode(other.to_string())),
        }
    }
}

/// Rejection reasons surfaced synchronously to the caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The bucket is empty and no queue slot is available.
    #[error("rate_limit_exceeded")]
    RateLimitExceeded,
    /// The wait queue is at its limit.
    #[error("queue_full")]
    QueueFull,
}

/// Limiter configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// A mode name outside `normal | always_allow | always_queue | always_reject`.
    #[error("invalid rate limiter mode '{0}'")]
    InvalidMode(String),
    /// The refill interval must be a positive number of milliseconds.
    #[error("refill interval must be positive")]
    InvalidRefillInterval,
}

/// Static limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of tokens the bucket holds.
    pub capacity: u32,
    /// Tokens added per refill interval.
    pub refill_rate: u32,
    /// Length of one refill interval.
    pub refill_interval: Duration,
    /// Maximum number of queued requests; 0 disables queueing.
    pub queue_limit: usize,
    /// Cost per request kind; kinds not present cost [`DEFAULT_COST`].
    pub cost_map: HashMap<String, u32>,
    /// Admission mode.
    pub mode: LimiterMode,
}

/// Cost applied to request kinds absent from the cost map.
pub const DEFAULT_COST: u32 = 1;

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 60,
            refill_rate: 1,
            refill_interval: Duration::from_millis(1_000),
            queue_limit: 100,
            cost_map: HashMap::new(),
            mode: LimiterMode::Normal,
        }
    }
}

/// A single admission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRequest {
    /// Request kind, looked up in the cost map (e.g. `"subscription"`).
    pub kind: String,
    /// Higher priorities are queued ahead of lower ones.
    pub priority: i32,
}

impl RateRequest {
    /// A request of the given kind with the default priority of 0.
    pub fn of_kind(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            priority: 0,
        }
    }
}

/// Outcome of an admission check. `Allow` and `Reject` hand the item back
/// so the caller can dispatch it now or fail its pending acknowledgement.
#[derive(Debug)]
pub enum RateDecision<T> {
    /// Tokens were consumed; send now.
    Allow(T),
    /// Parked in the wait queue; a later tick will release it.
    Queued,
    /// Not admitted; the item is returned to the caller.
    Reject {
        /// Why the request was rejected.
        reason: RejectReason,
        /// The item passed to [`RateLimiter::check`].
        item: T,
    },
}

struct QueuedEntry<T> {
    request: RateRequest,
    cost: u32,
    item: T,
}

/// # Rate Limiter
///
/// Token bucket over an ordered wait queue. `T` is whatever the owner needs
/// to resume a deferred request (the runtime queues the frame plus its
/// pending acknowledgement channel).
pub struct RateLimiter<T> {
    config: RateLimiterConfig,
    tokens: u32,
    last_refill: Instant,
    queue: VecDeque<QueuedEntry<T>>,
}

impl<T> RateLimiter<T> {
    /// Creates a limiter with a full bucket.
    pub fn new(config: RateLimiterConfig, now: Instant) -> Result<Self, RateLimitError> {
        if config.refill_interval.is_zero() {
            return Err(RateLimitError::InvalidRefillInterval);
        }
        Ok(Self {
            tokens: config.capacity,
            last_refill: now,
            queue: VecDeque::new(),
            config,
        })
    }

    /// Current token count.
    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    /// Number of requests parked in the wait queue.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Cost of a request, from the cost map or the default.
    pub fn cost_of(&self, request: &RateRequest) -> u32 {
        self.config
            .cost_map
            .get(&request.kind)
            .copied()
            .unwrap_or(DEFAULT_COST)
    }

    /// Installs a cost for a request kind (the rate-limit behavior may
    /// override the configured map).
    pub fn override_cost(&mut self, kind: &str, cost: u32) {
        self.config.cost_map.insert(kind.to_string(), cost);
    }

    /// Empties the wait queue, returning the parked items so the owner can
    /// fail their acknowledgements (used on connection close).
    pub fn drain(&mut self) -> Vec<T> {
        self.queue.drain(..).map(|entry| entry.item).collect()
    }

    /// Admission check. In `Normal` mode the request is admitted when the
    /// bucket holds at least its cost, queued while a slot is free, and
    /// rejected otherwise.
    pub fn check(&mut self, request: RateRequest, item: T) -> RateDecision<T> {
        match self.config.mode {
            LimiterMode::AlwaysAllow => return RateDecision::Allow(item),
            LimiterMode::AlwaysReject => {
                return RateDecision::Reject {
                    reason: RejectReason::RateLimitExceeded,
                    item,
                }
            }
            LimiterMode::AlwaysQueue => return self.enqueue(request, item),
            LimiterMode::Normal => {}
        }

        let cost = self.cost_of(&request);
        if self.tokens >= cost {
            self.tokens -= cost;
            RateDecision::Allow(item)
        } else if self.config.queue_limit == 0 {
            RateDecision::Reject {
                reason: RejectReason::RateLimitExceeded,
                item,
            }
        } else {
            self.enqueue(request, item)
        }
    }

    /// Advances the refill clock and, when the head of the queue is
    /// affordable, releases it. Callers drain the queue by looping until
    /// `None`.
    pub fn tick(&mut self, now: Instant) -> Option<(RateRequest, T)> {
        self.refill(now);
        let affordable = self
            .queue
            .front()
            .map(|entry| entry.cost <= self.tokens)
            .unwrap_or(false);
        if affordable {
            let entry = self.queue.pop_front().expect("head checked above");
            self.tokens -= entry.cost;
            Some((entry.request, entry.item))
        } else {
            None
        }
    }

    /// Refills tokens proportional to elapsed whole intervals. The refill
    /// clock only advances by the intervals actually consumed, so fractional
    /// elapsed time is never lost to truncation.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let interval_ms = self.config.refill_interval.as_millis() as u64;
        let intervals = elapsed.as_millis() as u64 / interval_ms;
        if intervals == 0 {
            return;
        }
        let added = intervals.saturating_mul(self.config.refill_rate as u64);
        self.tokens = self
            .tokens
            .saturating_add(added.min(u32::MAX as u64) as u32)
            .min(self.config.capacity);
        self.last_refill += self.config.refill_interval * intervals as u32;
    }

    fn enqueue(&mut self, request: RateRequest, item: T) -> RateDecision<T> {
        if self.queue.len() >= self.config.queue_limit {
            return RateDecision::Reject {
                reason: RejectReason::QueueFull,
                item,
            };
        }
        let cost = self.cost_of(&request);
        // Insert behind every entry of equal or higher priority: FIFO within
        // a priority band, higher bands drain first.
        let position = self
            .queue
            .iter()
            .rposition(|entry| entry.request.priority >= request.priority)
            .map(|index| index + 1)
            .unwrap_or(0);
        self.queue.insert(
            position,
            QueuedEntry {
                request,
                cost,
                item,
            },
        );
        RateDecision::Queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_costs(queue_limit: usize) -> RateLimiterConfig {
        let mut cost_map = HashMap::new();
        cost_map.insert("subscription".to_string(), 5);
        cost_map.insert("auth".to_string(), 10);
        cost_map.insert("query".to_string(), 1);
        RateLimiterConfig {
            capacity: 60,
            refill_rate: 1,
            refill_interval: Duration::from_millis(1_000),
            queue_limit,
            cost_map,
            mode: LimiterMode::Normal,
        }
    }

    #[test]
    fn token_bucket_drains_and_refills() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(config_with_costs(0), start).unwrap();

        // 12 subscriptions at cost 5 empty the 60-token bucket.
        for i in 0..12 {
            let decision = limiter.check(RateRequest::of_kind("subscription"), i);
            assert!(matches!(decision, RateDecision::Allow(_)), "request {}", i);
        }
        assert_eq!(limiter.tokens(), 0);

        // The 13th is rejected outright: no queue configured.
        match limiter.check(RateRequest::of_kind("subscription"), 13) {
            RateDecision::Reject { reason, item } => {
                assert_eq!(reason, RejectReason::RateLimitExceeded);
                assert_eq!(item, 13);
            }
            other => panic!("expected reject, got {:?}", other),
        }

        // 5 seconds of refill at 1 token/s: exactly one more subscription.
        limiter.refill(start + Duration::from_millis(5_000));
        assert_eq!(limiter.tokens(), 5);
        assert!(matches!(
            limiter.check(RateRequest::of_kind("subscription"), 14),
            RateDecision::Allow(_)
        ));
        assert_eq!(limiter.tokens(), 0);
    }

    #[test]
    fn queue_releases_in_priority_then_fifo_order() {
        let start = Instant::now();
        let mut config = config_with_costs(10);
        config.capacity = 1;
        config.refill_rate = 1;
        let mut limiter = RateLimiter::new(config, start).unwrap();

        // Drain the single token, then park four requests.
        assert!(matches!(
            limiter.check(RateRequest::of_kind("query"), "first"),
            RateDecision::Allow(_)
        ));
        for (priority, tag) in [(0, "low-a"), (5, "high-a"), (0, "low-b"), (5, "high-b")] {
            let request = RateRequest {
                kind: "query".to_string(),
                priority,
            };
            assert!(matches!(limiter.check(request, tag), RateDecision::Queued));
        }
        assert_eq!(limiter.queue_len(), 4);

        let mut released = Vec::new();
        let mut now = start;
        while limiter.queue_len() > 0 {
            now += Duration::from_millis(1_000);
            while let Some((_, tag)) = limiter.tick(now) {
                released.push(tag);
            }
        }
        assert_eq!(released, vec!["high-a", "high-b", "low-a", "low-b"]);
    }

    #[test]
    fn queue_limit_is_enforced() {
        let start = Instant::now();
        let mut config = config_with_costs(2);
        config.capacity = 0;
        let mut limiter = RateLimiter::new(config, start).unwrap();

        assert!(matches!(
            limiter.check(RateRequest::of_kind("query"), 1),
            RateDecision::Queued
        ));
        assert!(matches!(
            limiter.check(RateRequest::of_kind("query"), 2),
            RateDecision::Queued
        ));
        match limiter.check(RateRequest::of_kind("query"), 3) {
            RateDecision::Reject { reason, .. } => assert_eq!(reason, RejectReason::QueueFull),
            other => panic!("expected reject, got {:?}", other),
        }
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let start = Instant::now();
        let mut limiter: RateLimiter<()> =
            RateLimiter::new(config_with_costs(0), start).unwrap();
        limiter.refill(start + Duration::from_secs(3_600));
        assert_eq!(limiter.tokens(), 60);
    }

    #[test]
    fn fractional_intervals_are_not_lost() {
        let start = Instant::now();
        let mut config = config_with_costs(0);
        config.capacity = 10;
        let mut limiter: RateLimiter<()> = RateLimiter::new(config, start).unwrap();
        // Empty the bucket by hand.
        for _ in 0..10 {
            assert!(matches!(
                limiter.check(RateRequest::of_kind("query"), ()),
                RateDecision::Allow(_)
            ));
        }
        // 1.5 intervals: one token now, the half interval stays banked.
        limiter.refill(start + Duration::from_millis(1_500));
        assert_eq!(limiter.tokens(), 1);
        limiter.refill(start + Duration::from_millis(2_000));
        assert_eq!(limiter.tokens(), 2);
    }

    #[test]
    fn modes_override_admission() {
        let start = Instant::now();
        let mut config = config_with_costs(1);
        config.mode = LimiterMode::AlwaysReject;
        let mut limiter = RateLimiter::new(config, start).unwrap();
        assert!(matches!(
            limiter.check(RateRequest::of_kind("query"), 1),
            RateDecision::Reject {
                reason: RejectReason::RateLimitExceeded,
                ..
            }
        ));

        let mut config = config_with_costs(1);
        config.mode = LimiterMode::AlwaysQueue;
        let mut limiter = RateLimiter::new(config, start).unwrap();
        assert!(matches!(
            limiter.check(RateRequest::of_kind("query"), 1),
            RateDecision::Queued
        ));

        let mut config = config_with_costs(0);
        config.mode = LimiterMode::AlwaysAllow;
        config.capacity = 0;
        let mut limiter = RateLimiter::new(config, start).unwrap();
        assert!(matches!(
            limiter.check(RateRequest::of_kind("query"), 1),
            RateDecision::Allow(_)
        ));
        assert!(LimiterMode::parse("bogus").is_err());
    }
}
