//! Per-collaborator request throttling
//!
//! Every collaborator gets its own token bucket (capacity + refill period).
//! `acquire` waits for a token up to the collaborator's maximum wait and
//! fails fast with [`RateExceeded`] when the bucket cannot refill in time.

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// No token became available within the configured wait budget
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("rate limit exceeded for {collaborator}")]
pub struct RateExceeded {
    pub collaborator: String,
}

/// Token bucket settings for one collaborator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimit {
    /// Bucket capacity (burst size)
    pub capacity: u32,
    /// Time to refill a single token, in milliseconds
    pub refill_every_ms: u64,
    /// Longest a caller may wait for a token, in milliseconds
    pub max_wait_ms: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            capacity: 1,
            refill_every_ms: 1000,
            max_wait_ms: 2000,
        }
    }
}

impl RateLimit {
    /// `n` requests per second with a burst of `n`
    pub fn per_second(n: u32) -> Self {
        let n = n.max(1);
        Self {
            capacity: n,
            refill_every_ms: (1000 / n as u64).max(1),
            ..Default::default()
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = max_wait.as_millis() as u64;
        self
    }

    fn quota(&self) -> Quota {
        let capacity = NonZeroU32::new(self.capacity).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(Duration::from_millis(self.refill_every_ms.max(1)))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        quota.allow_burst(capacity)
    }
}

/// Proof that a request may be issued
#[derive(Debug)]
pub struct Permit {
    _private: (),
}

struct Bucket {
    limiter: DefaultDirectRateLimiter,
    max_wait: Duration,
}

/// Rate limiter holding one bucket per collaborator
///
/// Constructed explicitly and shared by `Arc`; collaborators without a bucket
/// are not throttled.
#[derive(Default)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a limiter from `(collaborator, limit)` pairs
    pub fn with_limits<I, S>(limits: I) -> Self
    where
        I: IntoIterator<Item = (S, RateLimit)>,
        S: Into<String>,
    {
        let limiter = Self::new();
        for (name, limit) in limits {
            limiter.configure(name, limit);
        }
        limiter
    }

    /// Install or replace the bucket of a collaborator
    pub fn configure(&self, collaborator: impl Into<String>, limit: RateLimit) {
        let bucket = Bucket {
            limiter: DefaultDirectRateLimiter::direct(limit.quota()),
            max_wait: Duration::from_millis(limit.max_wait_ms),
        };
        self.buckets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(collaborator.into(), Arc::new(bucket));
    }

    /// Take a token, waiting at most the collaborator's maximum wait
    pub async fn acquire(&self, collaborator: &str) -> Result<Permit, RateExceeded> {
        let Some(bucket) = self.bucket(collaborator) else {
            return Ok(Permit { _private: () });
        };

        let wait = match bucket.limiter.check() {
            Ok(()) => return Ok(Permit { _private: () }),
            Err(not_until) => not_until.wait_time_from(DefaultClock::default().now()),
        };

        let exceeded = || RateExceeded {
            collaborator: collaborator.to_string(),
        };

        if wait > bucket.max_wait {
            debug!(
                "No token for {} within {:?} (next in {:?})",
                collaborator, bucket.max_wait, wait
            );
            return Err(exceeded());
        }

        tokio::time::timeout(bucket.max_wait, bucket.limiter.until_ready())
            .await
            .map(|_| Permit { _private: () })
            .map_err(|_| exceeded())
    }

    fn bucket(&self, collaborator: &str) -> Option<Arc<Bucket>> {
        self.buckets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(collaborator)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_collaborator_is_unlimited() {
        let limiter = RateLimiter::new();
        for _ in 0..100 {
            assert!(limiter.acquire("anything").await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_burst_then_fail_fast() {
        let limit = RateLimit {
            capacity: 2,
            refill_every_ms: 60_000,
            max_wait_ms: 10,
        };
        let limiter = RateLimiter::with_limits([("registry", limit)]);

        assert!(limiter.acquire("registry").await.is_ok());
        assert!(limiter.acquire("registry").await.is_ok());

        let err = limiter.acquire("registry").await.unwrap_err();
        assert_eq!(err.collaborator, "registry");
    }

    #[tokio::test]
    async fn test_waits_for_refill_within_budget() {
        let limit = RateLimit {
            capacity: 1,
            refill_every_ms: 50,
            max_wait_ms: 1000,
        };
        let limiter = RateLimiter::with_limits([("legal", limit)]);

        assert!(limiter.acquire("legal").await.is_ok());
        let start = std::time::Instant::now();
        assert!(limiter.acquire("legal").await.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_buckets_are_independent() {
        let limit = RateLimit {
            capacity: 1,
            refill_every_ms: 60_000,
            max_wait_ms: 0,
        };
        let limiter = RateLimiter::with_limits([("a", limit), ("b", limit)]);

        assert!(limiter.acquire("a").await.is_ok());
        assert!(limiter.acquire("a").await.is_err());
        assert!(limiter.acquire("b").await.is_ok());
    }

    #[test]
    fn test_rate_limit_constructors() {
        let per_sec = RateLimit::per_second(5);
        assert_eq!(per_sec.capacity, 5);
        assert_eq!(per_sec.refill_every_ms, 200);

        let patient = RateLimit::per_second(1).with_max_wait(Duration::from_secs(5));
        assert_eq!(patient.capacity, 1);
        assert_eq!(patient.refill_every_ms, 1000);
        assert_eq!(patient.max_wait_ms, 5000);
    }
}
