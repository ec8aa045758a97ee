//! Access layer
//!
//! Every collaborator call goes through [`AccessLayer::fetch`]:
//! 1. cache lookup; a hit returns without touching the rate limiter
//! 2. one rate-limit token per attempt
//! 3. the call itself, retried with backoff on transient failures
//! 4. a complete result is cached, a cancelled one never is
//!
//! "Not found" is a successful, empty result and is cached like any other.

mod error;
mod retry;

pub use error::FetchError;
pub use retry::RetryPolicy;

use crate::cache::ResultCache;
use crate::limiter::RateLimiter;
use crate::metrics::Metrics;
use crate::query::Query;
use crate::records::CollaboratorRecord;
use crate::search::CancelToken;
use crate::sources::Collaborator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Records returned for one collaborator
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub records: Vec<CollaboratorRecord>,
    pub fetched_at: DateTime<Utc>,
    pub from_cache: bool,
}

/// Cache, rate limiter and retry policy in front of the collaborators
pub struct AccessLayer {
    cache: Arc<ResultCache>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl AccessLayer {
    pub fn new(cache: Arc<ResultCache>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            cache,
            limiter,
            retry: RetryPolicy::default(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Fetch the records of one collaborator for a query
    ///
    /// `query_key` is the normalized cache key of `query`; `ttl` is the
    /// collaborator's cache lifetime; each attempt is bounded by `call_timeout`.
    pub async fn fetch(
        &self,
        source: &dyn Collaborator,
        query: &Query,
        query_key: &str,
        ttl: Duration,
        call_timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<FetchOutcome, FetchError> {
        let name = source.name();

        if let Some(entry) = self.cache.get(name, query_key).await {
            debug!("Cache hit for {} ({} records)", name, entry.records.len());
            self.metrics.record_cache_hit(name);
            return Ok(FetchOutcome {
                records: entry.records.as_ref().clone(),
                fetched_at: entry.fetched_at,
                from_cache: true,
            });
        }

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            tokio::select! {
                permit = self.limiter.acquire(name) => { permit?; }
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            }

            self.metrics.record_call(name);
            let start = Instant::now();
            let result = tokio::select! {
                r = tokio::time::timeout(call_timeout, source.fetch(query)) => {
                    r.unwrap_or(Err(FetchError::Timeout))
                }
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let records = match result {
                Ok(records) => records,
                Err(FetchError::NotFound) => {
                    debug!("{} has no data for this query", name);
                    Vec::new()
                }
                Err(err) if err.is_transient() && self.retry.should_retry(attempt) => {
                    self.metrics.record_error(name, err.kind());
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "{} attempt {} failed ({}), retrying in {:?}",
                        name,
                        attempt + 1,
                        err,
                        delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    }
                    attempt += 1;
                    continue;
                }
                Err(err) => {
                    self.metrics.record_error(name, err.kind());
                    return Err(err);
                }
            };

            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let fetched_at = Utc::now();
            let records: Vec<CollaboratorRecord> = records
                .into_iter()
                .map(|mut r| {
                    r.retrieved_at = fetched_at;
                    r
                })
                .collect();

            self.metrics.record_success(name, elapsed_ms);
            self.cache.put(name, query_key, records.clone(), ttl).await;
            debug!("{} returned {} records in {}ms", name, records.len(), elapsed_ms);

            return Ok(FetchOutcome {
                records,
                fetched_at,
                from_cache: false,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RateLimit;
    use crate::records::SourceCategory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Plays back a scripted sequence of results, then succeeds
    struct Scripted {
        calls: AtomicU32,
        script: Mutex<Vec<Result<Vec<CollaboratorRecord>, FetchError>>>,
        delay: Duration,
    }

    impl Scripted {
        fn new(script: Vec<Result<Vec<CollaboratorRecord>, FetchError>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script.into_iter().rev().collect()),
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Collaborator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn kind(&self) -> SourceCategory {
            SourceCategory::News
        }

        async fn fetch(&self, _query: &Query) -> Result<Vec<CollaboratorRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(vec![record()]))
        }
    }

    fn record() -> CollaboratorRecord {
        CollaboratorRecord::new("scripted", SourceCategory::News, "Acme news")
    }

    fn layer(limiter: RateLimiter) -> AccessLayer {
        AccessLayer::new(Arc::new(ResultCache::new(100)), Arc::new(limiter))
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    const TTL: Duration = Duration::from_secs(60);
    const CALL: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_cache_hit_consumes_no_token() {
        let limit = RateLimit {
            capacity: 1,
            refill_every_ms: 60_000,
            max_wait_ms: 0,
        };
        let access = layer(RateLimiter::with_limits([("scripted", limit)]));
        let source = Scripted::new(vec![]);
        let query = Query::new("Acme");
        let cancel = CancelToken::new();

        let first = access.fetch(&source, &query, "k", TTL, CALL, &cancel).await.unwrap();
        assert!(!first.from_cache);

        // the only token is spent; a second fetch must come from the cache
        let second = access.fetch(&source, &query, "k", TTL, CALL, &cancel).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.records, first.records);
        assert_eq!(source.calls(), 1);

        // a different key misses and runs into the empty bucket
        let err = access.fetch(&source, &query, "other", TTL, CALL, &cancel).await.unwrap_err();
        assert_eq!(err, FetchError::RateExceeded);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let access = layer(RateLimiter::new());
        let source = Scripted::new(vec![
            Err(FetchError::Unavailable("503".into())),
            Err(FetchError::Timeout),
        ]);
        let cancel = CancelToken::new();

        let outcome = access
            .fetch(&source, &Query::new("Acme"), "k", TTL, CALL, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let access = layer(RateLimiter::new());
        let source = Scripted::new(vec![
            Err(FetchError::Unavailable("a".into())),
            Err(FetchError::Unavailable("b".into())),
            Err(FetchError::Unavailable("c".into())),
        ]);
        let cancel = CancelToken::new();

        let err = access
            .fetch(&source, &Query::new("Acme"), "k", TTL, CALL, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Unavailable("c".into()));
        assert_eq!(source.calls(), 3);
        assert!(access.cache().get("scripted", "k").await.is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_empty_success() {
        let access = layer(RateLimiter::new());
        let source = Scripted::new(vec![Err(FetchError::NotFound)]);
        let cancel = CancelToken::new();

        let outcome = access
            .fetch(&source, &Query::new("Acme"), "k", TTL, CALL, &cancel)
            .await
            .unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_parse_error_is_not_retried() {
        let access = layer(RateLimiter::new());
        let source = Scripted::new(vec![Err(FetchError::parse("garbage"))]);
        let cancel = CancelToken::new();

        let err = access
            .fetch(&source, &Query::new("Acme"), "k", TTL, CALL, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ParseError(_)));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_is_not_cached() {
        let access = layer(RateLimiter::new());
        let mut source = Scripted::new(vec![]);
        source.delay = Duration::from_secs(10);
        let cancel = CancelToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = access
            .fetch(&source, &Query::new("Acme"), "k", TTL, Duration::from_secs(30), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Cancelled);
        assert!(access.cache().get("scripted", "k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let access = layer(RateLimiter::new()).with_retry(RetryPolicy::new(1, Duration::ZERO));
        let mut source = Scripted::new(vec![]);
        source.delay = Duration::from_secs(10);
        let cancel = CancelToken::new();

        let err = access
            .fetch(&source, &Query::new("Acme"), "k", TTL, Duration::from_secs(2), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }
}
