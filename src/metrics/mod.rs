//! Metrics collection module
//!
//! Tracks per-source call counts, error rates, cache hits and latency.

use crate::records::FailureKind;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Latencies kept per source for the rolling average
const LATENCY_WINDOW: usize = 100;

#[derive(Debug, Default)]
struct SourceCounters {
    calls: u64,
    cache_hits: u64,
    successes: u64,
    errors: HashMap<FailureKind, u64>,
    latencies_ms: Vec<u64>,
}

/// Process-wide metrics collector, shared by `Arc`
pub struct Metrics {
    /// Total assessment count
    total_assessments: AtomicU64,
    /// Assessments that ended degraded
    degraded_assessments: AtomicU64,
    /// Assessments where every source failed
    failed_assessments: AtomicU64,
    sources: RwLock<HashMap<String, SourceCounters>>,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_assessments: AtomicU64::new(0),
            degraded_assessments: AtomicU64::new(0),
            failed_assessments: AtomicU64::new(0),
            sources: RwLock::new(HashMap::new()),
        }
    }

    // a panicked writer leaves plain counters behind, so poisoning is ignored
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SourceCounters>> {
        self.sources.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SourceCounters>> {
        self.sources.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Increment total assessment count
    pub fn inc_assessment(&self) {
        self.total_assessments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_degraded(&self) {
        self.degraded_assessments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.failed_assessments.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an outgoing call attempt
    pub fn record_call(&self, source: &str) {
        self.write().entry(source.to_string()).or_default().calls += 1;
    }

    pub fn record_cache_hit(&self, source: &str) {
        self.write().entry(source.to_string()).or_default().cache_hits += 1;
    }

    /// Record a successful fetch and its latency
    pub fn record_success(&self, source: &str, time_ms: u64) {
        let mut sources = self.write();
        let counters = sources.entry(source.to_string()).or_default();
        counters.successes += 1;

        if counters.latencies_ms.len() >= LATENCY_WINDOW {
            counters.latencies_ms.remove(0);
        }
        counters.latencies_ms.push(time_ms);
    }

    /// Record a failed fetch
    pub fn record_error(&self, source: &str, kind: FailureKind) {
        let mut sources = self.write();
        let counters = sources.entry(source.to_string()).or_default();
        *counters.errors.entry(kind).or_insert(0) += 1;
    }

    pub fn get_total_assessments(&self) -> u64 {
        self.total_assessments.load(Ordering::Relaxed)
    }

    /// Get average latency of a source
    pub fn get_avg_response_time(&self, source: &str) -> Option<u64> {
        self.read().get(source).and_then(|c| {
            if c.latencies_ms.is_empty() {
                None
            } else {
                Some(c.latencies_ms.iter().sum::<u64>() / c.latencies_ms.len() as u64)
            }
        })
    }

    /// Get reliability percentage for a source
    pub fn get_reliability(&self, source: &str) -> f64 {
        self.read().get(source).map_or(100.0, reliability)
    }

    /// Snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let sources = self
            .read()
            .iter()
            .map(|(name, c)| {
                let errors = c
                    .errors
                    .iter()
                    .map(|(kind, n)| (kind_name(*kind).to_string(), *n))
                    .collect();
                let stats = SourceStats {
                    calls: c.calls,
                    cache_hits: c.cache_hits,
                    successes: c.successes,
                    errors,
                    avg_response_time_ms: if c.latencies_ms.is_empty() {
                        None
                    } else {
                        Some(c.latencies_ms.iter().sum::<u64>() / c.latencies_ms.len() as u64)
                    },
                    reliability: reliability(c),
                };
                (name.clone(), stats)
            })
            .collect();

        MetricsSnapshot {
            total_assessments: self.total_assessments.load(Ordering::Relaxed),
            degraded_assessments: self.degraded_assessments.load(Ordering::Relaxed),
            failed_assessments: self.failed_assessments.load(Ordering::Relaxed),
            sources,
        }
    }
}

fn reliability(counters: &SourceCounters) -> f64 {
    let errors: u64 = counters.errors.values().sum();
    let total = errors + counters.successes;
    if total == 0 {
        100.0
    } else {
        (counters.successes as f64 / total as f64) * 100.0
    }
}

fn kind_name(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::RateExceeded => "rate_exceeded",
        FailureKind::Timeout => "timeout",
        FailureKind::NotFound => "not_found",
        FailureKind::Unavailable => "unavailable",
        FailureKind::ParseError => "parse_error",
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for a single source
#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    pub calls: u64,
    pub cache_hits: u64,
    pub successes: u64,
    pub errors: BTreeMap<String, u64>,
    pub avg_response_time_ms: Option<u64>,
    pub reliability: f64,
}

/// Serializable view of all metrics, served at `/stats`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_assessments: u64,
    pub degraded_assessments: u64,
    pub failed_assessments: u64,
    pub sources: BTreeMap<String, SourceStats>,
}
