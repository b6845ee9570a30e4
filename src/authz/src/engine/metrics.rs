//! Prometheus metrics for authorization decisions

use super::decision::{AccessDecision, DecisionReason};
use crate::cache::CacheStats;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Engine metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Total number of authorization checks
    pub total_requests: u64,

    pub allowed_decisions: u64,

    pub denied_decisions: u64,

    /// Decisions broken down by reason
    pub by_reason: BTreeMap<DecisionReason, u64>,

    /// Latency percentiles
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,

    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }

    pub fn count(&self, reason: DecisionReason) -> u64 {
        self.by_reason.get(&reason).copied().unwrap_or(0)
    }

    pub fn unknown_endpoints(&self) -> u64 {
        self.count(DecisionReason::UnknownEndpoint)
    }

    pub fn store_failures(&self) -> u64 {
        self.count(DecisionReason::StoreUnavailable)
    }
}

/// Metrics collector with Prometheus-compatible export
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Recent latency samples (ms) for percentile calculation
    latency_samples: Arc<RwLock<Vec<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_max_samples(10_000)
    }

    /// Collector keeping at most `max_samples` latency samples
    pub fn with_max_samples(max_samples: usize) -> Self {
        let max_samples = max_samples.max(10);

        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(max_samples))),
            max_samples,
        }
    }

    /// Record one decision and its latency
    pub async fn record(&self, decision: &AccessDecision, latency: Duration) {
        {
            let mut metrics = self.metrics.write().await;
            metrics.total_requests += 1;

            if decision.allowed {
                metrics.allowed_decisions += 1;
            } else {
                metrics.denied_decisions += 1;
            }

            *metrics.by_reason.entry(decision.reason).or_insert(0) += 1;
        }

        self.record_latency(latency).await;
    }

    /// Record request latency
    ///
    /// Only appends to the sample window; percentiles are computed when a
    /// snapshot is taken.
    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);

        // Drop the oldest tenth once full
        if samples.len() > self.max_samples {
            let excess = self.max_samples / 10;
            samples.drain(0..excess);
        }
    }

    /// Current metrics snapshot, latency summary included
    pub async fn get_metrics(&self) -> EngineMetrics {
        let mut metrics = self.metrics.read().await.clone();

        let mut sorted = self.latency_samples.read().await.clone();
        if !sorted.is_empty() {
            sorted.sort_by(f64::total_cmp);

            metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
            metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
            metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
            metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
        }

        metrics
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = EngineMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Export metrics in Prometheus text format
    pub async fn export_prometheus(&self, cache: Option<&CacheStats>) -> String {
        let metrics = self.get_metrics().await;
        let mut out = String::new();

        let _ = writeln!(out, "# HELP authz_requests_total Total number of authorization checks");
        let _ = writeln!(out, "# TYPE authz_requests_total counter");
        let _ = writeln!(out, "authz_requests_total {}", metrics.total_requests);
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP authz_decisions_total Decisions by outcome and reason");
        let _ = writeln!(out, "# TYPE authz_decisions_total counter");
        for reason in DecisionReason::ALL {
            let _ = writeln!(
                out,
                "authz_decisions_total{{decision=\"{}\",reason=\"{}\"}} {}",
                reason.decision(),
                reason,
                metrics.count(reason)
            );
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "# HELP authz_latency_seconds Check latency percentiles");
        let _ = writeln!(out, "# TYPE authz_latency_seconds summary");
        for (quantile, value) in [
            ("0.5", metrics.latency_p50_ms),
            ("0.9", metrics.latency_p90_ms),
            ("0.99", metrics.latency_p99_ms),
        ] {
            let _ = writeln!(
                out,
                "authz_latency_seconds{{quantile=\"{}\"}} {}",
                quantile,
                value / 1000.0
            );
        }

        if let Some(cache) = cache {
            let _ = writeln!(out);
            let _ = writeln!(out, "# HELP authz_cache_operations_total Permission cache operations");
            let _ = writeln!(out, "# TYPE authz_cache_operations_total counter");
            for (op, value) in [
                ("hit", cache.hits),
                ("miss", cache.misses),
                ("error", cache.errors),
                ("put", cache.puts),
                ("invalidation", cache.invalidations),
            ] {
                let _ = writeln!(out, "authz_cache_operations_total{{op=\"{}\"}} {}", op, value);
            }
        }

        out
    }

    /// Calculate percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        let idx = idx.min(sorted.len() - 1);
        sorted[idx]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
