//! Per-run pipeline metrics
//!
//! Every `resolve` call builds one [`PipelineMetrics`] value and hands it to
//! the configured [`MetricsSink`] when the run finishes. Nothing here is
//! global; sinks decide what to keep.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use beneficiary_core::{ExecutionTrace, ResultType};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::provider_chain::ProviderAttempt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub brand: String,
    pub result_type: ResultType,
    pub confidence_score: u8,
    pub cache_hit: bool,
    /// Stage name -> duration in milliseconds
    pub stage_durations_ms: BTreeMap<String, u64>,
    pub error_stages: usize,
    /// Provider calls including retries
    pub provider_calls: u32,
    pub providers_tried: Vec<String>,
    pub total_duration_ms: u64,
}

impl PipelineMetrics {
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            result_type: ResultType::Error,
            confidence_score: 0,
            cache_hit: false,
            stage_durations_ms: BTreeMap::new(),
            error_stages: 0,
            provider_calls: 0,
            providers_tried: Vec::new(),
            total_duration_ms: 0,
        }
    }

    pub fn record_attempts(&mut self, attempts: &[ProviderAttempt]) {
        for attempt in attempts {
            self.provider_calls += attempt.calls;
            self.providers_tried.push(attempt.provider.clone());
        }
    }

    /// Fill the stage timings from a finished trace
    pub fn record_trace(&mut self, trace: &ExecutionTrace) {
        for stage in trace.stages() {
            *self.stage_durations_ms.entry(stage.name.clone()).or_insert(0) += stage.duration_ms;
        }
        self.error_stages = trace.error_count();
    }
}

pub trait MetricsSink: Send + Sync {
    fn record(&self, metrics: &PipelineMetrics);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _metrics: &PipelineMetrics) {}
}

/// Emits one structured log line per run and keeps running counters
#[derive(Debug, Default)]
pub struct TracingMetricsSink {
    runs: AtomicU64,
    cache_hits: AtomicU64,
    errors: AtomicU64,
}

impl TracingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl MetricsSink for TracingMetricsSink {
    fn record(&self, metrics: &PipelineMetrics) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if metrics.cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        if metrics.result_type == ResultType::Error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }

        info!(
            brand = %metrics.brand,
            result_type = %metrics.result_type,
            confidence = metrics.confidence_score,
            cache_hit = metrics.cache_hit,
            provider_calls = metrics.provider_calls,
            error_stages = metrics.error_stages,
            duration_ms = metrics.total_duration_ms,
            "Resolution finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider_chain::AttemptOutcome;
    use beneficiary_core::StageStatus;

    #[test]
    fn test_metrics_collect_trace_and_attempts() {
        let mut trace = ExecutionTrace::new();
        trace.push(trace.start_stage("cache").finish(StageStatus::Partial));
        trace.push(trace.start_stage("providers").finish(StageStatus::Error));

        let attempt = |name: &str, calls| ProviderAttempt {
            provider: name.to_string(),
            outcome: AttemptOutcome::Exhausted,
            calls,
            elapsed_ms: 0,
            beneficiary: None,
            reason: None,
        };

        let mut metrics = PipelineMetrics::new("Zorblex");
        metrics.record_trace(&trace);
        metrics.record_attempts(&[attempt("reasoning", 3), attempt("web_search", 1)]);

        assert_eq!(metrics.stage_durations_ms.len(), 2);
        assert_eq!(metrics.error_stages, 1);
        assert_eq!(metrics.provider_calls, 4);
        assert_eq!(metrics.providers_tried, vec!["reasoning", "web_search"]);
    }

    #[test]
    fn test_tracing_sink_counts() {
        let sink = TracingMetricsSink::new();
        let mut metrics = PipelineMetrics::new("Acme");
        sink.record(&metrics);
        metrics.result_type = ResultType::Cache;
        metrics.cache_hit = true;
        sink.record(&metrics);

        assert_eq!(sink.runs(), 2);
        assert_eq!(sink.cache_hits(), 1);
        assert_eq!(sink.errors(), 1);
    }
}
