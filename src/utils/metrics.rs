use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Samples kept per timing series; older ones are dropped
const MAX_SAMPLES: usize = 1024;

/// Metrics collector for the translator.
///
/// Page loads running in the background and HTTP handlers share one
/// instance; clones point at the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    api: OutcomeCounter,
    api_latency: Timings,

    cache_hits: AtomicUsize,
    cache_partial_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_records: AtomicUsize,

    detection: Timings,
    translation: Timings,

    pages: OutcomeCounter,
    endpoints: DashMap<String, AtomicUsize>,
    circuit_breaker_trips: AtomicUsize,
    start_time: Instant,
}

#[derive(Default)]
struct OutcomeCounter {
    ok: AtomicUsize,
    failed: AtomicUsize,
}

impl OutcomeCounter {
    fn record(&self, ok: bool) {
        let counter = if ok { &self.ok } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> (usize, usize) {
        (self.ok.load(Ordering::Relaxed), self.failed.load(Ordering::Relaxed))
    }
}

/// Bounded window of millisecond samples
#[derive(Default)]
struct Timings {
    samples: Mutex<VecDeque<u64>>,
}

impl Timings {
    fn push(&self, duration: Duration) {
        let mut samples = self.samples.lock();
        if samples.len() == MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(duration.as_millis() as u64);
    }

    fn sorted(&self) -> Vec<u64> {
        let mut values: Vec<u64> = self.samples.lock().iter().copied().collect();
        values.sort_unstable();
        values
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                api: OutcomeCounter::default(),
                api_latency: Timings::default(),
                cache_hits: AtomicUsize::new(0),
                cache_partial_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                cache_records: AtomicUsize::new(0),
                detection: Timings::default(),
                translation: Timings::default(),
                pages: OutcomeCounter::default(),
                endpoints: DashMap::new(),
                circuit_breaker_trips: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_api_call(&self, success: bool, duration: Duration) {
        self.inner.api.record(success);
        self.inner.api_latency.push(duration);
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Detected text reused, translation redone
    pub fn record_cache_partial_hit(&self) {
        self.inner.cache_partial_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_cache_records(&self, records: usize) {
        self.inner.cache_records.store(records, Ordering::Relaxed);
    }

    pub fn record_detection_duration(&self, duration: Duration) {
        self.inner.detection.push(duration);
    }

    pub fn record_translation_duration(&self, duration: Duration) {
        self.inner.translation.push(duration);
    }

    pub fn record_page_loaded(&self, ok: bool) {
        self.inner.pages.record(ok);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.inner.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        let latency = inner.api_latency.sorted();
        let (api_ok, api_failed) = inner.api.get();
        let (pages_loaded, pages_failed) = inner.pages.get();

        let cache_hits = inner.cache_hits.load(Ordering::Relaxed);
        let cache_partial_hits = inner.cache_partial_hits.load(Ordering::Relaxed);
        let cache_misses = inner.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_partial_hits + cache_misses;

        let mut endpoint_requests: Vec<(String, usize)> = inner
            .endpoints
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        endpoint_requests.sort();

        MetricsSnapshot {
            api_calls_total: api_ok + api_failed,
            api_calls_success: api_ok,
            api_calls_failed: api_failed,
            api_latency_avg_ms: mean(&latency),
            api_latency_p50_ms: percentile(&latency, 0.5),
            api_latency_p95_ms: percentile(&latency, 0.95),
            cache_hits,
            cache_partial_hits,
            cache_misses,
            cache_hit_rate: if lookups == 0 {
                0.0
            } else {
                cache_hits as f64 / lookups as f64
            },
            cache_records: inner.cache_records.load(Ordering::Relaxed),
            detection_avg_ms: mean(&inner.detection.sorted()),
            translation_avg_ms: mean(&inner.translation.sorted()),
            pages_loaded,
            pages_failed,
            circuit_breaker_trips: inner.circuit_breaker_trips.load(Ordering::Relaxed),
            endpoint_requests,
            uptime_seconds: inner.start_time.elapsed().as_secs(),
        }
    }

    /// Prometheus text exposition of the current snapshot
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();

        family(&mut out, "api_calls_total", "counter", "Remote API calls by outcome", &[
            ("outcome=\"success\"", s.api_calls_success as f64),
            ("outcome=\"failed\"", s.api_calls_failed as f64),
        ]);
        family(&mut out, "api_latency_ms", "gauge", "Remote API latency in milliseconds", &[
            ("quantile=\"avg\"", s.api_latency_avg_ms as f64),
            ("quantile=\"0.5\"", s.api_latency_p50_ms as f64),
            ("quantile=\"0.95\"", s.api_latency_p95_ms as f64),
        ]);
        family(&mut out, "cache_lookups_total", "counter", "Cache lookups by outcome", &[
            ("outcome=\"hit\"", s.cache_hits as f64),
            ("outcome=\"translation_only\"", s.cache_partial_hits as f64),
            ("outcome=\"miss\"", s.cache_misses as f64),
        ]);
        family(&mut out, "cache_records", "gauge", "Records in the result cache", &[
            ("", s.cache_records as f64),
        ]);
        family(&mut out, "stage_avg_duration_ms", "gauge", "Average stage duration in milliseconds", &[
            ("stage=\"detection\"", s.detection_avg_ms as f64),
            ("stage=\"translation\"", s.translation_avg_ms as f64),
        ]);
        family(&mut out, "pages_total", "counter", "Finished page loads by outcome", &[
            ("outcome=\"ok\"", s.pages_loaded as f64),
            ("outcome=\"error\"", s.pages_failed as f64),
        ]);
        family(&mut out, "circuit_breaker_trips_total", "counter", "Circuit breaker trips", &[
            ("", s.circuit_breaker_trips as f64),
        ]);

        let endpoint_labels: Vec<(String, f64)> = s
            .endpoint_requests
            .iter()
            .map(|(endpoint, count)| (format!("endpoint=\"{}\"", endpoint), *count as f64))
            .collect();
        let endpoint_samples: Vec<(&str, f64)> = endpoint_labels
            .iter()
            .map(|(labels, count)| (labels.as_str(), *count))
            .collect();
        family(&mut out, "http_requests_total", "counter", "Renderer requests by endpoint", &endpoint_samples);

        family(&mut out, "uptime_seconds", "counter", "Process uptime in seconds", &[
            ("", s.uptime_seconds as f64),
        ]);
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub api_calls_total: usize,
    pub api_calls_success: usize,
    pub api_calls_failed: usize,
    pub api_latency_avg_ms: u64,
    pub api_latency_p50_ms: u64,
    pub api_latency_p95_ms: u64,
    pub cache_hits: usize,
    pub cache_partial_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub cache_records: usize,
    pub detection_avg_ms: u64,
    pub translation_avg_ms: u64,
    pub pages_loaded: usize,
    pub pages_failed: usize,
    pub circuit_breaker_trips: usize,
    /// Sorted by endpoint
    pub endpoint_requests: Vec<(String, usize)>,
    pub uptime_seconds: u64,
}

/// Append one metric family; an empty label set renders as a bare sample
fn family(out: &mut String, name: &str, kind: &str, help: &str, samples: &[(&str, f64)]) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
    for (labels, value) in samples {
        if labels.is_empty() {
            let _ = writeln!(out, "{} {}", name, value);
        } else {
            let _ = writeln!(out, "{}{{{}}} {}", name, labels, value);
        }
    }
    out.push('\n');
}

// Both helpers expect sorted input
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn mean(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_api_call(true, Duration::from_millis(100));
        metrics.record_api_call(false, Duration::from_millis(50));
        metrics.record_cache_hit();
        metrics.record_cache_partial_hit();
        metrics.record_cache_miss();
        metrics.record_cache_miss();
        metrics.record_page_loaded(true);
        metrics.record_page_loaded(false);
        metrics.record_endpoint_request("/pages");
        metrics.record_endpoint_request("/pages");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.api_calls_total, 2);
        assert_eq!(snapshot.api_calls_success, 1);
        assert_eq!(snapshot.api_calls_failed, 1);
        assert_eq!(snapshot.api_latency_avg_ms, 75);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_partial_hits, 1);
        assert_eq!(snapshot.cache_misses, 2);
        assert_eq!(snapshot.cache_hit_rate, 0.25);
        assert_eq!(snapshot.pages_loaded, 1);
        assert_eq!(snapshot.pages_failed, 1);
        assert_eq!(snapshot.endpoint_requests, vec![("/pages".to_string(), 2)]);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_api_call(true, Duration::from_millis(100));
        metrics.record_cache_partial_hit();
        metrics.update_cache_records(7);

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("# TYPE api_calls_total counter"));
        assert!(prometheus.contains("api_calls_total{outcome=\"success\"} 1"));
        assert!(prometheus.contains("cache_lookups_total{outcome=\"translation_only\"} 1"));
        assert!(prometheus.contains("\ncache_records 7\n"));
    }

    #[test]
    fn test_timings_are_bounded() {
        let timings = Timings::default();
        for ms in 0..(MAX_SAMPLES as u64 + 10) {
            timings.push(Duration::from_millis(ms));
        }
        let sorted = timings.sorted();
        assert_eq!(sorted.len(), MAX_SAMPLES);
        assert_eq!(sorted[0], 10);
    }

    #[test]
    fn test_percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 0.5), 0);
        assert_eq!(percentile(&[1, 3, 5], 0.5), 3);
    }
}
