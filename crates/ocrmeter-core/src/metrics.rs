use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TestMetrics — raw observations for one test scenario
// ---------------------------------------------------------------------------

/// Raw measurements captured for a single test scenario execution.
///
/// A record is built once, at the end of a scenario, and never mutated
/// afterwards. The same `test_name` may appear on several records within a
/// session (repeated runs of the same scenario).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TestMetrics {
    pub test_name: String,
    pub timestamp: DateTime<Utc>,
    /// One entry per HTTP request that received a response, in seconds.
    /// Requests that errored before any response was obtained are not listed
    /// here; they only show up in `error_count`.
    pub response_times: Vec<f64>,
    pub success_count: u64,
    pub error_count: u64,
    /// Always `success_count + error_count`.
    pub total_requests: u64,
    /// Wall-clock span of the whole scenario, in seconds.
    pub duration: f64,
    /// Human-readable error descriptions. Not necessarily one per failed
    /// request — setup failures produce entries with no matching count.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Free-form scenario context (image size, concurrency level, mode).
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Per-task submission times, sampled once per completed task. Length is
    /// independent of `response_times`.
    #[serde(default)]
    pub creation_times: Vec<f64>,
    /// Per-task OCR processing times, sampled once per completed task.
    #[serde(default)]
    pub processing_times: Vec<f64>,
    /// Per-task queue wait times, sampled once per completed task.
    #[serde(default)]
    pub queue_wait_times: Vec<f64>,
}

impl TestMetrics {
    /// Create a record from the mandatory observations, stamping the current
    /// UTC time. `total_requests` is derived from the two counts.
    pub fn new(
        test_name: impl Into<String>,
        response_times: Vec<f64>,
        success_count: u64,
        error_count: u64,
        duration: f64,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            timestamp: Utc::now(),
            response_times,
            success_count,
            error_count,
            total_requests: success_count + error_count,
            duration,
            errors: Vec::new(),
            metadata: serde_json::Value::Object(Default::default()),
            creation_times: Vec::new(),
            processing_times: Vec::new(),
            queue_wait_times: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach the optional per-task timing breakdown. The three sequences are
    /// sampled independently and need not be the same length as each other or
    /// as `response_times`.
    pub fn with_timing_breakdown(
        mut self,
        creation_times: Vec<f64>,
        processing_times: Vec<f64>,
        queue_wait_times: Vec<f64>,
    ) -> Self {
        self.creation_times = creation_times;
        self.processing_times = processing_times;
        self.queue_wait_times = queue_wait_times;
        self
    }

    /// Whether this record carries any timing breakdown data.
    pub fn has_timing_breakdown(&self) -> bool {
        !self.creation_times.is_empty()
            || !self.processing_times.is_empty()
            || !self.queue_wait_times.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PerformanceSummary — derived statistics
// ---------------------------------------------------------------------------

/// Statistics derived from a [`TestMetrics`] record. Recomputed on demand;
/// never stored independently of the record it was computed from (the history
/// store denormalizes it next to the serialized record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PerformanceSummary {
    pub avg_response_time: f64,
    pub median_response_time: f64,
    pub percentile_95_response_time: f64,
    pub percentile_99_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
    /// Percentage in `[0, 100]`.
    pub error_rate: f64,
    /// Wall-clock request rate: `total_requests / duration`.
    pub throughput: f64,
    pub total_requests: u64,
    pub total_duration: f64,
    #[serde(default)]
    pub avg_creation_time: f64,
    #[serde(default)]
    pub avg_processing_time: f64,
    #[serde(default)]
    pub avg_queue_wait_time: f64,
    /// Reciprocal of mean processing time — sustainable task completion rate
    /// independent of HTTP overhead. Distinct from `throughput`.
    #[serde(default)]
    pub real_throughput: f64,
}

/// Compute summary statistics for one record. Pure, no I/O.
///
/// An empty `response_times` is a defined degenerate case, not an error: all
/// time statistics are 0, `success_rate` is 0 and `error_rate` is forced to
/// 100.0 regardless of the request counts. This is intentionally a different
/// path from the `total_requests == 0` guards below, which yield 0 for both
/// rates.
pub fn summarize(metrics: &TestMetrics) -> PerformanceSummary {
    let response_times = &metrics.response_times;

    if response_times.is_empty() {
        return PerformanceSummary {
            avg_response_time: 0.0,
            median_response_time: 0.0,
            percentile_95_response_time: 0.0,
            percentile_99_response_time: 0.0,
            min_response_time: 0.0,
            max_response_time: 0.0,
            success_rate: 0.0,
            error_rate: 100.0,
            throughput: 0.0,
            total_requests: metrics.total_requests,
            total_duration: metrics.duration,
            avg_creation_time: 0.0,
            avg_processing_time: 0.0,
            avg_queue_wait_time: 0.0,
            real_throughput: 0.0,
        };
    }

    let mut sorted = response_times.clone();
    sorted.sort_by(f64::total_cmp);

    let success_rate = if metrics.total_requests > 0 {
        metrics.success_count as f64 / metrics.total_requests as f64 * 100.0
    } else {
        0.0
    };
    let error_rate = if metrics.total_requests > 0 {
        metrics.error_count as f64 / metrics.total_requests as f64 * 100.0
    } else {
        0.0
    };
    let throughput = if metrics.duration > 0.0 {
        metrics.total_requests as f64 / metrics.duration
    } else {
        0.0
    };

    let avg_creation_time = mean(&metrics.creation_times);
    let avg_processing_time = mean(&metrics.processing_times);
    let avg_queue_wait_time = mean(&metrics.queue_wait_times);

    let real_throughput = if avg_processing_time > 0.0 {
        1.0 / avg_processing_time
    } else {
        0.0
    };

    PerformanceSummary {
        avg_response_time: mean(response_times),
        median_response_time: median(&sorted),
        percentile_95_response_time: nearest_rank(&sorted, 0.95),
        percentile_99_response_time: nearest_rank(&sorted, 0.99),
        min_response_time: sorted[0],
        max_response_time: sorted[sorted.len() - 1],
        success_rate,
        error_rate,
        throughput,
        total_requests: metrics.total_requests,
        total_duration: metrics.duration,
        avg_creation_time,
        avg_processing_time,
        avg_queue_wait_time,
        real_throughput,
    }
}

/// Arithmetic mean; 0 for an empty slice.
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Standard median over an ascending-sorted slice: middle element for odd n,
/// average of the two middle elements for even n.
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
///
/// `p` is a fraction in `[0, 1]`. The index is `floor(p * n)` clamped to
/// `n - 1`. This exact formula is part of the reporting contract (stored
/// summaries must stay comparable across versions); do not replace it with an
/// interpolated variant.
fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (p * sorted.len() as f64) as usize;
    sorted[index.min(sorted.len() - 1)]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // TestMetrics construction
    // -----------------------------------------------------------------------

    #[test]
    fn new_derives_total_requests() {
        let m = TestMetrics::new("basic", vec![1.0, 2.0], 3, 2, 10.0);
        assert_eq!(m.total_requests, 5);
        assert_eq!(m.success_count, 3);
        assert_eq!(m.error_count, 2);
    }

    #[test]
    fn new_defaults_optional_fields_to_empty() {
        let m = TestMetrics::new("basic", vec![], 0, 0, 0.0);
        assert!(m.errors.is_empty());
        assert!(m.creation_times.is_empty());
        assert!(m.processing_times.is_empty());
        assert!(m.queue_wait_times.is_empty());
        assert!(m.metadata.is_object());
        assert!(!m.has_timing_breakdown());
    }

    #[test]
    fn with_timing_breakdown_allows_unequal_lengths() {
        // Breakdown sequences are sampled per task, not per request, so
        // lengths are independent of response_times and of each other.
        let m = TestMetrics::new("breakdown", vec![1.0, 2.0, 3.0], 3, 0, 6.0)
            .with_timing_breakdown(vec![0.1], vec![4.0, 5.0], vec![]);
        assert_eq!(m.creation_times.len(), 1);
        assert_eq!(m.processing_times.len(), 2);
        assert!(m.queue_wait_times.is_empty());
        assert!(m.has_timing_breakdown());
    }

    #[test]
    fn serde_round_trip_preserves_record() {
        let m = TestMetrics::new("roundtrip", vec![0.5, 1.5], 2, 0, 2.0)
            .with_errors(vec!["setup glitch".to_string()])
            .with_metadata(serde_json::json!({"image_size": "small", "concurrent": 4}));
        let json = serde_json::to_string(&m).expect("serialize should succeed");
        let back: TestMetrics = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(back.test_name, m.test_name);
        assert_eq!(back.response_times, m.response_times);
        assert_eq!(back.total_requests, m.total_requests);
        assert_eq!(back.errors, m.errors);
        assert_eq!(back.metadata, m.metadata);
    }

    #[test]
    fn deserialize_without_breakdown_fields_defaults_to_empty() {
        // Older stored rows predate the breakdown fields.
        let json = r#"{
            "test_name": "legacy",
            "timestamp": "2024-01-01T00:00:00Z",
            "response_times": [1.0],
            "success_count": 1,
            "error_count": 0,
            "total_requests": 1,
            "duration": 1.0
        }"#;
        let m: TestMetrics = serde_json::from_str(json).expect("legacy row should parse");
        assert!(m.creation_times.is_empty());
        assert!(m.processing_times.is_empty());
        assert!(m.queue_wait_times.is_empty());
    }

    // -----------------------------------------------------------------------
    // summarize — degenerate cases
    // -----------------------------------------------------------------------

    #[test]
    fn empty_response_times_forces_full_error_defaults() {
        // Even with nonzero counts, empty response_times takes the degenerate
        // path: all time stats 0, error_rate pinned at 100.
        let m = TestMetrics::new("empty", vec![], 5, 3, 12.0);
        let s = summarize(&m);
        assert_eq!(s.avg_response_time, 0.0);
        assert_eq!(s.median_response_time, 0.0);
        assert_eq!(s.percentile_95_response_time, 0.0);
        assert_eq!(s.percentile_99_response_time, 0.0);
        assert_eq!(s.min_response_time, 0.0);
        assert_eq!(s.max_response_time, 0.0);
        assert_eq!(s.success_rate, 0.0);
        assert_eq!(s.error_rate, 100.0);
        assert_eq!(s.throughput, 0.0);
        assert_eq!(s.total_requests, 8);
        assert_eq!(s.total_duration, 12.0);
        assert_eq!(s.real_throughput, 0.0);
    }

    #[test]
    fn zero_total_requests_with_times_yields_zero_rates() {
        // The other degenerate path: response times exist but both counts are
        // zero. Rates are 0/0 -> 0 here, not 100.
        let m = TestMetrics::new("no-counts", vec![1.0, 2.0], 0, 0, 4.0);
        let s = summarize(&m);
        assert_eq!(s.success_rate, 0.0);
        assert_eq!(s.error_rate, 0.0);
        assert!((s.avg_response_time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn zero_duration_yields_zero_throughput() {
        let m = TestMetrics::new("instant", vec![1.0], 1, 0, 0.0);
        let s = summarize(&m);
        assert_eq!(s.throughput, 0.0);
    }

    // -----------------------------------------------------------------------
    // summarize — basic statistics
    // -----------------------------------------------------------------------

    #[test]
    fn mean_median_min_max_are_exact() {
        let m = TestMetrics::new("stats", vec![3.0, 1.0, 2.0, 4.0], 4, 0, 10.0);
        let s = summarize(&m);
        assert!((s.avg_response_time - 2.5).abs() < 1e-9);
        assert!((s.median_response_time - 2.5).abs() < 1e-9);
        assert_eq!(s.min_response_time, 1.0);
        assert_eq!(s.max_response_time, 4.0);
    }

    #[test]
    fn median_odd_count_is_middle_element() {
        let m = TestMetrics::new("odd", vec![5.0, 1.0, 3.0], 3, 0, 9.0);
        let s = summarize(&m);
        assert_eq!(s.median_response_time, 3.0);
    }

    #[test]
    fn rates_are_complementary_when_total_positive() {
        let m = TestMetrics::new("rates", vec![1.0, 2.0, 3.0], 7, 3, 10.0);
        let s = summarize(&m);
        assert!((s.success_rate - 70.0).abs() < 1e-9);
        assert!((s.error_rate - 30.0).abs() < 1e-9);
        assert!((s.success_rate + s.error_rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn throughput_is_requests_over_duration() {
        let m = TestMetrics::new("tp", vec![1.0; 20], 18, 2, 10.0);
        let s = summarize(&m);
        assert!((s.throughput - 2.0).abs() < 1e-9);
    }

    // -----------------------------------------------------------------------
    // summarize — nearest-rank percentiles
    // -----------------------------------------------------------------------

    #[test]
    fn percentile_five_elements() {
        // n=5: p95 index = floor(0.95 * 5) = 4 -> value 5; p99 the same.
        let m = TestMetrics::new("p5", vec![1.0, 2.0, 3.0, 4.0, 5.0], 5, 0, 15.0);
        let s = summarize(&m);
        assert_eq!(s.percentile_95_response_time, 5.0);
        assert_eq!(s.percentile_99_response_time, 5.0);
    }

    #[test]
    fn percentile_four_elements() {
        // n=4: p95 index = floor(3.8) = 3 -> value 4.
        let m = TestMetrics::new("p4", vec![1.0, 2.0, 3.0, 4.0], 4, 0, 10.0);
        let s = summarize(&m);
        assert_eq!(s.percentile_95_response_time, 4.0);
    }

    #[test]
    fn percentile_is_insertion_order_independent() {
        let a = TestMetrics::new("fwd", vec![1.0, 2.0, 3.0, 4.0, 5.0], 5, 0, 15.0);
        let b = TestMetrics::new("rev", vec![5.0, 4.0, 3.0, 2.0, 1.0], 5, 0, 15.0);
        let sa = summarize(&a);
        let sb = summarize(&b);
        assert_eq!(sa.percentile_95_response_time, sb.percentile_95_response_time);
        assert_eq!(sa.median_response_time, sb.median_response_time);
    }

    #[test]
    fn percentile_single_element_returns_that_value() {
        let m = TestMetrics::new("one", vec![2.5], 1, 0, 2.5);
        let s = summarize(&m);
        assert_eq!(s.percentile_95_response_time, 2.5);
        assert_eq!(s.percentile_99_response_time, 2.5);
        assert_eq!(s.median_response_time, 2.5);
    }

    // -----------------------------------------------------------------------
    // summarize — timing breakdown
    // -----------------------------------------------------------------------

    #[test]
    fn breakdown_means_and_real_throughput() {
        let m = TestMetrics::new("real", vec![1.0, 2.0], 2, 0, 8.0)
            .with_timing_breakdown(vec![0.2, 0.4], vec![4.0, 6.0], vec![1.0, 3.0]);
        let s = summarize(&m);
        assert!((s.avg_creation_time - 0.3).abs() < 1e-9);
        assert!((s.avg_processing_time - 5.0).abs() < 1e-9);
        assert!((s.avg_queue_wait_time - 2.0).abs() < 1e-9);
        // Reciprocal of mean processing time, not the wall-clock rate.
        assert!((s.real_throughput - 0.2).abs() < 1e-9);
        assert!((s.throughput - 0.25).abs() < 1e-9);
    }

    #[test]
    fn missing_breakdown_yields_zero_breakdown_stats() {
        let m = TestMetrics::new("plain", vec![1.0], 1, 0, 1.0);
        let s = summarize(&m);
        assert_eq!(s.avg_creation_time, 0.0);
        assert_eq!(s.avg_processing_time, 0.0);
        assert_eq!(s.avg_queue_wait_time, 0.0);
        assert_eq!(s.real_throughput, 0.0);
    }
}
