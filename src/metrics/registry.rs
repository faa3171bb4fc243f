//! Metrics registry for flush coordination.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::Histogram;

/// Central registry for observability metrics.
#[derive(Default)]
pub struct MetricsRegistry {
    /// Flush pipeline metrics
    pub flush: Arc<FlushMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            flush: Arc::new(FlushMetrics::default()),
        }
    }

    /// Formats all metrics in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        self.flush.format_prometheus()
    }
}

/// Metrics for the flush pipeline (memstore to durable segments).
#[derive(Default)]
pub struct FlushMetrics {
    /// Completed flushes that wrote at least one segment
    pub flush_total: AtomicU64,
    /// Flush requests skipped because the memstore was already empty
    pub flush_skipped_total: AtomicU64,
    /// Flushes that failed (persist error, stale target, ...)
    pub flush_failed_total: AtomicU64,
    /// Segments written by completed flushes
    pub flush_segments_total: AtomicU64,
    /// Memstore bytes moved to durable segments
    pub flush_bytes_total: AtomicU64,
    /// Histogram of per-region flush durations in microseconds
    pub flush_duration_us: Histogram,
}

impl FlushMetrics {
    #[inline]
    pub fn record_flush(&self, segments: u64, bytes: u64, duration_us: u64) {
        self.flush_total.fetch_add(1, Ordering::Relaxed);
        self.flush_segments_total
            .fetch_add(segments, Ordering::Relaxed);
        self.flush_bytes_total.fetch_add(bytes, Ordering::Relaxed);
        self.flush_duration_us.observe(duration_us);
    }

    #[inline]
    pub fn record_skipped(&self) {
        self.flush_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.flush_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Formats flush metrics in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        let counters = [
            (
                "rangekv_flush_total",
                "Completed flushes that wrote at least one segment",
                self.flush_total.load(Ordering::Relaxed),
            ),
            (
                "rangekv_flush_skipped_total",
                "Flush requests skipped on an empty memstore",
                self.flush_skipped_total.load(Ordering::Relaxed),
            ),
            (
                "rangekv_flush_failed_total",
                "Failed flush attempts",
                self.flush_failed_total.load(Ordering::Relaxed),
            ),
            (
                "rangekv_flush_segments_total",
                "Segments written by flushes",
                self.flush_segments_total.load(Ordering::Relaxed),
            ),
            (
                "rangekv_flush_bytes_total",
                "Memstore bytes moved to durable segments",
                self.flush_bytes_total.load(Ordering::Relaxed),
            ),
        ];

        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {} {}", name, help);
            let _ = writeln!(output, "# TYPE {} counter", name);
            let _ = writeln!(output, "{} {}", name, value);
        }

        output.push_str(
            &self
                .flush_duration_us
                .format_prometheus("rangekv_flush_duration_us", "Per-region flush duration"),
        );

        output
    }
}
