//! Thread-safe histogram for flush duration tracking.
//!
//! Fixed buckets sized for flush latencies (dominated by the persist call),
//! cumulative counts as required by Prometheus `histogram_quantile()`.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed histogram buckets in microseconds, 100μs up to 5s.
pub const HISTOGRAM_BUCKETS: [u64; 12] = [
    100,       // 100μs
    250,       // 250μs
    500,       // 500μs
    1_000,     // 1ms
    2_500,     // 2.5ms
    5_000,     // 5ms
    10_000,    // 10ms
    50_000,    // 50ms
    100_000,   // 100ms
    500_000,   // 500ms
    1_000_000, // 1s
    5_000_000, // 5s
];

/// Lock-free histogram of microsecond durations.
pub struct Histogram {
    sum: AtomicU64,
    count: AtomicU64,
    /// Cumulative bucket counts; each bucket includes smaller values.
    buckets: [AtomicU64; 12],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    #[allow(clippy::declare_interior_mutable_const)]
    pub fn new() -> Self {
        const ZERO: AtomicU64 = AtomicU64::new(0);
        Self {
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            buckets: [ZERO; 12],
        }
    }

    /// Records an observation in microseconds.
    #[inline]
    pub fn observe(&self, value_us: u64) {
        self.sum.fetch_add(value_us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (i, &boundary) in HISTOGRAM_BUCKETS.iter().enumerate() {
            if value_us <= boundary {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Returns `(sum, count, cumulative bucket counts)`.
    pub fn snapshot(&self) -> (u64, u64, [u64; 12]) {
        let sum = self.sum.load(Ordering::Relaxed);
        let count = self.count.load(Ordering::Relaxed);
        let mut buckets = [0u64; 12];
        for (i, bucket) in self.buckets.iter().enumerate() {
            buckets[i] = bucket.load(Ordering::Relaxed);
        }
        (sum, count, buckets)
    }

    /// Formats the histogram in Prometheus exposition format under `name`.
    pub fn format_prometheus(&self, name: &str, help: &str) -> String {
        let (sum, count, buckets) = self.snapshot();
        let mut output = String::with_capacity(1024);

        let _ = writeln!(output, "# HELP {} {}", name, help);
        let _ = writeln!(output, "# TYPE {} histogram", name);
        for (i, &boundary) in HISTOGRAM_BUCKETS.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}_bucket{{le=\"{}\"}} {}",
                name, boundary, buckets[i]
            );
        }
        let _ = writeln!(output, "{}_bucket{{le=\"+Inf\"}} {}", name, count);
        let _ = writeln!(output, "{}_sum {}", name, sum);
        let _ = writeln!(output, "{}_count {}", name, count);

        output
    }
}
