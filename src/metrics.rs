// Pipeline metrics
//
// Lock-free counters for external tool usage and batch outcomes

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by every component that talks to `starter.exe`.
///
/// Uses atomic operations so the gateway can record from any worker thread.
/// A summary is logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Number of tool processes started
    pub tool_invocations: AtomicU64,

    /// Invocations that could not launch, exited non-zero or produced no output
    pub tool_failures: AtomicU64,

    /// Invocations killed by the timeout ceiling
    pub tool_timeouts: AtomicU64,

    /// Wall time spent inside the tool, in milliseconds
    pub total_tool_time_ms: AtomicU64,

    /// Archives or files processed successfully
    pub items_succeeded: AtomicUsize,

    /// Archives or files that failed
    pub items_failed: AtomicUsize,

    /// Items not attempted because of cancellation
    pub items_skipped: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tool_invocations: AtomicU64::new(0),
            tool_failures: AtomicU64::new(0),
            tool_timeouts: AtomicU64::new(0),
            total_tool_time_ms: AtomicU64::new(0),
            items_succeeded: AtomicUsize::new(0),
            items_failed: AtomicUsize::new(0),
            items_skipped: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_tool_invocation(&self) {
        self.tool_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_failure(&self) {
        self.tool_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_timeout(&self) {
        self.tool_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_time(&self, duration: Duration) {
        self.total_tool_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_item_succeeded(&self) {
        self.items_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_item_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_item_skipped(&self) {
        self.items_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time per tool invocation in milliseconds
    pub fn avg_tool_time_ms(&self) -> f64 {
        let total = self.total_tool_time_ms.load(Ordering::Relaxed);
        let count = self.tool_invocations.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Pipeline Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tool: {} invocations, {} failures, {} timeouts",
            self.tool_invocations.load(Ordering::Relaxed),
            self.tool_failures.load(Ordering::Relaxed),
            self.tool_timeouts.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total tool time: {:.2}s (avg: {:.2}ms per invocation)",
            self.total_tool_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_tool_time_ms()
        );
        tracing::info!(
            "Items: {} succeeded, {} failed, {} skipped",
            self.items_succeeded.load(Ordering::Relaxed),
            self.items_failed.load(Ordering::Relaxed),
            self.items_skipped.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
