//! Connection operation metrics.
//!
//! This module tracks counts and latencies of the transport calls the
//! connection core issues on its own: keep-alive probes, subscription
//! descriptor writes and discovery calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Metrics for a single operation type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    /// Total number of operations.
    pub count: u64,
    /// Number of successful operations.
    pub success_count: u64,
    /// Number of failed operations.
    pub failure_count: u64,
    /// Total duration of all operations.
    pub total_duration_ms: u64,
    /// Minimum operation duration.
    pub min_duration_ms: Option<u64>,
    /// Maximum operation duration.
    pub max_duration_ms: Option<u64>,
    /// Average operation duration.
    pub avg_duration_ms: Option<f64>,
}

/// Thread-safe atomic operation metrics tracker.
#[derive(Debug)]
pub struct AtomicOperationMetrics {
    count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_duration_ms: AtomicU64,
    min_duration_ms: AtomicU64,
    max_duration_ms: AtomicU64,
}

impl Default for AtomicOperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicOperationMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            min_duration_ms: AtomicU64::new(u64::MAX),
            max_duration_ms: AtomicU64::new(0),
        }
    }

    /// Record the outcome of one operation.
    pub fn record(&self, success: bool, duration: Duration) {
        if success {
            self.record_success(duration);
        } else {
            self.record_failure(duration);
        }
    }

    /// Record a successful operation.
    pub fn record_success(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.update_min_max(ms);
    }

    /// Record a failed operation.
    pub fn record_failure(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.update_min_max(ms);
    }

    fn update_min_max(&self, ms: u64) {
        self.min_duration_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_duration_ms.fetch_max(ms, Ordering::Relaxed);
    }

    /// Get a snapshot of the current metrics.
    pub fn snapshot(&self) -> OperationMetrics {
        let count = self.count.load(Ordering::Relaxed);
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let min = self.min_duration_ms.load(Ordering::Relaxed);
        let max = self.max_duration_ms.load(Ordering::Relaxed);

        OperationMetrics {
            count,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            total_duration_ms,
            min_duration_ms: (min != u64::MAX).then_some(min),
            max_duration_ms: (count > 0).then_some(max),
            avg_duration_ms: (count > 0).then(|| total_duration_ms as f64 / count as f64),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.total_duration_ms.store(0, Ordering::Relaxed);
        self.min_duration_ms.store(u64::MAX, Ordering::Relaxed);
        self.max_duration_ms.store(0, Ordering::Relaxed);
    }
}

/// Metrics for one peripheral connection.
#[derive(Debug, Default)]
pub struct LinkMetrics {
    /// Keep-alive probe ticks.
    pub probes: AtomicOperationMetrics,
    /// Subscription descriptor writes (enable, disable and teardown).
    pub descriptor_writes: AtomicOperationMetrics,
    /// Service and characteristic discovery calls.
    pub discoveries: AtomicOperationMetrics,
}

impl LinkMetrics {
    /// Create new empty link metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a summary of all metrics.
    pub fn summary(&self) -> LinkMetricsSummary {
        LinkMetricsSummary {
            probes: self.probes.snapshot(),
            descriptor_writes: self.descriptor_writes.snapshot(),
            discoveries: self.discoveries.snapshot(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.probes.reset();
        self.descriptor_writes.reset();
        self.discoveries.reset();
    }
}

/// Serializable summary of link metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkMetricsSummary {
    /// Keep-alive probe metrics.
    pub probes: OperationMetrics,
    /// Descriptor write metrics.
    pub descriptor_writes: OperationMetrics,
    /// Discovery call metrics.
    pub discoveries: OperationMetrics,
}
