use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};

use floorgate_types::GateStatus;

const LATENCY_BUCKET_COUNT: usize = 12;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.update_max(ms);

        if let Some((idx, _)) = LATENCY_BUCKETS_MS
            .iter()
            .enumerate()
            .find(|(_, bucket)| ms <= **bucket)
        {
            self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        } else {
            self.overflow.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        let counts = self
            .buckets
            .iter()
            .map(|bucket| bucket.load(Ordering::Relaxed))
            .collect::<Vec<_>>();

        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts,
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }

    fn update_max(&self, value: u64) {
        let mut current = self.max_ms.load(Ordering::Relaxed);
        while value > current {
            match self.max_ms.compare_exchange_weak(
                current,
                value,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(next) => current = next,
            }
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HttpMetricsSnapshot {
    pub trip: LatencySnapshot,
    pub status: LatencySnapshot,
    pub stress: LatencySnapshot,
    pub gate: LatencySnapshot,
    pub reject_origin: u64,
    pub reject_rate_limit: u64,
    pub reject_body_limit: u64,
}

#[derive(Default)]
pub struct HttpMetrics {
    trip: LatencyMetrics,
    status: LatencyMetrics,
    stress: LatencyMetrics,
    gate: LatencyMetrics,
    reject_origin: AtomicU64,
    reject_rate_limit: AtomicU64,
    reject_body_limit: AtomicU64,
}

impl HttpMetrics {
    pub fn record_trip(&self, duration: Duration) {
        self.trip.record(duration);
    }

    pub fn record_status(&self, duration: Duration) {
        self.status.record(duration);
    }

    pub fn record_stress(&self, duration: Duration) {
        self.stress.record(duration);
    }

    pub fn record_gate(&self, duration: Duration) {
        self.gate.record(duration);
    }

    pub fn inc_reject_origin(&self) {
        self.reject_origin.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_rate_limit(&self) {
        self.reject_rate_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_body_limit(&self) {
        self.reject_body_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            trip: self.trip.snapshot(),
            status: self.status.snapshot(),
            stress: self.stress.snapshot(),
            gate: self.gate.snapshot(),
            reject_origin: self.reject_origin.load(Ordering::Relaxed),
            reject_rate_limit: self.reject_rate_limit.load(Ordering::Relaxed),
            reject_body_limit: self.reject_body_limit.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct GateMetricsSnapshot {
    pub approved: u64,
    pub rejected: u64,
    pub model_errors: u64,
    pub seal_errors: u64,
    /// Generated outputs that reached validation.
    pub cycles: u64,
    pub latency: LatencySnapshot,
}

/// Outcome counters for the gate. `latency` covers generation plus validation
/// as reported in each response.
#[derive(Default)]
pub struct GateMetrics {
    approved: AtomicU64,
    rejected: AtomicU64,
    model_errors: AtomicU64,
    seal_errors: AtomicU64,
    latency: LatencyMetrics,
}

impl GateMetrics {
    pub fn record(&self, status: GateStatus, latency: Duration) {
        let counter = match status {
            GateStatus::Approved => &self.approved,
            GateStatus::Rejected => &self.rejected,
            GateStatus::ErrorModel => &self.model_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.latency.record(latency);
    }

    pub fn inc_seal_error(&self) {
        self.seal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, cycles: u64) -> GateMetricsSnapshot {
        GateMetricsSnapshot {
            approved: self.approved.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            model_errors: self.model_errors.load(Ordering::Relaxed),
            seal_errors: self.seal_errors.load(Ordering::Relaxed),
            cycles,
            latency: self.latency.snapshot(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct SystemMetricsSnapshot {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
    pub cpu_usage_percent: f64,
}

pub struct SystemMetrics {
    system: Mutex<System>,
    pid: Pid,
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMetrics {
    pub fn new() -> Self {
        let system = System::new();
        let pid = Pid::from_u32(std::process::id());
        Self {
            system: Mutex::new(system),
            pid,
        }
    }

    pub fn snapshot(&self) -> SystemMetricsSnapshot {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu_usage();
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), false);

        if let Some(process) = system.process(self.pid) {
            SystemMetricsSnapshot {
                rss_bytes: process.memory(),
                virtual_bytes: process.virtual_memory(),
                cpu_usage_percent: process.cpu_usage() as f64,
            }
        } else {
            SystemMetricsSnapshot {
                rss_bytes: 0,
                virtual_bytes: 0,
                cpu_usage_percent: 0.0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_buckets_and_overflow() {
        let metrics = LatencyMetrics::default();
        metrics.record(Duration::from_millis(1));
        metrics.record(Duration::from_millis(40));
        metrics.record(Duration::from_millis(9_000));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.counts[0], 1);
        assert_eq!(snapshot.counts[5], 1);
        assert_eq!(snapshot.overflow, 1);
        assert_eq!(snapshot.max_ms, 9_000);
        assert!((snapshot.avg_ms - 9_041.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn gate_outcomes_are_counted_separately() {
        let metrics = GateMetrics::default();
        metrics.record(GateStatus::Approved, Duration::from_millis(900));
        metrics.record(GateStatus::Rejected, Duration::from_millis(1_100));
        metrics.record(GateStatus::ErrorModel, Duration::from_millis(30));
        metrics.record(GateStatus::Approved, Duration::from_millis(800));

        let snapshot = metrics.snapshot(3);
        assert_eq!(snapshot.approved, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.model_errors, 1);
        assert_eq!(snapshot.cycles, 3);
        assert_eq!(snapshot.latency.count, 4);
    }
}
