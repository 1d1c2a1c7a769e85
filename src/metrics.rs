// Run metrics module
//
// Counts what a deployment run did so it can be summarised in the log

use crate::services::provisioning::ProvisionResult;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Deployment run metrics
///
/// Uses atomic operations so that per-device workers could record into the
/// same instance without locks. Provisioning is sequential today.
#[derive(Debug)]
pub struct RunMetrics {
    /// Devices that completed every stage
    pub devices_provisioned: AtomicUsize,

    /// Devices aborted by a clone, startup script, binary or I/O failure
    pub devices_failed: AtomicUsize,

    /// Template files generated or rewritten across all devices
    pub files_rewritten: AtomicUsize,

    /// Cleanup scripts invoked
    pub cleanups_run: AtomicUsize,

    /// Total provisioning time in milliseconds
    pub total_provision_time_ms: AtomicU64,

    /// Run start time
    start_time: Instant,
}

impl RunMetrics {
    /// Create a new RunMetrics instance
    pub fn new() -> Self {
        Self {
            devices_provisioned: AtomicUsize::new(0),
            devices_failed: AtomicUsize::new(0),
            files_rewritten: AtomicUsize::new(0),
            cleanups_run: AtomicUsize::new(0),
            total_provision_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record the outcome of one device
    pub fn record_result(&self, result: &ProvisionResult) {
        if result.success {
            self.devices_provisioned.fetch_add(1, Ordering::Relaxed);
        } else {
            self.devices_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.files_rewritten
            .fetch_add(result.report.files_rewritten(), Ordering::Relaxed);
        if result.report.cleanup_ran {
            self.cleanups_run.fetch_add(1, Ordering::Relaxed);
        }
        self.record_provision_time(result.duration);
    }

    /// Record provisioning time for a device
    pub fn record_provision_time(&self, duration: Duration) {
        self.total_provision_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Get total run time
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Whether any device failed
    pub fn has_failures(&self) -> bool {
        self.devices_failed.load(Ordering::Relaxed) > 0
    }

    /// Get average provisioning time per device in milliseconds
    pub fn avg_provision_time_ms(&self) -> f64 {
        let total = self.total_provision_time_ms.load(Ordering::Relaxed);
        let count = self.devices_provisioned.load(Ordering::Relaxed)
            + self.devices_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Deployment Summary ===");
        tracing::info!(
            "IOCs: {} provisioned, {} failed",
            self.devices_provisioned.load(Ordering::Relaxed),
            self.devices_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Files rewritten: {}, cleanup scripts run: {}",
            self.files_rewritten.load(Ordering::Relaxed),
            self.cleanups_run.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total time: {:.2}s (avg: {:.2}ms per IOC)",
            self.uptime().as_secs_f64(),
            self.avg_provision_time_ms()
        );
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provisioning::{ProvisionError, StageReport};

    fn provisioned(millis: u64) -> ProvisionResult {
        let report = StageReport {
            startup_template: Some("st_sim.cmd".to_string()),
            unique_rewritten: true,
            cleanup_ran: true,
            ..StageReport::default()
        };
        ProvisionResult::provisioned("cam1", report, Duration::from_millis(millis))
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = RunMetrics::new();
        assert_eq!(metrics.devices_provisioned.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.devices_failed.load(Ordering::Relaxed), 0);
        assert!(!metrics.has_failures());
    }

    #[test]
    fn test_record_results() {
        let metrics = RunMetrics::new();

        metrics.record_result(&provisioned(100));
        metrics.record_result(&ProvisionResult::failed(
            "cam2",
            ProvisionError::UnsupportedDeviceType("ADFoo".to_string()),
            StageReport::default(),
            Duration::from_millis(200),
        ));

        assert_eq!(metrics.devices_provisioned.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.devices_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.files_rewritten.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.cleanups_run.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_provision_time_ms.load(Ordering::Relaxed), 300);
        assert_eq!(metrics.avg_provision_time_ms(), 150.0);
        assert!(metrics.has_failures());
    }

    #[test]
    fn test_avg_time_no_devices() {
        let metrics = RunMetrics::new();
        assert_eq!(metrics.avg_provision_time_ms(), 0.0);
    }
}
