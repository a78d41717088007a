use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Live metrics collector for queue operations. Per-job-type counters are
/// updated synchronously under a `DashMap` entry lock rather than spawned
/// off as a background task, so a snapshot taken right after `record_*`
/// returns is guaranteed to reflect it.
pub struct LiveMetrics {
    jobs_enqueued: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,

    job_type_metrics: DashMap<String, JobTypeMetrics>,

    performance: Arc<RwLock<PerformanceMetrics>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self {
            jobs_enqueued: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_retried: AtomicU64::new(0),
            job_type_metrics: DashMap::new(),
            performance: Arc::new(RwLock::new(PerformanceMetrics::new())),
        }
    }

    pub fn increment_jobs_enqueued(&self, job_type: &str) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        self.job_type_metrics.entry(job_type.to_string()).or_default().enqueued += 1;
    }

    pub fn increment_jobs_completed(&self, job_type: &str) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        self.job_type_metrics.entry(job_type.to_string()).or_default().completed += 1;
    }

    pub fn increment_jobs_failed(&self, job_type: &str) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        self.job_type_metrics.entry(job_type.to_string()).or_default().failed += 1;
    }

    pub fn increment_jobs_retried(&self, job_type: &str) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
        self.job_type_metrics.entry(job_type.to_string()).or_default().retried += 1;
    }

    pub fn jobs_enqueued(&self) -> u64 {
        self.jobs_enqueued.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn jobs_retried(&self) -> u64 {
        self.jobs_retried.load(Ordering::Relaxed)
    }

    pub fn job_type_metrics(&self, job_type: &str) -> Option<JobTypeMetrics> {
        self.job_type_metrics.get(job_type).map(|m| m.clone())
    }

    pub fn all_job_type_metrics(&self) -> std::collections::HashMap<String, JobTypeMetrics> {
        self.job_type_metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn record_execution_time(&self, job_type: &str, duration: Duration) {
        self.performance.write().record_execution_time(job_type, duration);
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.performance.read().clone()
    }
}

impl Default for LiveMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for a specific job type
#[derive(Debug, Clone, Default)]
pub struct JobTypeMetrics {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

impl JobTypeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success_rate(&self) -> f64 {
        let total_processed = self.completed + self.failed;
        if total_processed == 0 {
            100.0
        } else {
            (self.completed as f64 / total_processed as f64) * 100.0
        }
    }

    pub fn retry_rate(&self) -> f64 {
        if self.enqueued == 0 {
            0.0
        } else {
            (self.retried as f64 / self.enqueued as f64) * 100.0
        }
    }
}

/// Performance metrics for job execution
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    execution_times: std::collections::HashMap<String, Vec<Duration>>,
    last_updated: DateTime<Utc>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            execution_times: std::collections::HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn record_execution_time(&mut self, job_type: &str, duration: Duration) {
        let times = self.execution_times.entry(job_type.to_string()).or_default();
        times.push(duration);

        if times.len() > 1000 {
            times.remove(0);
        }

        self.last_updated = Utc::now();
    }

    pub fn average_execution_time(&self, job_type: &str) -> Option<Duration> {
        let times = self.execution_times.get(job_type)?;
        if times.is_empty() {
            return None;
        }

        let total_ms: i64 = times.iter().map(|d| d.num_milliseconds()).sum();
        let avg_ms = total_ms / times.len() as i64;
        Some(Duration::milliseconds(avg_ms))
    }

    pub fn percentile_execution_time(&self, job_type: &str, percentile: f64) -> Option<Duration> {
        let times = self.execution_times.get(job_type)?;
        if times.is_empty() {
            return None;
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_by_key(|d| d.num_milliseconds());

        let index = ((percentile / 100.0) * (sorted_times.len() - 1) as f64).round() as usize;
        sorted_times.get(index).cloned()
    }

    pub fn job_types(&self) -> Vec<String> {
        self.execution_times.keys().cloned().collect()
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics collector that aggregates data from multiple sources
pub struct MetricsCollector {
    live_metrics: Arc<LiveMetrics>,
}

impl MetricsCollector {
    pub fn new(live_metrics: Arc<LiveMetrics>) -> Self {
        Self { live_metrics }
    }

    pub fn collect_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            global: GlobalMetrics {
                jobs_enqueued: self.live_metrics.jobs_enqueued(),
                jobs_completed: self.live_metrics.jobs_completed(),
                jobs_failed: self.live_metrics.jobs_failed(),
                jobs_retried: self.live_metrics.jobs_retried(),
            },
            job_types: self.live_metrics.all_job_type_metrics(),
            performance: self.live_metrics.performance_metrics(),
        }
    }

    pub fn live_metrics(&self) -> &LiveMetrics {
        &self.live_metrics
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub global: GlobalMetrics,
    pub job_types: std::collections::HashMap<String, JobTypeMetrics>,
    pub performance: PerformanceMetrics,
}

/// Global queue metrics
#[derive(Debug, Clone)]
pub struct GlobalMetrics {
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
}

impl GlobalMetrics {
    pub fn success_rate(&self) -> f64 {
        let total_processed = self.jobs_completed + self.jobs_failed;
        if total_processed == 0 {
            100.0
        } else {
            (self.jobs_completed as f64 / total_processed as f64) * 100.0
        }
    }

    pub fn retry_rate(&self) -> f64 {
        if self.jobs_enqueued == 0 {
            0.0
        } else {
            (self.jobs_retried as f64 / self.jobs_enqueued as f64) * 100.0
        }
    }

    pub fn jobs_in_progress(&self) -> u64 {
        self.jobs_enqueued.saturating_sub(self.jobs_completed + self.jobs_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_metrics_update_synchronously() {
        let metrics = LiveMetrics::new();

        metrics.increment_jobs_enqueued("test_job");
        metrics.increment_jobs_completed("test_job");

        assert_eq!(metrics.jobs_enqueued(), 1);
        assert_eq!(metrics.jobs_completed(), 1);

        let job_metrics = metrics.job_type_metrics("test_job").unwrap();
        assert_eq!(job_metrics.enqueued, 1);
        assert_eq!(job_metrics.completed, 1);
        assert_eq!(job_metrics.success_rate(), 100.0);
    }

    #[test]
    fn performance_metrics_track_percentiles() {
        let mut perf = PerformanceMetrics::new();

        perf.record_execution_time("test_job", Duration::milliseconds(100));
        perf.record_execution_time("test_job", Duration::milliseconds(200));
        perf.record_execution_time("test_job", Duration::milliseconds(300));

        let avg = perf.average_execution_time("test_job").unwrap();
        assert_eq!(avg.num_milliseconds(), 200);

        let p50 = perf.percentile_execution_time("test_job", 50.0).unwrap();
        assert_eq!(p50.num_milliseconds(), 200);
    }

    #[test]
    fn global_metrics_compute_rates() {
        let global = GlobalMetrics {
            jobs_enqueued: 100,
            jobs_completed: 80,
            jobs_failed: 10,
            jobs_retried: 5,
        };

        assert!((global.success_rate() - 88.888888888).abs() < 1e-6);
        assert_eq!(global.retry_rate(), 5.0);
        assert_eq!(global.jobs_in_progress(), 10);
    }
}
