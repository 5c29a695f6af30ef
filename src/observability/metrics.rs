//! Thread-safe metrics collection
//!
//! Atomic counters for the request lifecycle plus mutex-protected
//! processing times and per-agent answer statistics.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MAX_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// How a request left the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    TimedOut,
    Panicked,
}

pub struct MetricsCollector {
    requests_received: AtomicU64,
    requests_rejected: AtomicU64,
    requests_in_progress: AtomicU64,
    max_in_progress: AtomicU64,
    requests_completed: AtomicU64,
    requests_failed: AtomicU64,
    requests_timed_out: AtomicU64,
    worker_panics: AtomicU64,
    progress_updates: AtomicU64,
    evicted_requests: AtomicU64,
    evicted_conversations: AtomicU64,

    processing_times: Mutex<Vec<u64>>, // milliseconds
    agent_answers: Mutex<BTreeMap<String, u64>>,

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            requests_in_progress: AtomicU64::new(0),
            max_in_progress: AtomicU64::new(0),
            requests_completed: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            requests_timed_out: AtomicU64::new(0),
            worker_panics: AtomicU64::new(0),
            progress_updates: AtomicU64::new(0),
            evicted_requests: AtomicU64::new(0),
            evicted_conversations: AtomicU64::new(0),
            processing_times: Mutex::new(Vec::new()),
            agent_answers: Mutex::new(BTreeMap::new()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    pub fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Submission refused before a ledger entry was created
    pub fn request_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processing_started(&self) {
        let now_running = self.requests_in_progress.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_in_progress.fetch_max(now_running, Ordering::Relaxed);
    }

    pub fn processing_finished(&self, outcome: Outcome, duration: Duration) {
        self.requests_in_progress.fetch_sub(1, Ordering::Relaxed);
        match outcome {
            Outcome::Completed => {
                self.requests_completed.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Failed => {
                self.requests_failed.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::TimedOut => {
                self.requests_failed.fetch_add(1, Ordering::Relaxed);
                self.requests_timed_out.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Panicked => {
                self.requests_failed.fetch_add(1, Ordering::Relaxed);
                self.worker_panics.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.record_processing_time(duration);
    }

    pub fn progress_recorded(&self, count: usize) {
        self.progress_updates
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn agent_answered(&self, agent_name: &str) {
        if let Ok(mut answers) = self.agent_answers.lock() {
            *answers.entry(agent_name.to_string()).or_insert(0) += 1;
        }
    }

    pub fn retention_swept(&self, requests: usize, conversations: usize) {
        self.evicted_requests
            .fetch_add(requests as u64, Ordering::Relaxed);
        self.evicted_conversations
            .fetch_add(conversations as u64, Ordering::Relaxed);
    }

    fn record_processing_time(&self, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            times.push(duration.as_millis() as u64);

            if times.len() > MAX_SAMPLES {
                times.remove(0);
            }
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        current_timestamp().saturating_sub(self.uptime_start.load(Ordering::Relaxed))
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.requests_received,
            &self.requests_rejected,
            &self.requests_in_progress,
            &self.max_in_progress,
            &self.requests_completed,
            &self.requests_failed,
            &self.requests_timed_out,
            &self.worker_panics,
            &self.progress_updates,
            &self.evicted_requests,
            &self.evicted_conversations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
        if let Ok(mut answers) = self.agent_answers.lock() {
            answers.clear();
        }
    }

    fn processing_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.processing_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
            percentile(&sorted_times, 99.0),
        )
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let (avg_processing_time_ms, p50, p95, p99) = self.processing_time_statistics();
        let answers_by_agent = self
            .agent_answers
            .lock()
            .map(|answers| answers.clone())
            .unwrap_or_default();

        MetricsSnapshot {
            requests: RequestMetrics {
                received: self.requests_received.load(Ordering::Relaxed),
                rejected: self.requests_rejected.load(Ordering::Relaxed),
                in_progress: self.requests_in_progress.load(Ordering::Relaxed),
                max_in_progress: self.max_in_progress.load(Ordering::Relaxed),
                completed: self.requests_completed.load(Ordering::Relaxed),
                failed: self.requests_failed.load(Ordering::Relaxed),
                timed_out: self.requests_timed_out.load(Ordering::Relaxed),
                worker_panics: self.worker_panics.load(Ordering::Relaxed),
                progress_updates: self.progress_updates.load(Ordering::Relaxed),
                avg_processing_time_ms,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
                processing_time_p99_ms: p99,
            },
            agents: AgentMetrics { answers_by_agent },
            retention: RetentionMetrics {
                evicted_requests: self.evicted_requests.load(Ordering::Relaxed),
                evicted_conversations: self.evicted_conversations.load(Ordering::Relaxed),
            },
            uptime_seconds: self.uptime_seconds(),
            timestamp: current_timestamp(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub requests: RequestMetrics,
    pub agents: AgentMetrics,
    pub retention: RetentionMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct RequestMetrics {
    pub received: u64,
    pub rejected: u64,
    pub in_progress: u64,
    pub max_in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub worker_panics: u64,
    pub progress_updates: u64,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
    pub processing_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct AgentMetrics {
    pub answers_by_agent: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct RetentionMetrics {
    pub evicted_requests: u64,
    pub evicted_conversations: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_value = sorted_data[index.floor() as usize] as f64;
        let upper_value = sorted_data[index.ceil() as usize] as f64;
        lower_value + (upper_value - lower_value) * index.fract()
    }
}
