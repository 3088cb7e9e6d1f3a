//! Round-trip latency instrumentation.
//!
//! Each outgoing request is timestamped by `req_id` on send; the
//! matching response closes the entry and appends the elapsed time to a
//! bounded rolling history. The history backs aggregate statistics,
//! anomaly detection, and a human-readable report for status surfaces.
//!
//! Uses `tokio::time::Instant` so tests can drive the clock
//! deterministically under paused time.

use std::collections::{HashMap, VecDeque};

use tokio::time::Instant;
use tracing::{debug, trace};

/// Default rolling history capacity, in samples.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Aggregate statistics over the rolling latency history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    /// Number of samples in the history.
    pub count: usize,
    /// Mean latency, milliseconds.
    pub avg: f64,
    /// Minimum latency, milliseconds.
    pub min: f64,
    /// Maximum latency, milliseconds.
    pub max: f64,
    /// 50th percentile, milliseconds.
    pub p50: f64,
    /// 95th percentile, milliseconds.
    pub p95: f64,
    /// 99th percentile, milliseconds.
    pub p99: f64,
}

/// Outcome of an anomaly scan over the history.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyReport {
    /// Cutoff applied, twice the average latency, milliseconds.
    pub threshold: f64,
    /// Samples over the cutoff, oldest first.
    pub samples: Vec<f64>,
    /// Share of the history the offending samples make up, 0..=100.
    pub percentage: f64,
}

/// Tracker for in-flight requests and completed round-trip times.
///
/// Owned by one session; not shared across tasks. A reconnect keeps the
/// analyzer alive (history spans connections) but callers may [`reset`]
/// it to drop entries from an abandoned connection.
///
/// [`reset`]: LatencyAnalyzer::reset
pub struct LatencyAnalyzer {
    /// Send timestamps awaiting a matching response, by `req_id`.
    pending: HashMap<String, Instant>,
    /// Completed round-trip times, milliseconds, oldest first.
    history: VecDeque<f64>,
    /// Maximum history length before eviction.
    capacity: usize,
}

impl LatencyAnalyzer {
    /// Create an analyzer with the default history capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create an analyzer with a custom history capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: HashMap::new(),
            history: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Record that a request was sent now.
    ///
    /// Re-recording an ID that is still pending restarts its clock.
    pub fn record_send(&mut self, req_id: &str) {
        self.pending.insert(req_id.to_string(), Instant::now());
        trace!(req_id, pending = self.pending.len(), "Send recorded");
    }

    /// Record that a response for `req_id` arrived now.
    ///
    /// Returns the round-trip time in milliseconds, or `None` when no
    /// matching send is pending (late or duplicate response, or the
    /// analyzer was reset in between); in that case nothing changes.
    pub fn record_receive(&mut self, req_id: &str) -> Option<f64> {
        let start = self.pending.remove(req_id)?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(latency_ms);

        debug!(req_id, latency_ms, "Round trip completed");
        Some(latency_ms)
    }

    /// Compute aggregate statistics, or `None` when the history is empty.
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.history.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = self.history.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Some(LatencyStats {
            count,
            avg: sum / count as f64,
            min: sorted[0],
            max: sorted[count - 1],
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
        })
    }

    /// Find samples exceeding twice the average latency.
    ///
    /// Returns `None` when the history is empty.
    pub fn detect_anomalies(&self) -> Option<AnomalyReport> {
        let stats = self.stats()?;
        let threshold = stats.avg * 2.0;

        let samples: Vec<f64> = self
            .history
            .iter()
            .copied()
            .filter(|&sample| sample > threshold)
            .collect();
        let percentage = samples.len() as f64 / stats.count as f64 * 100.0;

        Some(AnomalyReport {
            threshold,
            samples,
            percentage,
        })
    }

    /// The most recent `n` samples, oldest first.
    pub fn recent(&self, n: usize) -> Vec<f64> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).copied().collect()
    }

    /// Drop a pending entry without recording a sample.
    ///
    /// Used when a send fails after the entry was created; returns
    /// whether the entry existed.
    pub fn forget(&mut self, req_id: &str) -> bool {
        self.pending.remove(req_id).is_some()
    }

    /// Number of sends still awaiting a matching response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of completed samples in the history.
    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    /// Clear both the history and the pending map.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.history.clear();
    }

    /// Human-readable summary for status surfaces.
    pub fn report(&self) -> String {
        match self.stats() {
            Some(stats) => {
                let anomalies = self
                    .detect_anomalies()
                    .map_or(0, |report| report.samples.len());
                format!(
                    "latency: {} samples, avg {:.1}ms, min {:.1}ms, max {:.1}ms, \
                     p50 {:.1}ms, p95 {:.1}ms, p99 {:.1}ms, {} pending, \
                     {} anomalies, recent {:.1?}",
                    stats.count,
                    stats.avg,
                    stats.min,
                    stats.max,
                    stats.p50,
                    stats.p95,
                    stats.p99,
                    self.pending.len(),
                    anomalies,
                    self.recent(5),
                )
            }
            None => format!("latency: no samples, {} pending", self.pending.len()),
        }
    }
}

impl Default for LatencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Index the ascending-sorted samples at `floor(count * p)`, clamped to
/// the last element.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[index]
}
