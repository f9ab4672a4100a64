//! Performance metrics and statistics tracking for the scoring worker.

use crate::error::ErrorKind;
use crate::types::verdict::ScoreReply;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for scoring requests
pub struct ScoringMetrics {
    /// Requests that produced a probability
    pub requests_scored: AtomicU64,
    /// Scored requests at or above the threshold
    pub requests_flagged: AtomicU64,
    /// Requests answered with an error
    pub requests_failed: AtomicU64,
    errors_by_kind: RwLock<HashMap<ErrorKind, u64>>,
    /// Handling times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Fraud probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ScoringMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_scored: AtomicU64::new(0),
            requests_flagged: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            errors_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record the outcome of one request
    pub fn record_reply(&self, reply: &ScoreReply, processing_time: Duration) {
        match reply {
            ScoreReply::Scored(response) => self.record_scored(
                processing_time,
                response.fraud_probability,
                response.is_fraudulent,
            ),
            ScoreReply::Failed(error) => self.record_error(processing_time, error.kind),
        }
    }

    /// Record a scored request
    pub fn record_scored(&self, processing_time: Duration, probability: f64, flagged: bool) {
        self.requests_scored.fetch_add(1, Ordering::Relaxed);
        if flagged {
            self.requests_flagged.fetch_add(1, Ordering::Relaxed);
        }
        self.record_time(processing_time);

        let bucket = (probability * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a failed request
    pub fn record_error(&self, processing_time: Duration, kind: ErrorKind) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.record_time(processing_time);

        if let Ok(mut by_kind) = self.errors_by_kind.write() {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    fn record_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Total requests handled, successful or not
    pub fn requests_handled(&self) -> u64 {
        self.requests_scored.load(Ordering::Relaxed) + self.requests_failed.load(Ordering::Relaxed)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted: Vec<u64> = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return ProcessingStats::default(),
        };
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_handled() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get score distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or_default()
    }

    /// Get failures by error kind
    pub fn get_errors_by_kind(&self) -> HashMap<ErrorKind, u64> {
        self.errors_by_kind
            .read()
            .map(|by_kind| by_kind.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let scored = self.requests_scored.load(Ordering::Relaxed);
        let flagged = self.requests_flagged.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let flag_rate = if scored > 0 {
            (flagged as f64 / scored as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let errors_by_kind = self.get_errors_by_kind();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║             FRAUD SCORING SERVICE - METRICS SUMMARY          ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests Scored:  {:>8}  │  Throughput: {:>6.1} req/s       ║",
            scored, throughput
        );
        info!(
            "║ Flagged as Fraud: {:>8}  │  Flag Rate: {:>6.1}%             ║",
            flagged, flag_rate
        );
        info!("║ Requests Failed:  {:>8}                                   ║", failed);
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        if !errors_by_kind.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Kind:                                            ║");
            let mut kinds: Vec<_> = errors_by_kind.iter().collect();
            kinds.sort_by_key(|(kind, _)| kind.as_str());
            for (kind, count) in kinds {
                info!("║   {:22}: {:>6}                             ║", kind.as_str(), count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Fraud Probability Distribution:                              ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<ScoringMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ScoringMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::verdict::{ErrorResponse, ScoreResponse};

    #[test]
    fn test_metrics_recording() {
        let metrics = ScoringMetrics::new();

        metrics.record_scored(Duration::from_micros(100), 0.5, true);
        metrics.record_scored(Duration::from_micros(200), 0.1, false);
        metrics.record_error(Duration::from_micros(50), ErrorKind::SchemaError);

        assert_eq!(metrics.requests_scored.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.requests_flagged.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.requests_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.requests_handled(), 3);
        assert_eq!(metrics.get_errors_by_kind()[&ErrorKind::SchemaError], 1);
        assert_eq!(metrics.get_processing_stats().count, 3);
        assert_eq!(metrics.get_processing_stats().max_us, 200);
    }

    #[test]
    fn test_score_buckets() {
        let metrics = ScoringMetrics::new();
        metrics.record_scored(Duration::ZERO, 0.0, false);
        metrics.record_scored(Duration::ZERO, 0.55, true);
        metrics.record_scored(Duration::ZERO, 1.0, true);

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[0], 1);
        assert_eq!(dist[5], 1);
        assert_eq!(dist[9], 1);
    }

    #[test]
    fn test_record_reply() {
        let metrics = ScoringMetrics::new();
        metrics.record_reply(
            &ScoreReply::Scored(ScoreResponse::new(0.9, 0.5)),
            Duration::from_micros(10),
        );
        metrics.record_reply(
            &ScoreReply::Failed(ErrorResponse {
                error: "no bundle".to_string(),
                kind: ErrorKind::ArtifactLoadError,
            }),
            Duration::from_micros(10),
        );

        assert_eq!(metrics.requests_flagged.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_errors_by_kind()[&ErrorKind::ArtifactLoadError], 1);
    }

    #[test]
    fn test_empty_stats() {
        let stats = ScoringMetrics::new().get_processing_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean_us, 0);
    }
}
