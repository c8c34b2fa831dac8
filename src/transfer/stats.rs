//! Run statistics and the fan-in stage that builds them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::job::{ResultReceiver, TransferResult};
use crate::error::TransferError;

/// Statistics for one sync run
#[derive(Debug, Default)]
pub struct TransferStats {
    /// Jobs that completed successfully
    pub success_count: u64,

    /// Bytes moved by successful jobs
    pub total_bytes: u64,

    /// Wall-clock time from run start until the last worker finished
    pub duration: Duration,

    /// Failed jobs, in the order they reported
    pub failures: Vec<TransferError>,

    /// Whether the run observed a cancellation signal
    pub cancelled: bool,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs that reported, successful or not.
    pub fn jobs(&self) -> u64 {
        self.success_count + self.failures.len() as u64
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Average throughput in bytes per second; zero for instant runs.
    pub fn bytes_per_second(&self) -> u64 {
        let secs = self.duration.as_secs_f64();
        if secs <= 0.0 {
            0
        } else {
            (self.total_bytes as f64 / secs) as u64
        }
    }

    fn record(&mut self, result: TransferResult) {
        match result {
            Ok(bytes) => {
                self.success_count += 1;
                self.total_bytes += bytes;
            }
            Err(err) => self.failures.push(err),
        }
    }
}

/// Called after every recorded result with the running totals.
pub type ProgressCallback = Arc<dyn Fn(&TransferStats) + Send + Sync>;

/// Single consumer of worker results. Owns the stats exclusively, so workers
/// never touch shared counters.
pub struct ResultAggregator {
    stats: TransferStats,
    started: Instant,
    progress: Option<ProgressCallback>,
}

impl ResultAggregator {
    /// Start the run clock now.
    pub fn new(progress: Option<ProgressCallback>) -> Self {
        Self {
            stats: TransferStats::new(),
            started: Instant::now(),
            progress,
        }
    }

    /// Drain results until every worker has dropped its sender, then stamp
    /// the duration.
    pub async fn run(mut self, mut results: ResultReceiver) -> TransferStats {
        while let Some(result) = results.recv().await {
            self.stats.record(result);
            if let Some(progress) = &self.progress {
                progress(&self.stats);
            }
        }
        self.stats.duration = self.started.elapsed();
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferErrorKind;
    use crate::transfer::job::result_channel;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn test_aggregator_counts_every_result() {
        let (tx, rx) = result_channel();
        let calls = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&calls);
        let progress: ProgressCallback = Arc::new(move |_stats: &TransferStats| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let handle = tokio::spawn(ResultAggregator::new(Some(progress)).run(rx));

        tx.send(Ok(10)).unwrap();
        tx.send(Err(TransferError::new("x", TransferErrorKind::Cancelled)))
            .unwrap();
        tx.send(Ok(20)).unwrap();
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.total_bytes, 30);
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.jobs(), 3);
        assert!(!stats.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_aggregator_waits_for_all_senders() {
        let (tx, rx) = result_channel();
        let tx2 = tx.clone();
        let handle = tokio::spawn(ResultAggregator::new(None).run(rx));

        tx.send(Ok(1)).unwrap();
        drop(tx);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        tx2.send(Ok(2)).unwrap();
        drop(tx2);

        let stats = handle.await.unwrap();
        assert_eq!(stats.total_bytes, 3);
        assert!(stats.duration >= Duration::from_millis(20));
    }

    #[test]
    fn test_bytes_per_second() {
        let mut stats = TransferStats::new();
        stats.total_bytes = 4096;
        assert_eq!(stats.bytes_per_second(), 0);

        stats.duration = Duration::from_secs(2);
        assert_eq!(stats.bytes_per_second(), 2048);
    }
}
