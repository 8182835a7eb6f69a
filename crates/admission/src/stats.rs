use std::sync::Mutex;
use std::time::Duration;

/// Smoothing factor for the running wait/processing averages.
const EWMA_ALPHA: f64 = 0.2;

/// Point-in-time view of queue throughput counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueueStats {
    pub total_enqueued: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_rejected: u64,
    pub total_timed_out: u64,
    pub total_retried: u64,
    /// Exponentially smoothed average wait between enqueue and dequeue, ms.
    pub avg_wait_ms: f64,
    /// Exponentially smoothed average handler processing time, ms.
    pub avg_processing_ms: f64,
}

/// Interior-mutable stats holder shared by producers and the consumer.
pub(crate) struct StatsCell {
    inner: Mutex<QueueStats>,
}

impl StatsCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueStats::default()),
        }
    }

    pub(crate) fn note_enqueued(&self) {
        self.inner.lock().expect("stats poisoned").total_enqueued += 1;
    }

    pub(crate) fn note_rejected(&self) {
        self.inner.lock().expect("stats poisoned").total_rejected += 1;
    }

    pub(crate) fn note_timed_out(&self) {
        self.inner.lock().expect("stats poisoned").total_timed_out += 1;
    }

    pub(crate) fn note_retried(&self) {
        self.inner.lock().expect("stats poisoned").total_retried += 1;
    }

    pub(crate) fn note_processed(&self, wait: Duration, processing: Duration, ok: bool) {
        let mut stats = self.inner.lock().expect("stats poisoned");
        stats.total_processed += 1;
        if !ok {
            stats.total_failed += 1;
        }
        stats.avg_wait_ms = ewma(stats.avg_wait_ms, wait.as_secs_f64() * 1000.0);
        stats.avg_processing_ms = ewma(stats.avg_processing_ms, processing.as_secs_f64() * 1000.0);
    }

    pub(crate) fn snapshot(&self) -> QueueStats {
        *self.inner.lock().expect("stats poisoned")
    }
}

fn ewma(current: f64, sample: f64) -> f64 {
    if current == 0.0 {
        sample
    } else {
        current + EWMA_ALPHA * (sample - current)
    }
}
