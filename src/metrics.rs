use std::time::Duration;

/// Lifetime latency statistics for the segmentation + composite span.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetrics {
    frame_count: u64,
    total: Duration,
    last: Duration,
}

impl FrameMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.frame_count += 1;
        self.total += elapsed;
        self.last = elapsed;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Latency of the most recent processed frame.
    pub fn last(&self) -> Duration {
        self.last
    }

    /// Cumulative time over frame count; zero before the first frame.
    pub fn average(&self) -> Duration {
        if self.frame_count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / self.frame_count as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    pub fn last_ms(&self) -> f64 {
        self.last.as_secs_f64() * 1000.0
    }

    pub fn average_ms(&self) -> f64 {
        self.average().as_secs_f64() * 1000.0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
