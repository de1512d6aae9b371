use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

/// Received/dropped counters of a run.
///
/// Only the active prober increments; readers take a [`Summary`] snapshot.
#[derive(Debug, Default)]
pub struct Tally {
    received: AtomicU64,
    dropped: AtomicU64,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::AcqRel);
    }

    pub fn summary(&self) -> Summary {
        Summary {
            received: self.received.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Summary {
    pub received: u64,
    pub dropped: u64,
}

impl Summary {
    pub fn transmitted(&self) -> u64 {
        self.received + self.dropped
    }

    /// Percentage of dropped attempts, `0.0` when nothing was attempted.
    pub fn loss_percent(&self) -> f64 {
        match self.transmitted() {
            0 => 0.0,
            total => self.dropped as f64 / total as f64 * 100.0,
        }
    }

    pub fn exit_status(&self) -> ExitStatus {
        match (self.received, self.dropped) {
            (_, 0) => ExitStatus::Success,
            (0, _) => ExitStatus::TotalLoss,
            _ => ExitStatus::PartialLoss,
        }
    }
}

/// Process exit status. The numeric codes are relied upon by scripts.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ExitStatus {
    Success,
    SetupFailure,
    PartialLoss,
    TotalLoss,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::SetupFailure => 1,
            ExitStatus::PartialLoss => 2,
            ExitStatus::TotalLoss => 3,
        }
    }
}

/// One-shot latch around the final report.
///
/// The first caller of [`Completion::finish`] runs the report, every caller
/// gets the status computed by that first call.
#[derive(Debug, Default)]
pub struct Completion {
    status: OnceLock<ExitStatus>,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish<F>(&self, report: F) -> ExitStatus
    where
        F: FnOnce() -> ExitStatus,
    {
        *self.status.get_or_init(report)
    }
}

/// Round-trip time accumulator for the echo summary.
#[derive(Clone, Debug, Default)]
pub struct RttStats {
    count: u32,
    min: Duration,
    max: Duration,
    sum_secs: f64,
    sum_sq_secs: f64,
}

impl RttStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rtt: Duration) {
        if self.count == 0 || rtt < self.min {
            self.min = rtt;
        }
        if rtt > self.max {
            self.max = rtt;
        }
        let secs = rtt.as_secs_f64();
        self.sum_secs += secs;
        self.sum_sq_secs += secs * secs;
        self.count += 1;
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn avg(&self) -> Duration {
        match self.count {
            0 => Duration::ZERO,
            n => Duration::from_secs_f64(self.sum_secs / f64::from(n)),
        }
    }

    /// Population standard deviation.
    pub fn stddev(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let n = f64::from(self.count);
        let mean = self.sum_secs / n;
        let variance = (self.sum_sq_secs / n - mean * mean).max(0.0);
        Duration::from_secs_f64(variance.sqrt())
    }
}
