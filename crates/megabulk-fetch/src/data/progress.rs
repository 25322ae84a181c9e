use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use crate::data::proxy::PoolCounts;
use crate::data::status::TaskStatus;

const DEFAULT_WINDOW: Duration = Duration::from_secs(20);

/// Sliding window of `(instant, total bytes)` samples for one transfer.
#[derive(Debug, Clone)]
pub struct TransferStats {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl TransferStats {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Record the running byte total observed at `now`.
    pub fn record(&mut self, now: Instant, total: u64) {
        self.samples.push_back((now, total));
        while let Some(&(at, _)) = self.samples.front() {
            if now.duration_since(at) > self.window && self.samples.len() > 2 {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bytes per second over the window, or 0 with fewer than two samples.
    pub fn speed(&self) -> f64 {
        let (Some(&(t0, b0)), Some(&(t1, b1))) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let elapsed = t1.duration_since(t0).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        b1.saturating_sub(b0) as f64 / elapsed
    }

    /// Time to transfer `remaining` bytes at the current speed.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let speed = self.speed();
        (speed > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / speed))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

/// Aggregate view of a run at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSnapshot {
    pub total: usize,
    pub waiting: usize,
    pub finding_proxy: usize,
    pub requesting_stream: usize,
    pub downloading: usize,
    pub verifying: usize,
    pub downloaded: usize,
    pub already_downloaded: usize,
    pub failed: usize,
    pub bytes_total: u64,
    pub bytes_downloaded: u64,
    pub bytes_verified: u64,
    /// Sum of the current speed of every active transfer, in bytes per second.
    pub speed: f64,
    pub proxies: PoolCounts,
}

impl RunSnapshot {
    pub fn count(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Waiting => self.waiting,
            TaskStatus::FindingProxy => self.finding_proxy,
            TaskStatus::RequestingStream => self.requesting_stream,
            TaskStatus::Downloading => self.downloading,
            TaskStatus::Verifying => self.verifying,
            TaskStatus::Downloaded => self.downloaded,
            TaskStatus::AlreadyDownloaded => self.already_downloaded,
            TaskStatus::Failed => self.failed,
        }
    }

    pub(crate) fn add(&mut self, status: TaskStatus) {
        let slot = match status {
            TaskStatus::Waiting => &mut self.waiting,
            TaskStatus::FindingProxy => &mut self.finding_proxy,
            TaskStatus::RequestingStream => &mut self.requesting_stream,
            TaskStatus::Downloading => &mut self.downloading,
            TaskStatus::Verifying => &mut self.verifying,
            TaskStatus::Downloaded => &mut self.downloaded,
            TaskStatus::AlreadyDownloaded => &mut self.already_downloaded,
            TaskStatus::Failed => &mut self.failed,
        };
        *slot += 1;
        self.total += 1;
    }

    /// Files that reached a terminal state.
    pub fn finished(&self) -> usize {
        self.downloaded + self.already_downloaded + self.failed
    }

    /// Estimated time until every remaining byte has been transferred.
    pub fn eta(&self) -> Option<Duration> {
        let remaining = self.bytes_total.saturating_sub(self.bytes_downloaded);
        (self.speed > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / self.speed))
    }
}

/// A file that could not be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub downloaded: usize,
    pub already_downloaded: usize,
    pub failed: Vec<FailedFile>,
    /// Items skipped before any transfer because their metadata could not be decrypted.
    pub skipped: Vec<(String, String)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}
