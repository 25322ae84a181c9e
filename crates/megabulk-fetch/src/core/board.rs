use tokio::time::Instant;

use crate::data::{RunSnapshot, TaskStatus, TransferStats};
use crate::error::{Error, Result};

/// Mutable per-task bookkeeping.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub status: TaskStatus,
    pub downloaded: u64,
    pub verified: u64,
    pub integrity_failures: u32,
    pub stats: TransferStats,
    pub error: Option<String>,
}

impl TaskState {
    pub fn new(status: TaskStatus, downloaded: u64) -> Self {
        Self {
            status,
            downloaded,
            verified: 0,
            integrity_failures: 0,
            stats: TransferStats::default(),
            error: None,
        }
    }
}

/// Status of every task of a run, indexed like the task list.
///
/// All admission decisions are made while holding the board, so a status change and the
/// capacity check that allowed it are one step.
#[derive(Debug, Default)]
pub struct Board {
    states: Vec<TaskState>,
    halted: bool,
}

impl Board {
    pub fn new(states: Vec<TaskState>) -> Self {
        Self { states, halted: false }
    }

    /// Stop admitting work for good. Tasks already claimed run to completion.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, index: usize) -> &TaskState {
        &self.states[index]
    }

    pub fn status(&self, index: usize) -> TaskStatus {
        self.states[index].status
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.states.iter().filter(|s| s.status == status).count()
    }

    /// Tasks holding a transfer slot.
    pub fn transferring(&self) -> usize {
        self.states.iter().filter(|s| s.status.is_transferring()).count()
    }

    /// Whether a worker may start probing for another task right now.
    pub fn admissible(&self, max_probing: usize, max_transferring: usize) -> bool {
        !self.halted
            && self.count(TaskStatus::FindingProxy) < max_probing
            && self.transferring() < max_transferring
            && self.count(TaskStatus::Waiting) > 0
    }

    /// Move the first waiting task to `finding-proxy` if both caps allow it.
    pub fn claim(&mut self, max_probing: usize, max_transferring: usize) -> Option<usize> {
        if !self.admissible(max_probing, max_transferring) {
            return None;
        }
        let index = self.states.iter().position(|s| s.status == TaskStatus::Waiting)?;
        self.states[index].status = TaskStatus::FindingProxy;
        Some(index)
    }

    /// Move a probed task to `requesting-stream`, unless it went stale or the transfer cap
    /// filled up meanwhile, in which case it goes back to `waiting`. Returns whether the
    /// transfer may start.
    pub fn begin_stream(&mut self, index: usize, max_transferring: usize) -> bool {
        let state = &mut self.states[index];
        if state.status != TaskStatus::FindingProxy {
            return false;
        }
        if self.transferring() >= max_transferring {
            self.states[index].status = TaskStatus::Waiting;
            return false;
        }
        self.states[index].status = TaskStatus::RequestingStream;
        true
    }

    pub fn transition(&mut self, index: usize, next: TaskStatus) -> Result<TaskStatus> {
        let state = &mut self.states[index];
        let previous = state.status;
        if !previous.can_transition_to(next) {
            return Err(Error::InvalidState(format!("{previous} -> {next}")));
        }

        state.status = next;
        match next {
            TaskStatus::Waiting | TaskStatus::Verifying => state.stats.reset(),
            _ => {}
        }
        Ok(previous)
    }

    pub fn fail(&mut self, index: usize, reason: String) -> Result<TaskStatus> {
        let previous = self.transition(index, TaskStatus::Failed)?;
        self.states[index].error = Some(reason);
        Ok(previous)
    }

    pub fn record_downloaded(&mut self, index: usize, now: Instant, bytes: u64) {
        let state = &mut self.states[index];
        state.downloaded = bytes;
        state.stats.record(now, bytes);
    }

    pub fn record_verified(&mut self, index: usize, bytes: u64) {
        self.states[index].verified = bytes;
    }

    /// Count an integrity failure and return the new total.
    pub fn record_integrity_failure(&mut self, index: usize) -> u32 {
        let state = &mut self.states[index];
        state.integrity_failures += 1;
        state.downloaded = 0;
        state.verified = 0;
        state.integrity_failures
    }

    /// Every task is terminal, so nothing is transferring or verifying.
    pub fn is_complete(&self) -> bool {
        self.states.iter().all(|s| s.status.is_terminal())
    }

    pub fn snapshot(&self, sizes: impl Iterator<Item = u64>) -> RunSnapshot {
        let mut snapshot = RunSnapshot::default();
        for (state, size) in self.states.iter().zip(sizes) {
            snapshot.add(state.status);
            snapshot.bytes_total += size;
            snapshot.bytes_downloaded += match state.status {
                TaskStatus::Verifying | TaskStatus::Downloaded | TaskStatus::AlreadyDownloaded => size,
                _ => state.downloaded.min(size),
            };
            snapshot.bytes_verified += match state.status {
                TaskStatus::Downloaded | TaskStatus::AlreadyDownloaded => size,
                _ => state.verified.min(size),
            };
            if state.status == TaskStatus::Downloading {
                snapshot.speed += state.stats.speed();
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn board(statuses: &[TaskStatus]) -> Board {
        Board::new(statuses.iter().map(|&s| TaskState::new(s, 0)).collect())
    }

    #[test]
    fn test_claim_respects_probe_cap() {
        let mut board = board(&[TaskStatus::Waiting; 4]);
        assert_eq!(board.claim(2, 6), Some(0));
        assert_eq!(board.claim(2, 6), Some(1));
        assert_eq!(board.claim(2, 6), None);
        assert_eq!(board.count(TaskStatus::FindingProxy), 2);
    }

    #[test]
    fn test_claim_respects_transfer_cap() {
        let mut board = board(&[TaskStatus::Downloading, TaskStatus::Waiting]);
        assert_eq!(board.claim(50, 1), None);
        assert_eq!(board.claim(50, 2), Some(1));
    }

    #[test]
    fn test_claim_without_waiting_tasks() {
        let mut board = board(&[TaskStatus::Verifying, TaskStatus::Downloaded]);
        assert!(!board.admissible(50, 6));
        assert_eq!(board.claim(50, 6), None);
    }

    #[test]
    fn test_halt_stops_claims_but_keeps_claimed_work() {
        let mut board = board(&[TaskStatus::Waiting; 3]);
        let claimed = board.claim(50, 6).unwrap();
        board.halt();

        assert!(board.is_halted());
        assert!(!board.admissible(50, 6));
        assert_eq!(board.claim(50, 6), None);
        assert_eq!(board.count(TaskStatus::Waiting), 2);

        assert!(board.begin_stream(claimed, 6));
        assert_eq!(board.status(claimed), TaskStatus::RequestingStream);
    }

    #[test]
    fn test_begin_stream_at_capacity_returns_to_waiting() {
        let mut board = board(&[TaskStatus::Waiting, TaskStatus::Waiting]);
        let a = board.claim(50, 1).unwrap();
        let b = board.claim(50, 1).unwrap();

        assert!(board.begin_stream(a, 1));
        assert!(!board.begin_stream(b, 1));
        assert_eq!(board.status(a), TaskStatus::RequestingStream);
        assert_eq!(board.status(b), TaskStatus::Waiting);
    }

    #[test]
    fn test_begin_stream_when_stale() {
        let mut board = board(&[TaskStatus::Waiting]);
        assert!(!board.begin_stream(0, 6));
        assert_eq!(board.status(0), TaskStatus::Waiting);
    }

    #[test]
    fn test_transition_rejects_illegal_edge() {
        let mut board = board(&[TaskStatus::Waiting]);
        assert!(matches!(
            board.transition(0, TaskStatus::Downloaded),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(board.status(0), TaskStatus::Waiting);
    }

    #[test]
    fn test_completion() {
        let mut board = board(&[TaskStatus::Verifying, TaskStatus::AlreadyDownloaded]);
        assert!(!board.is_complete());
        board.transition(0, TaskStatus::Downloaded).unwrap();
        assert!(board.is_complete());
        assert!(Board::default().is_complete());
    }

    #[test]
    fn test_integrity_failure_resets_progress() {
        let mut board = board(&[TaskStatus::Verifying]);
        board.record_downloaded(0, Instant::now(), 100);
        board.record_verified(0, 50);
        assert_eq!(board.record_integrity_failure(0), 1);
        assert_eq!(board.state(0).downloaded, 0);
        assert_eq!(board.state(0).verified, 0);
    }

    #[test]
    fn test_snapshot() {
        let mut board = board(&[
            TaskStatus::Waiting,
            TaskStatus::Downloading,
            TaskStatus::Verifying,
            TaskStatus::AlreadyDownloaded,
        ]);
        let start = Instant::now();
        board.record_downloaded(1, start, 0);
        board.record_downloaded(1, start + Duration::from_secs(1), 40);
        board.record_verified(2, 25);

        let snapshot = board.snapshot([100, 100, 100, 100].into_iter());
        assert_eq!(snapshot.total, 4);
        assert_eq!(snapshot.bytes_total, 400);
        assert_eq!(snapshot.bytes_downloaded, 40 + 100 + 100);
        assert_eq!(snapshot.bytes_verified, 25 + 100);
        assert_eq!(snapshot.speed, 40.0);
    }
}
